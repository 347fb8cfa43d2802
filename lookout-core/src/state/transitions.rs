//! 状态转换规则表
//!
//! 转换表在编译期固定，运行时不会修改。每条规则包含：
//! - 事件名称与源状态（具体状态或任意状态）
//! - 目标视图状态
//! - 可选的守卫（依据当前状态和事件数据判断）
//! - 可选的动作（只修改 `StateContext`，不修改视图状态）

use super::app_state::{ApplicationState, LoadingPhase, RuntimeState, StateContext, StatePatch, ViewState};
use super::events::{Event, EventKind};
use crate::recovery::ErrorState;

/// 守卫函数
pub type Guard = fn(&ApplicationState, &Event) -> bool;

/// 动作函数
pub type Action = fn(&mut StateContext, &Event);

/// 规则的源状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// 指定的视图状态
    State(ViewState),
    /// 任意视图状态（优先级低于精确匹配）
    Any,
}

impl Source {
    fn matches(&self, view: ViewState) -> bool {
        match self {
            Self::State(state) => *state == view,
            Self::Any => true,
        }
    }
}

/// 状态转换规则
#[derive(Debug, Clone, Copy)]
pub struct Transition {
    /// 事件名称
    pub event: EventKind,
    /// 源状态
    pub from: Source,
    /// 目标状态
    pub to: ViewState,
    /// 守卫
    pub guard: Option<Guard>,
    /// 动作
    pub action: Option<Action>,
}

/// 状态变更的触发原因
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeCause {
    /// 通过转换表派发的事件
    Event(Event),
    /// 非转换更新
    Patch(StatePatch),
}

/// 状态变更通知
///
/// 同时携带变更前后的完整快照
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    /// 变更前
    pub previous: ApplicationState,
    /// 变更后
    pub current: ApplicationState,
    /// 触发原因
    pub cause: ChangeCause,
}

impl StateChange {
    /// 触发事件（如果是事件派发）
    pub fn event(&self) -> Option<&Event> {
        match &self.cause {
            ChangeCause::Event(event) => Some(event),
            ChangeCause::Patch(_) => None,
        }
    }

    /// 视图状态是否发生变化
    pub fn view_changed(&self) -> bool {
        self.previous.view_state != self.current.view_state
    }
}

static TRANSITIONS: [Transition; 17] = [
    Transition {
        event: EventKind::PermissionGranted,
        from: Source::State(ViewState::Permission),
        to: ViewState::Welcome,
        guard: Some(has_live_stream),
        action: Some(store_granted_stream),
    },
    Transition {
        event: EventKind::PermissionDenied,
        from: Source::State(ViewState::Permission),
        to: ViewState::Error,
        guard: None,
        action: Some(build_camera_denied),
    },
    Transition {
        event: EventKind::Start,
        from: Source::State(ViewState::Welcome),
        to: ViewState::Loading,
        guard: Some(can_start),
        action: Some(begin_loading),
    },
    Transition {
        event: EventKind::StartFallback,
        from: Source::State(ViewState::Welcome),
        to: ViewState::ImageUpload,
        guard: Some(lacks_capability),
        action: None,
    },
    Transition {
        event: EventKind::CapabilityReady,
        from: Source::State(ViewState::Loading),
        to: ViewState::Loading,
        guard: None,
        action: Some(begin_model_load),
    },
    Transition {
        event: EventKind::ModelLoaded,
        from: Source::State(ViewState::Loading),
        to: ViewState::Loading,
        guard: None,
        action: Some(begin_warmup),
    },
    Transition {
        event: EventKind::WarmupComplete,
        from: Source::State(ViewState::Loading),
        to: ViewState::Runtime,
        guard: Some(video_ready),
        action: Some(go_live),
    },
    Transition {
        event: EventKind::Pause,
        from: Source::State(ViewState::Runtime),
        to: ViewState::Runtime,
        guard: Some(is_running),
        action: Some(pause),
    },
    Transition {
        event: EventKind::Resume,
        from: Source::State(ViewState::Runtime),
        to: ViewState::Runtime,
        guard: Some(is_paused),
        action: Some(resume),
    },
    Transition {
        event: EventKind::StreamEnded,
        from: Source::State(ViewState::Runtime),
        to: ViewState::Runtime,
        guard: None,
        action: Some(begin_recovery),
    },
    Transition {
        event: EventKind::StreamRecovered,
        from: Source::State(ViewState::Runtime),
        to: ViewState::Runtime,
        guard: Some(is_recovering),
        action: Some(finish_recovery),
    },
    Transition {
        event: EventKind::ModelFailed,
        from: Source::State(ViewState::Loading),
        to: ViewState::Error,
        guard: None,
        action: Some(build_model_failed),
    },
    Transition {
        event: EventKind::FatalError,
        from: Source::Any,
        to: ViewState::Error,
        guard: None,
        action: Some(build_fatal),
    },
    Transition {
        event: EventKind::Retry,
        from: Source::State(ViewState::Error),
        to: ViewState::Permission,
        guard: None,
        action: Some(reset_for_retry),
    },
    Transition {
        event: EventKind::DeviceSwitched,
        from: Source::State(ViewState::Welcome),
        to: ViewState::Welcome,
        guard: Some(has_live_stream),
        action: Some(store_switched_stream),
    },
    Transition {
        event: EventKind::DeviceSwitched,
        from: Source::State(ViewState::Loading),
        to: ViewState::Loading,
        guard: Some(has_live_stream),
        action: Some(store_switched_stream),
    },
    Transition {
        event: EventKind::DeviceSwitched,
        from: Source::State(ViewState::Runtime),
        to: ViewState::Runtime,
        guard: Some(can_switch_in_runtime),
        action: Some(store_switched_stream),
    },
];

/// 获取转换表
pub fn transition_table() -> &'static [Transition] {
    &TRANSITIONS
}

/// 查找匹配的规则，精确匹配优先于任意状态匹配
pub fn find_transition(
    table: &[Transition],
    event: EventKind,
    view: ViewState,
) -> Option<&Transition> {
    table
        .iter()
        .find(|t| t.event == event && t.from == Source::State(view))
        .or_else(|| {
            table
                .iter()
                .find(|t| t.event == event && t.from == Source::Any && t.from.matches(view))
        })
}

// ========== 守卫 ==========

fn has_live_stream(_: &ApplicationState, event: &Event) -> bool {
    match event {
        Event::PermissionGranted { stream } | Event::DeviceSwitched { stream } => {
            stream.is_active()
        }
        _ => false,
    }
}

// 恢复过程中切换设备会与自动重连竞争
fn can_switch_in_runtime(state: &ApplicationState, event: &Event) -> bool {
    state.context.runtime_state != RuntimeState::Recovering && has_live_stream(state, event)
}

fn can_start(state: &ApplicationState, _: &Event) -> bool {
    state.context.has_capability && state.context.camera_stream.is_some()
}

fn lacks_capability(state: &ApplicationState, _: &Event) -> bool {
    !state.context.has_capability
}

fn video_ready(state: &ApplicationState, _: &Event) -> bool {
    state.context.is_video_ready
}

// 暂停/恢复只在对应的运行状态下生效，避免覆盖 recovering
fn is_running(state: &ApplicationState, _: &Event) -> bool {
    state.context.runtime_state == RuntimeState::Running
}

fn is_paused(state: &ApplicationState, _: &Event) -> bool {
    state.context.runtime_state == RuntimeState::Paused
}

fn is_recovering(state: &ApplicationState, _: &Event) -> bool {
    state.context.runtime_state == RuntimeState::Recovering
}

// ========== 动作 ==========

fn store_granted_stream(ctx: &mut StateContext, event: &Event) {
    if let Event::PermissionGranted { stream } = event {
        ctx.replace_stream(stream.clone());
    }
}

fn store_switched_stream(ctx: &mut StateContext, event: &Event) {
    if let Event::DeviceSwitched { stream } = event {
        ctx.replace_stream(stream.clone());
    }
}

fn build_camera_denied(ctx: &mut StateContext, event: &Event) {
    let technical = match event {
        Event::PermissionDenied { technical } => technical.clone(),
        _ => None,
    };
    ctx.error = Some(ErrorState::camera_denied(technical));
}

fn begin_loading(ctx: &mut StateContext, _: &Event) {
    ctx.loading_phase = LoadingPhase::LoadingCapability;
    ctx.loading_progress = 0.0;
}

fn begin_model_load(ctx: &mut StateContext, _: &Event) {
    ctx.loading_phase = LoadingPhase::LoadingModel;
}

fn begin_warmup(ctx: &mut StateContext, _: &Event) {
    ctx.loading_phase = LoadingPhase::WarmingUp;
    ctx.loading_progress = 1.0;
    ctx.runtime_state = RuntimeState::Warming;
}

fn go_live(ctx: &mut StateContext, _: &Event) {
    ctx.loading_phase = LoadingPhase::Complete;
    ctx.runtime_state = RuntimeState::Running;
}

fn pause(ctx: &mut StateContext, _: &Event) {
    ctx.runtime_state = RuntimeState::Paused;
}

fn resume(ctx: &mut StateContext, _: &Event) {
    ctx.runtime_state = RuntimeState::Running;
}

fn begin_recovery(ctx: &mut StateContext, event: &Event) {
    let reason = match event {
        Event::StreamEnded { reason } => reason.as_str(),
        _ => "unknown",
    };
    ctx.runtime_state = RuntimeState::Recovering;
    ctx.error = Some(ErrorState::stream_lost(reason));
}

fn finish_recovery(ctx: &mut StateContext, event: &Event) {
    if let Event::StreamRecovered { stream } = event {
        ctx.replace_stream(stream.clone());
    }
    ctx.runtime_state = RuntimeState::Running;
    ctx.error = None;
}

fn build_model_failed(ctx: &mut StateContext, event: &Event) {
    let technical = match event {
        Event::ModelFailed { technical } => technical.as_str(),
        _ => "",
    };
    ctx.runtime_state = RuntimeState::Failed;
    ctx.error = Some(ErrorState::model_load_failed(technical));
}

fn build_fatal(ctx: &mut StateContext, event: &Event) {
    let error = match event {
        Event::FatalError { error: Some(error) } => error.clone(),
        _ => ErrorState::unknown(),
    };
    ctx.runtime_state = RuntimeState::Failed;
    ctx.error = Some(error);
}

fn reset_for_retry(ctx: &mut StateContext, _: &Event) {
    ctx.error = None;
    ctx.runtime_state = RuntimeState::Idle;
}
