use std::fmt;

use serde::{Deserialize, Serialize};

use crate::camera::MediaStream;
use crate::recovery::ErrorState;

/// 视图状态
///
/// 决定渲染层展示哪个界面
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViewState {
    /// 申请摄像头权限
    Permission,
    /// 欢迎页，等待用户开始
    Welcome,
    /// 加载模型
    Loading,
    /// 实时字幕
    Runtime,
    /// 错误页
    Error,
    /// 图片上传降级模式
    ImageUpload,
}

impl ViewState {
    /// 获取状态名称（用于日志和调试）
    pub fn name(&self) -> &'static str {
        match self {
            Self::Permission => "permission",
            Self::Welcome => "welcome",
            Self::Loading => "loading",
            Self::Runtime => "runtime",
            Self::Error => "error",
            Self::ImageUpload => "image-upload",
        }
    }
}

impl fmt::Display for ViewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 运行状态
///
/// 与视图状态正交，描述执行管线的健康状况
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuntimeState {
    #[default]
    Idle,
    Warming,
    Running,
    Paused,
    Recovering,
    Failed,
}

impl RuntimeState {
    /// 获取状态名称
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Warming => "warming",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Recovering => "recovering",
            Self::Failed => "failed",
        }
    }

    /// 是否表示故障
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Recovering | Self::Failed)
    }
}

impl fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 加载阶段，仅在 `ViewState::Loading` 下有意义
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadingPhase {
    #[default]
    LoadingCapability,
    LoadingModel,
    WarmingUp,
    Complete,
}

/// 状态上下文
///
/// 除视图状态外的全部共享字段。转换动作只能修改这里的字段，
/// 视图状态只由状态机的转换执行器推进。
#[derive(Debug, Clone, PartialEq)]
pub struct StateContext {
    /// 运行状态
    pub runtime_state: RuntimeState,
    /// 加载阶段
    pub loading_phase: LoadingPhase,
    /// 模型加载进度 (0.0 - 1.0)
    pub loading_progress: f32,
    /// 摄像头流，替换前必须先停止旧流的所有轨道
    pub camera_stream: Option<MediaStream>,
    /// 视频元素是否就绪
    pub is_video_ready: bool,
    /// 是否具备 GPU 加速能力，启动后不再改变
    pub has_capability: bool,
    /// 错误记录
    pub error: Option<ErrorState>,
}

impl StateContext {
    /// 用已停止旧流的方式替换摄像头流
    pub(crate) fn replace_stream(&mut self, stream: MediaStream) {
        if let Some(previous) = self.camera_stream.replace(stream) {
            if Some(&previous) != self.camera_stream.as_ref() {
                previous.stop_all();
            }
        }
    }
}

/// 应用状态快照
///
/// 由状态机独占持有，对外只提供不可变副本
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationState {
    /// 视图状态
    pub view_state: ViewState,
    /// 其余共享字段
    pub context: StateContext,
}

impl ApplicationState {
    /// 创建初始状态
    pub fn initial(has_capability: bool) -> Self {
        Self {
            view_state: ViewState::Permission,
            context: StateContext {
                runtime_state: RuntimeState::Idle,
                loading_phase: LoadingPhase::LoadingCapability,
                loading_progress: 0.0,
                camera_stream: None,
                is_video_ready: false,
                has_capability,
                error: None,
            },
        }
    }

    /// 运行状态
    pub fn runtime_state(&self) -> RuntimeState {
        self.context.runtime_state
    }

    /// 错误记录
    pub fn error(&self) -> Option<&ErrorState> {
        self.context.error.as_ref()
    }

    /// 摄像头流
    pub fn camera_stream(&self) -> Option<&MediaStream> {
        self.context.camera_stream.as_ref()
    }

    /// 是否处于实时运行中
    pub fn is_live(&self) -> bool {
        self.view_state == ViewState::Runtime && self.context.runtime_state == RuntimeState::Running
    }

    /// 是否处于故障配置（错误页或运行故障）
    pub fn is_failure_configuration(&self) -> bool {
        self.view_state == ViewState::Error || self.context.runtime_state.is_failure()
    }

    /// 错误记录存在当且仅当处于故障配置
    pub fn error_invariant_holds(&self) -> bool {
        self.context.error.is_some() == self.is_failure_configuration()
    }
}

impl Default for ApplicationState {
    fn default() -> Self {
        Self::initial(false)
    }
}

/// 非转换更新
///
/// 只覆盖连续变化的字段，不能修改视图状态
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatePatch {
    /// 视频元素是否就绪
    pub is_video_ready: Option<bool>,
    /// 模型加载进度
    pub loading_progress: Option<f32>,
}

impl StatePatch {
    /// 创建空补丁
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置视频就绪
    pub fn video_ready(mut self, ready: bool) -> Self {
        self.is_video_ready = Some(ready);
        self
    }

    /// 设置加载进度（自动限制在 0.0 - 1.0）
    pub fn loading_progress(mut self, progress: f32) -> Self {
        self.loading_progress = Some(progress.clamp(0.0, 1.0));
        self
    }

    /// 应用到上下文
    pub(crate) fn apply(&self, context: &mut StateContext) {
        if let Some(ready) = self.is_video_ready {
            context.is_video_ready = ready;
        }
        if let Some(progress) = self.loading_progress {
            context.loading_progress = progress;
        }
    }
}

/// 状态摘要
///
/// 可序列化的状态视图，用于发送给渲染层和日志
#[derive(Debug, Clone, Serialize)]
pub struct StateSummary {
    /// 视图状态
    pub view_state: ViewState,
    /// 运行状态
    pub runtime_state: RuntimeState,
    /// 加载阶段
    pub loading_phase: LoadingPhase,
    /// 加载进度
    pub loading_progress: f32,
    /// 摄像头流 ID（如果有）
    pub stream_id: Option<String>,
    /// 视频是否就绪
    pub is_video_ready: bool,
    /// 是否具备加速能力
    pub has_capability: bool,
    /// 错误记录（如果有）
    pub error: Option<ErrorState>,
}

impl From<&ApplicationState> for StateSummary {
    fn from(state: &ApplicationState) -> Self {
        Self {
            view_state: state.view_state,
            runtime_state: state.context.runtime_state,
            loading_phase: state.context.loading_phase,
            loading_progress: state.context.loading_progress,
            stream_id: state.context.camera_stream.as_ref().map(|s| s.id().to_string()),
            is_video_ready: state.context.is_video_ready,
            has_capability: state.context.has_capability,
            error: state.context.error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::MediaTrack;

    #[test]
    fn test_initial_state() {
        let state = ApplicationState::initial(true);
        assert_eq!(state.view_state, ViewState::Permission);
        assert_eq!(state.runtime_state(), RuntimeState::Idle);
        assert!(state.context.has_capability);
        assert!(state.camera_stream().is_none());
        assert!(state.error_invariant_holds());
    }

    #[test]
    fn test_view_state_names() {
        assert_eq!(ViewState::ImageUpload.to_string(), "image-upload");
        assert_eq!(
            serde_json::to_string(&ViewState::ImageUpload).unwrap(),
            "\"image-upload\""
        );
        assert_eq!(RuntimeState::Recovering.to_string(), "recovering");
    }

    #[test]
    fn test_failure_configuration() {
        let mut state = ApplicationState::initial(true);
        state.context.runtime_state = RuntimeState::Recovering;
        assert!(state.is_failure_configuration());
        assert!(!state.error_invariant_holds());

        state.context.error = Some(ErrorState::stream_lost("unplugged"));
        assert!(state.error_invariant_holds());
    }

    #[test]
    fn test_replace_stream_stops_previous() {
        let mut state = ApplicationState::initial(true);
        let first = MediaStream::new(vec![MediaTrack::new("a", "A")]);
        let second = MediaStream::new(vec![MediaTrack::new("b", "B")]);

        state.context.replace_stream(first.clone());
        state.context.replace_stream(second.clone());

        assert!(first.is_stopped());
        assert!(second.is_active());
        assert_eq!(state.camera_stream(), Some(&second));
    }

    #[test]
    fn test_replace_with_same_stream_keeps_it_live() {
        let mut state = ApplicationState::initial(true);
        let stream = MediaStream::new(vec![MediaTrack::new("a", "A")]);

        state.context.replace_stream(stream.clone());
        state.context.replace_stream(stream.clone());

        assert!(stream.is_active());
    }

    #[test]
    fn test_replace_stream_with_reused_id_stops_previous() {
        // 平台可能复用流 id，但旧轨道仍需停止
        let mut state = ApplicationState::initial(true);
        let first = MediaStream::with_id("cam-1", vec![MediaTrack::new("a", "A")]);
        let second = MediaStream::with_id("cam-1", vec![MediaTrack::new("b", "B")]);

        state.context.replace_stream(first.clone());
        state.context.replace_stream(second.clone());

        assert!(first.is_stopped());
        assert!(second.is_active());
    }

    #[test]
    fn test_patch_apply() {
        let mut state = ApplicationState::initial(true);
        StatePatch::new()
            .video_ready(true)
            .loading_progress(1.7)
            .apply(&mut state.context);

        assert!(state.context.is_video_ready);
        assert_eq!(state.context.loading_progress, 1.0);
    }

    #[test]
    fn test_summary_serialization() {
        let mut state = ApplicationState::initial(true);
        state.context.camera_stream = Some(MediaStream::with_id("cam-1", Vec::new()));
        let summary = StateSummary::from(&state);

        let json = serde_json::to_string(&summary).expect("Should serialize");
        assert!(json.contains("\"permission\""));
        assert!(json.contains("cam-1"));
        assert!(json.contains("loading-capability"));
    }
}
