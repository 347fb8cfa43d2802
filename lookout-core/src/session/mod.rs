//! 实时字幕会话模块
//!
//! 组合根：把能力检测、摄像头管理器、推理协调器和状态机连接起来，
//! 提供端到端的实时字幕流程
//!
//! # 功能
//!
//! - 启动时运行一次能力检测，结果作为状态机的静态能力标志
//! - 摄像头获取/中断/重连转换为状态机事件
//! - 模型加载进度和结果转换为加载阶段事件
//! - 管理采集循环的生命周期
//!
//! # 使用示例
//!
//! ```no_run
//! use std::sync::Arc;
//! use lookout_lib::recovery::PlatformFamily;
//! use lookout_lib::session::{SessionDeps, VisionSession};
//! use lookout_lib::sim::{ScriptedModel, SimulatedCamera, StaticCapability, StaticFrameSource};
//! use lookout_lib::capability::{CapabilityReport, PerformanceTier};
//! use lookout_lib::state::AppConfig;
//!
//! #[tokio::main]
//! async fn main() {
//!     let deps = SessionDeps {
//!         camera: Arc::new(SimulatedCamera::new()),
//!         model: Arc::new(ScriptedModel::new(["a", " cat"])),
//!         detector: Arc::new(StaticCapability::new(CapabilityReport::supported(PerformanceTier::High))),
//!         frames: Arc::new(StaticFrameSource::jpeg()),
//!         platform: PlatformFamily::Chromium,
//!     };
//!     let session = VisionSession::new(AppConfig::default(), deps).await;
//!
//!     session.request_permission().await;
//!     session.set_video_ready(true);
//!     session.start().await;
//!
//!     let mut captions = session.captions();
//!     println!("{:?}", captions.recv().await);
//!
//!     session.shutdown().await;
//! }
//! ```
//!
//! # 工作流程
//!
//! ```text
//! 1. request_permission
//!    └── 成功: permission -> welcome (PERMISSION_GRANTED)
//!    └── 拒绝: permission -> error (PERMISSION_DENIED)
//!
//! 2. start
//!    └── welcome -> loading (START, CAPABILITY_READY)
//!    └── 加载模型，进度写入 loading_progress
//!    └── MODEL_LOADED，预热
//!    └── 预热完成且视频就绪: loading -> runtime (WARMUP_COMPLETE)
//!
//! 3. runtime
//!    └── 采集循环按动态延迟推理，字幕通过 captions() 广播
//!    └── 轨道中断: STREAM_ENDED -> 自动重连 -> STREAM_RECOVERED
//!    └── 重连耗尽: FATAL_ERROR
//! ```

mod capture_loop;

pub use capture_loop::{CaptionUpdate, CaptureLoop};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::camera::{CameraError, CameraEvent, CameraPlatform, CameraStreamManager, MediaStream};
use crate::capability::{CapabilityDetector, CapabilityReport};
use crate::inference::{FrameSource, InferenceCoordinator, LoadProgress, VisionModel};
use crate::recovery::{resolve, ErrorKind, PlatformFamily};
use crate::state::{
    AppConfig, ApplicationState, Event, RuntimeState, StateMachine, StatePatch, Subscription,
    ViewState,
};
use crate::utils::error::AppError;

/// 字幕广播通道容量
const CAPTION_CHANNEL_CAPACITY: usize = 64;

/// 会话依赖的外部协作者
pub struct SessionDeps {
    /// 摄像头平台
    pub camera: Arc<dyn CameraPlatform>,
    /// 视觉语言模型
    pub model: Arc<dyn VisionModel>,
    /// 能力检测
    pub detector: Arc<dyn CapabilityDetector>,
    /// 视频帧来源
    pub frames: Arc<dyn FrameSource>,
    /// 平台族，用于选择错误指引
    pub platform: PlatformFamily,
}

/// 实时字幕会话
pub struct VisionSession {
    /// 状态机
    machine: Arc<StateMachine>,
    /// 摄像头管理器
    camera: CameraStreamManager,
    /// 推理协调器
    coordinator: Arc<InferenceCoordinator>,
    /// 能力检测结果
    capability: CapabilityReport,
    /// 平台族
    platform: PlatformFamily,
    /// 是否优先使用前置摄像头
    prefer_front_facing: bool,
    /// 预热是否已完成（与视频就绪竞争）
    warmup_done: Arc<AtomicBool>,
    /// 字幕广播
    captions: broadcast::Sender<CaptionUpdate>,
    /// 采集循环
    capture: Mutex<Option<CaptureLoop>>,
    /// 摄像头事件桥接任务
    bridge: Mutex<Option<JoinHandle<()>>>,
    /// 视频就绪监听
    _video_ready: Subscription,
}

impl VisionSession {
    /// 创建会话
    ///
    /// 运行能力检测、构建状态机，并启动摄像头事件桥接和采集循环
    pub async fn new(config: AppConfig, deps: SessionDeps) -> Self {
        let capability = deps.detector.detect().await;
        tracing::info!(
            supported = capability.supported,
            tier = ?capability.performance_tier,
            reason = ?capability.reason,
            "Capability detected"
        );

        let machine = Arc::new(StateMachine::new(capability.supported));
        let camera = CameraStreamManager::new(deps.camera, config.camera_settings());

        let pacing = config
            .pacing_config()
            .with_initial_delay(capability.performance_tier.initial_delay());
        let coordinator = Arc::new(InferenceCoordinator::new(deps.model, pacing));

        let warmup_done = Arc::new(AtomicBool::new(false));
        let video_ready = watch_video_ready(&machine, Arc::clone(&warmup_done));

        let (captions, _) = broadcast::channel(CAPTION_CHANNEL_CAPACITY);
        let capture = CaptureLoop::start(
            &machine,
            Arc::clone(&coordinator),
            deps.frames,
            config.inference.instruction.clone(),
            captions.clone(),
        );

        let bridge = tokio::spawn(bridge_camera_events(
            camera.subscribe(),
            Arc::clone(&machine),
            deps.platform,
            camera.is_secure_context(),
        ));

        Self {
            machine,
            camera,
            coordinator,
            capability,
            platform: deps.platform,
            prefer_front_facing: config.prefer_front_facing(),
            warmup_done,
            captions,
            capture: Mutex::new(Some(capture)),
            bridge: Mutex::new(Some(bridge)),
            _video_ready: video_ready,
        }
    }

    /// 状态机
    pub fn machine(&self) -> &Arc<StateMachine> {
        &self.machine
    }

    /// 当前状态快照
    pub fn state(&self) -> ApplicationState {
        self.machine.get_state()
    }

    /// 摄像头管理器
    pub fn camera(&self) -> &CameraStreamManager {
        &self.camera
    }

    /// 推理协调器
    pub fn coordinator(&self) -> &Arc<InferenceCoordinator> {
        &self.coordinator
    }

    /// 能力检测结果
    pub fn capability(&self) -> &CapabilityReport {
        &self.capability
    }

    /// 订阅字幕更新
    pub fn captions(&self) -> broadcast::Receiver<CaptionUpdate> {
        self.captions.subscribe()
    }

    /// 申请摄像头
    ///
    /// 用户拒绝时进入错误页（PERMISSION_DENIED），其他摄像头错误
    /// 按恢复策略生成错误记录（FATAL_ERROR）
    pub async fn request_permission(&self) -> bool {
        match self.camera.acquire(self.prefer_front_facing).await {
            Ok(stream) => self.machine.dispatch(Event::PermissionGranted { stream }),
            Err(CameraError::PermissionDenied(message)) => {
                tracing::warn!(message = %message, "Camera permission denied");
                self.machine.dispatch(Event::PermissionDenied {
                    technical: Some(message),
                });
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "Camera acquisition failed");
                self.dispatch_camera_failure(e);
                false
            }
        }
    }

    /// 开始实时字幕
    ///
    /// 依次推进加载阶段；加载或预热失败时派发 MODEL_FAILED。
    /// 返回 false 表示没有进入加载流程或加载失败。
    pub async fn start(&self) -> bool {
        if !self.machine.dispatch(Event::Start) {
            return false;
        }
        self.warmup_done.store(false, Ordering::SeqCst);
        self.machine.dispatch(Event::CapabilityReady);

        let machine = Arc::clone(&self.machine);
        let on_progress = move |progress: LoadProgress| {
            machine.set_state(StatePatch::new().loading_progress(progress.fraction));
        };

        if let Err(e) = self.coordinator.load(&on_progress).await {
            tracing::error!(error = %e, "Model load failed");
            self.machine.dispatch(Event::ModelFailed {
                technical: e.to_string(),
            });
            return false;
        }

        if !self.machine.dispatch(Event::ModelLoaded) {
            tracing::warn!("Left loading while the model was loading");
            return false;
        }

        if let Err(e) = self.coordinator.warmup().await {
            tracing::error!(error = %e, "Model warmup failed");
            self.machine.dispatch(Event::ModelFailed {
                technical: e.to_string(),
            });
            return false;
        }

        self.warmup_done.store(true, Ordering::SeqCst);
        complete_warmup_if_ready(&self.machine, &self.warmup_done);
        true
    }

    /// 无加速能力时进入图片上传模式
    pub fn start_fallback(&self) -> bool {
        self.machine.dispatch(Event::StartFallback)
    }

    /// 视频元素报告就绪状态
    pub fn set_video_ready(&self, ready: bool) {
        self.machine.set_state(StatePatch::new().video_ready(ready));
    }

    /// 暂停
    pub fn pause(&self) -> bool {
        self.machine.dispatch(Event::Pause)
    }

    /// 恢复
    pub fn resume(&self) -> bool {
        self.machine.dispatch(Event::Resume)
    }

    /// 从错误页重试，之后需要重新申请摄像头
    pub fn retry(&self) -> bool {
        let accepted = self.machine.dispatch(Event::Retry);
        if accepted {
            self.warmup_done.store(false, Ordering::SeqCst);
        }
        accepted
    }

    /// 切换摄像头设备
    ///
    /// 失败时旧流已经释放，按恢复策略进入错误页
    pub async fn switch_device(&self, device_id: &str) -> bool {
        let view = self.machine.current().view_state;
        if !holds_stream(view) {
            tracing::warn!(device_id = %device_id, view = %view, "No stream to switch");
            return false;
        }

        match self.camera.switch_device(device_id).await {
            Ok(stream) => {
                // 释放旧流会取消进行中的自动重连，新流即视为恢复成功
                let event = stream_replacement(&self.machine.current(), stream);
                self.machine.dispatch(event)
            }
            Err(e) => {
                tracing::error!(device_id = %device_id, error = %e, "Device switch failed");
                self.dispatch_camera_failure(e);
                false
            }
        }
    }

    /// 关闭会话
    ///
    /// 停止采集循环和事件桥接，释放摄像头
    pub async fn shutdown(&self) {
        let capture = lock(&self.capture).take();
        if let Some(mut capture) = capture {
            capture.stop().await;
        }

        if let Some(bridge) = lock(&self.bridge).take() {
            bridge.abort();
        }

        self.camera.release();
        tracing::info!("Vision session shut down");
    }

    fn dispatch_camera_failure(&self, error: CameraError) {
        let error = AppError::from(error);
        let state = error.to_error_state(self.platform, self.camera.is_secure_context());
        tracing::debug!(
            code = %state.code,
            recoverable = error.is_recoverable(),
            "Surfacing camera failure"
        );
        self.machine.dispatch(Event::fatal(state));
    }
}

impl Drop for VisionSession {
    fn drop(&mut self) {
        if let Some(bridge) = lock(&self.bridge).take() {
            bridge.abort();
        }
    }
}

/// 视频就绪后补发 WARMUP_COMPLETE
///
/// 预热完成和视频就绪的先后顺序不确定，两者都成立时才转换
fn watch_video_ready(machine: &Arc<StateMachine>, warmup_done: Arc<AtomicBool>) -> Subscription {
    let weak = Arc::downgrade(machine);
    machine.subscribe(move |change| {
        let became_ready =
            change.current.context.is_video_ready && !change.previous.context.is_video_ready;
        if became_ready && change.current.view_state == ViewState::Loading {
            if let Some(machine) = weak.upgrade() {
                complete_warmup_if_ready(&machine, &warmup_done);
            }
        }
    })
}

fn complete_warmup_if_ready(machine: &StateMachine, warmup_done: &AtomicBool) {
    let state = machine.current();
    if state.view_state != ViewState::Loading || !warmup_done.load(Ordering::SeqCst) {
        return;
    }
    if !state.context.is_video_ready {
        tracing::debug!("Warmup complete, waiting for video");
        return;
    }
    machine.dispatch(Event::WarmupComplete);
}

/// 把摄像头事件转换为状态机事件
async fn bridge_camera_events(
    mut events: broadcast::Receiver<CameraEvent>,
    machine: Arc<StateMachine>,
    platform: PlatformFamily,
    secure_context: bool,
) {
    loop {
        match events.recv().await {
            Ok(CameraEvent::TrackEnded {
                stream_id,
                track_id,
            }) => {
                machine.dispatch(Event::stream_ended(format!(
                    "track {} of stream {} ended",
                    track_id, stream_id
                )));
            }
            Ok(CameraEvent::Reconnecting { attempt, delay }) => {
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "Camera reconnecting");
            }
            Ok(CameraEvent::Reconnected { stream }) => {
                let event = stream_replacement(&machine.current(), stream);
                machine.dispatch(event);
            }
            Ok(CameraEvent::RecoveryFailed { attempts, error }) => {
                let technical = match error {
                    Some(e) => format!("gave up after {} attempts: {}", attempts, e),
                    None => format!("gave up after {} attempts", attempts),
                };
                let state = resolve(
                    ErrorKind::StreamLost,
                    platform,
                    secure_context,
                    Some(&technical),
                )
                .into_error_state(ErrorKind::StreamLost);
                machine.dispatch(Event::fatal(state));
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Camera event bridge lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }

    tracing::debug!("Camera event bridge stopped");
}

/// 状态机接收替换流的事件
///
/// 运行中恢复时是 STREAM_RECOVERED；欢迎页、加载中（流在运行前中断）
/// 以及未处于恢复的运行状态都按设备切换处理
fn stream_replacement(state: &ApplicationState, stream: MediaStream) -> Event {
    if state.view_state == ViewState::Runtime
        && state.context.runtime_state == RuntimeState::Recovering
    {
        Event::StreamRecovered { stream }
    } else {
        Event::DeviceSwitched { stream }
    }
}

fn holds_stream(view: ViewState) -> bool {
    matches!(view, ViewState::Welcome | ViewState::Loading | ViewState::Runtime)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
