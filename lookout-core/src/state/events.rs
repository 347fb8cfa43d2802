use std::fmt;

use crate::camera::MediaStream;
use crate::recovery::ErrorState;

/// 事件名称
///
/// 用于在转换表中查找规则
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PermissionGranted,
    PermissionDenied,
    Start,
    StartFallback,
    CapabilityReady,
    ModelLoaded,
    WarmupComplete,
    Pause,
    Resume,
    StreamEnded,
    StreamRecovered,
    ModelFailed,
    FatalError,
    Retry,
    DeviceSwitched,
}

impl EventKind {
    /// 获取事件名称
    pub fn name(&self) -> &'static str {
        match self {
            Self::PermissionGranted => "PERMISSION_GRANTED",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::Start => "START",
            Self::StartFallback => "START_FALLBACK",
            Self::CapabilityReady => "CAPABILITY_READY",
            Self::ModelLoaded => "MODEL_LOADED",
            Self::WarmupComplete => "WARMUP_COMPLETE",
            Self::Pause => "PAUSE",
            Self::Resume => "RESUME",
            Self::StreamEnded => "STREAM_ENDED",
            Self::StreamRecovered => "STREAM_RECOVERED",
            Self::ModelFailed => "MODEL_FAILED",
            Self::FatalError => "FATAL_ERROR",
            Self::Retry => "RETRY",
            Self::DeviceSwitched => "DEVICE_SWITCHED",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 状态机事件
///
/// 每个事件只携带自身需要的数据
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// 用户授予了摄像头权限
    PermissionGranted { stream: MediaStream },
    /// 用户拒绝了摄像头权限
    PermissionDenied { technical: Option<String> },
    /// 用户点击开始
    Start,
    /// 无加速能力时进入降级模式
    StartFallback,
    /// 能力检测完成
    CapabilityReady,
    /// 模型加载完成
    ModelLoaded,
    /// 模型预热完成
    WarmupComplete,
    /// 暂停
    Pause,
    /// 恢复
    Resume,
    /// 摄像头流中断
    StreamEnded { reason: String },
    /// 摄像头流已恢复
    StreamRecovered { stream: MediaStream },
    /// 模型加载或预热失败
    ModelFailed { technical: String },
    /// 任意状态下的致命错误，未提供错误记录时使用 UNKNOWN_ERROR
    FatalError { error: Option<ErrorState> },
    /// 从错误页重试
    Retry,
    /// 用户切换了摄像头设备
    DeviceSwitched { stream: MediaStream },
}

impl Event {
    /// 获取事件名称
    pub fn kind(&self) -> EventKind {
        match self {
            Self::PermissionGranted { .. } => EventKind::PermissionGranted,
            Self::PermissionDenied { .. } => EventKind::PermissionDenied,
            Self::Start => EventKind::Start,
            Self::StartFallback => EventKind::StartFallback,
            Self::CapabilityReady => EventKind::CapabilityReady,
            Self::ModelLoaded => EventKind::ModelLoaded,
            Self::WarmupComplete => EventKind::WarmupComplete,
            Self::Pause => EventKind::Pause,
            Self::Resume => EventKind::Resume,
            Self::StreamEnded { .. } => EventKind::StreamEnded,
            Self::StreamRecovered { .. } => EventKind::StreamRecovered,
            Self::ModelFailed { .. } => EventKind::ModelFailed,
            Self::FatalError { .. } => EventKind::FatalError,
            Self::Retry => EventKind::Retry,
            Self::DeviceSwitched { .. } => EventKind::DeviceSwitched,
        }
    }

    /// 创建流中断事件
    pub fn stream_ended(reason: impl Into<String>) -> Self {
        Self::StreamEnded {
            reason: reason.into(),
        }
    }

    /// 创建致命错误事件
    pub fn fatal(error: ErrorState) -> Self {
        Self::FatalError { error: Some(error) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind() {
        assert_eq!(Event::Start.kind(), EventKind::Start);
        assert_eq!(Event::stream_ended("unplugged").kind(), EventKind::StreamEnded);
        assert_eq!(
            Event::fatal(ErrorState::unknown()).kind(),
            EventKind::FatalError
        );
    }

    #[test]
    fn test_event_kind_display() {
        assert_eq!(EventKind::PermissionGranted.to_string(), "PERMISSION_GRANTED");
        assert_eq!(EventKind::StartFallback.to_string(), "START_FALLBACK");
    }
}
