//! 全局错误处理模块
//!
//! 提供统一的应用错误类型和用户友好的错误消息
//!
//! # 功能
//!
//! - 统一的 `AppError` 类型，聚合所有模块错误
//! - 错误代码与状态机错误记录共用同一套 `ErrorCode`
//! - 用户友好的错误消息
//! - 转换为带恢复动作的 `ErrorState`
//!
//! # 使用示例
//!
//! ```
//! use lookout_lib::camera::CameraError;
//! use lookout_lib::recovery::ErrorCode;
//! use lookout_lib::utils::error::AppError;
//!
//! let err = AppError::from(CameraError::DeviceNotFound);
//! assert_eq!(err.code(), ErrorCode::CameraNotFound);
//! ```

use thiserror::Error;

use crate::camera::CameraError;
use crate::inference::InferenceError;
use crate::recovery::{resolve, ErrorCode, ErrorKind, ErrorState, PlatformFamily};
use crate::state::{ConfigError, StateError};

/// 应用错误类型
///
/// 聚合所有模块的错误类型，提供统一的错误处理接口
#[derive(Error, Debug)]
pub enum AppError {
    /// 摄像头错误
    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    /// 推理错误
    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    /// 配置错误
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// 状态错误
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// 内部错误
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// 故障种类
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Camera(e) => e.kind(),
            AppError::Inference(e) => e.kind(),
            AppError::Config(_) | AppError::State(_) | AppError::Internal(_) => {
                ErrorKind::Unknown
            }
        }
    }

    /// 获取错误代码
    pub fn code(&self) -> ErrorCode {
        self.kind().code()
    }

    /// 获取用户友好的错误消息
    pub fn user_message(&self) -> String {
        match self {
            AppError::Camera(CameraError::PermissionDenied(_)) => {
                "Camera access was denied".to_string()
            }
            AppError::Camera(CameraError::DeviceNotFound) => "No camera was found".to_string(),
            AppError::Camera(CameraError::DeviceUnavailable(_)) => {
                "The camera is in use by another application".to_string()
            }
            AppError::Camera(CameraError::ConstraintsNotSatisfied(_)) => {
                "The camera does not support the requested settings".to_string()
            }
            AppError::Camera(CameraError::InsecureContext) => {
                "Camera access requires a secure (HTTPS) connection".to_string()
            }
            AppError::Camera(CameraError::DeviceSwitchFailed { .. }) => {
                "Could not switch to the selected camera".to_string()
            }
            AppError::Camera(_) => "Camera error".to_string(),

            AppError::Inference(InferenceError::NotLoaded) => {
                "The vision model is not ready yet".to_string()
            }
            AppError::Inference(InferenceError::ModelLoad(_)) => {
                "The vision model failed to load".to_string()
            }
            AppError::Inference(InferenceError::Warmup(_)) => {
                "The vision model failed to start".to_string()
            }
            AppError::Inference(_) => "A frame could not be captioned".to_string(),

            AppError::Config(ConfigError::Io(_)) => "Could not read the config file".to_string(),
            AppError::Config(ConfigError::Json(_)) => "The config file is malformed".to_string(),

            AppError::State(_) => "That action is not available right now".to_string(),

            AppError::Internal(msg) => format!("Internal error: {}", msg),
        }
    }

    /// 检查错误是否可恢复
    ///
    /// 安全上下文和模型错误需要重新部署或重新加载
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Config(_) | AppError::Internal(_) => false,
            AppError::State(_) => true,
            other => other.kind().is_retryable(),
        }
    }

    /// 转换为状态机错误记录
    pub fn to_error_state(&self, platform: PlatformFamily, secure_context: bool) -> ErrorState {
        let kind = self.kind();
        let technical = self.to_string();
        resolve(kind, platform, secure_context, Some(&technical)).into_error_state(kind)
    }
}

/// 应用结果类型
pub type AppResult<T> = Result<T, AppError>;

/// 将任意错误转换为内部错误
impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Internal(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Internal(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::RecoverHandler;
    use crate::state::{EventKind, ViewState};

    #[test]
    fn test_error_code() {
        let err = AppError::Camera(CameraError::DeviceNotFound);
        assert_eq!(err.code(), ErrorCode::CameraNotFound);

        let err = AppError::Inference(InferenceError::Warmup("oom".to_string()));
        assert_eq!(err.code(), ErrorCode::WarmupFailed);

        let err = AppError::State(StateError::NoMatchingTransition {
            event: EventKind::Start,
            view: ViewState::Runtime,
        });
        assert_eq!(err.code(), ErrorCode::UnknownError);
    }

    #[test]
    fn test_user_message() {
        let err = AppError::Camera(CameraError::InsecureContext);
        assert!(err.user_message().contains("HTTPS"));

        let err = AppError::Inference(InferenceError::ModelLoad("404".to_string()));
        assert!(err.user_message().contains("failed to load"));
    }

    #[test]
    fn test_recoverable() {
        // 可恢复的错误
        let err = AppError::Camera(CameraError::DeviceUnavailable("busy".to_string()));
        assert!(err.is_recoverable());

        // 不可恢复的错误
        assert!(!AppError::Camera(CameraError::InsecureContext).is_recoverable());
        assert!(!AppError::Internal("fatal".to_string()).is_recoverable());
    }

    #[test]
    fn test_to_error_state() {
        let err = AppError::Camera(CameraError::PermissionDenied("dismissed".to_string()));
        let state = err.to_error_state(PlatformFamily::Chromium, true);

        assert_eq!(state.code, ErrorCode::CameraDenied);
        assert_eq!(state.recover_action.handler, RecoverHandler::Retry);
        assert!(!state.steps.is_empty());
        assert!(state.technical.unwrap().contains("dismissed"));
    }

    #[test]
    fn test_from_string() {
        let err: AppError = "test error".into();
        match err {
            AppError::Internal(msg) => assert_eq!(msg, "test error"),
            _ => panic!("Expected Internal error"),
        }
    }
}
