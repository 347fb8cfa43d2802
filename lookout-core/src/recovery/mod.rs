//! 错误状态与恢复策略模块
//!
//! 提供状态机中使用的结构化错误记录，以及将底层故障映射为
//! 用户可操作的恢复指引的纯函数策略
//!
//! # 模块结构
//!
//! - `mod.rs` - `ErrorCode`、`ErrorState`、`RecoverAction` 定义
//! - `policy` - 错误种类 + 平台 -> 恢复指引的映射

mod policy;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use policy::{resolve, ErrorKind, PlatformFamily, RecoveryGuidance};

/// 错误代码
///
/// 状态机错误记录的分类，供渲染层识别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// 用户拒绝了摄像头权限
    CameraDenied,
    /// 找不到摄像头设备
    CameraNotFound,
    /// 摄像头被其他程序占用或无法读取
    CameraInUse,
    /// 没有设备满足请求的采集参数
    CameraConstraints,
    /// 非安全上下文
    InsecureContext,
    /// 缺少硬件加速能力
    CapabilityUnavailable,
    /// 模型加载失败
    ModelLoadFailed,
    /// 模型预热失败
    WarmupFailed,
    /// 单次推理失败
    InferenceFailed,
    /// 摄像头流中断
    StreamLost,
    /// 未知错误
    UnknownError,
}

impl ErrorCode {
    /// 获取错误代码字符串（与序列化结果一致）
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CameraDenied => "CAMERA_DENIED",
            Self::CameraNotFound => "CAMERA_NOT_FOUND",
            Self::CameraInUse => "CAMERA_IN_USE",
            Self::CameraConstraints => "CAMERA_CONSTRAINTS",
            Self::InsecureContext => "INSECURE_CONTEXT",
            Self::CapabilityUnavailable => "CAPABILITY_UNAVAILABLE",
            Self::ModelLoadFailed => "MODEL_LOAD_FAILED",
            Self::WarmupFailed => "WARMUP_FAILED",
            Self::InferenceFailed => "INFERENCE_FAILED",
            Self::StreamLost => "STREAM_LOST",
            Self::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 恢复动作的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecoverHandler {
    /// 派发 RETRY 事件，重新申请权限
    Retry,
    /// 整页重新加载
    Reload,
    /// 切换到图片上传降级模式
    FallbackMode,
}

/// 用户可见的恢复动作
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverAction {
    /// 按钮文字
    pub label: String,
    /// 处理方式
    pub handler: RecoverHandler,
}

impl RecoverAction {
    /// 创建恢复动作
    pub fn new(label: impl Into<String>, handler: RecoverHandler) -> Self {
        Self {
            label: label.into(),
            handler,
        }
    }

    /// 重试
    pub fn retry() -> Self {
        Self::new("Try Again", RecoverHandler::Retry)
    }

    /// 重新加载
    pub fn reload() -> Self {
        Self::new("Reload Page", RecoverHandler::Reload)
    }

    /// 降级模式
    pub fn fallback_mode() -> Self {
        Self::new("Use Image Upload", RecoverHandler::FallbackMode)
    }
}

/// 结构化错误记录
///
/// 由状态转换动作创建，RETRY 或 STREAM_RECOVERED 成功后销毁。
/// 每个错误都至少携带一个恢复动作，默认是整页重新加载。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorState {
    /// 错误代码
    pub code: ErrorCode,
    /// 标题
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// 用户可见的消息
    pub message: String,
    /// 诊断信息
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technical: Option<String>,
    /// 按顺序排列的补救步骤
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<String>,
    /// 恢复动作
    pub recover_action: RecoverAction,
}

impl ErrorState {
    /// 创建错误记录，恢复动作默认为重新加载
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            title: None,
            message: message.into(),
            technical: None,
            steps: Vec::new(),
            recover_action: RecoverAction::reload(),
        }
    }

    /// 设置标题
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// 设置诊断信息
    pub fn with_technical(mut self, technical: impl Into<String>) -> Self {
        self.technical = Some(technical.into());
        self
    }

    /// 设置补救步骤
    pub fn with_steps(mut self, steps: Vec<String>) -> Self {
        self.steps = steps;
        self
    }

    /// 设置恢复动作
    pub fn with_action(mut self, action: RecoverAction) -> Self {
        self.recover_action = action;
        self
    }

    /// 摄像头权限被拒绝
    pub fn camera_denied(technical: Option<String>) -> Self {
        let state = Self::new(
            ErrorCode::CameraDenied,
            "Camera access was denied. Allow camera access in your browser settings and try again.",
        )
        .with_action(RecoverAction::retry());

        match technical {
            Some(t) => state.with_technical(t),
            None => state,
        }
    }

    /// 摄像头流中断
    pub fn stream_lost(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::StreamLost,
            "The camera stream was interrupted. Reconnecting...",
        )
        .with_technical(reason)
        .with_action(RecoverAction::reload())
    }

    /// 模型加载失败
    pub fn model_load_failed(technical: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ModelLoadFailed,
            "The vision model failed to load. Reload the page to try again.",
        )
        .with_technical(technical)
    }

    /// 未知错误
    pub fn unknown() -> Self {
        Self::new(
            ErrorCode::UnknownError,
            "Something went wrong. Reload the page to start over.",
        )
    }
}
