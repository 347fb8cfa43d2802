//! 恢复策略
//!
//! (错误种类, 平台) -> (标题, 消息, 补救步骤, 诊断信息) 的纯函数映射，
//! 不产生副作用，由调用方决定是否展示

use serde::{Deserialize, Serialize};

use super::{ErrorCode, ErrorState, RecoverAction};

/// 故障种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// 用户拒绝了硬件访问
    Permission,
    /// 没有可用的设备
    HardwareNotFound,
    /// 设备被占用或无法读取
    HardwareInUse,
    /// 所有约束降级都失败
    Constraint,
    /// 非安全上下文
    Security,
    /// 缺少加速能力
    CapabilityUnavailable,
    /// 模型加载失败
    ModelLoad,
    /// 模型预热失败
    Warmup,
    /// 单次推理失败
    Inference,
    /// 摄像头流中断
    StreamLost,
    /// 无法归类
    Unknown,
}

impl ErrorKind {
    /// 对应的错误代码
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Permission => ErrorCode::CameraDenied,
            Self::HardwareNotFound => ErrorCode::CameraNotFound,
            Self::HardwareInUse => ErrorCode::CameraInUse,
            Self::Constraint => ErrorCode::CameraConstraints,
            Self::Security => ErrorCode::InsecureContext,
            Self::CapabilityUnavailable => ErrorCode::CapabilityUnavailable,
            Self::ModelLoad => ErrorCode::ModelLoadFailed,
            Self::Warmup => ErrorCode::WarmupFailed,
            Self::Inference => ErrorCode::InferenceFailed,
            Self::StreamLost => ErrorCode::StreamLost,
            Self::Unknown => ErrorCode::UnknownError,
        }
    }

    /// 默认恢复动作
    ///
    /// 安全上下文和模型错误只能通过重新加载/重新部署解决
    pub fn default_action(&self) -> RecoverAction {
        match self {
            Self::Permission
            | Self::HardwareNotFound
            | Self::HardwareInUse
            | Self::Constraint
            | Self::Inference => RecoverAction::retry(),
            Self::CapabilityUnavailable => RecoverAction::fallback_mode(),
            Self::Security
            | Self::ModelLoad
            | Self::Warmup
            | Self::StreamLost
            | Self::Unknown => RecoverAction::reload(),
        }
    }

    /// 是否可以通过重试解决
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::Security | Self::ModelLoad | Self::Warmup | Self::CapabilityUnavailable
        )
    }
}

/// 平台族，用于选择特定于浏览器的指引
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformFamily {
    Chromium,
    Firefox,
    Safari,
    Ios,
    Android,
    #[default]
    Other,
}

impl PlatformFamily {
    /// 根据 User-Agent 字符串识别平台族
    ///
    /// iOS 上所有浏览器都基于 WebKit，因此优先识别 iOS
    pub fn from_user_agent(user_agent: &str) -> Self {
        let ua = user_agent.to_ascii_lowercase();

        if ua.contains("iphone") || ua.contains("ipad") || ua.contains("ipod") {
            Self::Ios
        } else if ua.contains("android") {
            Self::Android
        } else if ua.contains("firefox") || ua.contains("fxios") {
            Self::Firefox
        } else if ua.contains("chrome") || ua.contains("chromium") || ua.contains("edg/") {
            Self::Chromium
        } else if ua.contains("safari") {
            Self::Safari
        } else {
            Self::Other
        }
    }
}

/// 恢复指引
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryGuidance {
    /// 标题
    pub title: String,
    /// 用户可见的消息
    pub message: String,
    /// 按顺序排列的补救步骤
    pub steps: Vec<String>,
    /// 诊断信息
    pub technical: Option<String>,
}

impl RecoveryGuidance {
    fn new(title: &str, message: &str, steps: &[&str], technical: Option<&str>) -> Self {
        Self {
            title: title.to_string(),
            message: message.to_string(),
            steps: steps.iter().map(|s| s.to_string()).collect(),
            technical: technical.map(str::to_string),
        }
    }

    /// 转换为状态机错误记录，使用错误种类的默认恢复动作
    pub fn into_error_state(self, kind: ErrorKind) -> ErrorState {
        let state = ErrorState::new(kind.code(), self.message)
            .with_title(self.title)
            .with_steps(self.steps)
            .with_action(kind.default_action());

        match self.technical {
            Some(t) => state.with_technical(t),
            None => state,
        }
    }
}

/// 选择恢复指引
///
/// 在非安全上下文中，权限类错误一律按安全错误处理：
/// 浏览器在这种情况下不会弹出权限提示
pub fn resolve(
    kind: ErrorKind,
    platform: PlatformFamily,
    secure_context: bool,
    technical: Option<&str>,
) -> RecoveryGuidance {
    let kind = match kind {
        ErrorKind::Permission | ErrorKind::HardwareNotFound if !secure_context => {
            ErrorKind::Security
        }
        other => other,
    };

    match kind {
        ErrorKind::Permission => permission_guidance(platform, technical),
        ErrorKind::HardwareNotFound => RecoveryGuidance::new(
            "No Camera Found",
            "No camera was detected on this device.",
            &[
                "Connect a camera or enable the built-in one",
                "Check that the camera is not disabled in your system settings",
                "Try again once the camera is available",
            ],
            technical,
        ),
        ErrorKind::HardwareInUse => in_use_guidance(platform, technical),
        ErrorKind::Constraint => RecoveryGuidance::new(
            "Camera Not Compatible",
            "Your camera does not support any of the requested capture settings.",
            &["Try a different camera", "Try again"],
            technical,
        ),
        ErrorKind::Security => RecoveryGuidance::new(
            "Secure Connection Required",
            "Camera access requires a secure (HTTPS) connection. Retrying will not help; \
             open this page over HTTPS or from localhost.",
            &[
                "Open the page using an https:// address",
                "For local development, use http://localhost",
            ],
            technical,
        ),
        ErrorKind::CapabilityUnavailable => RecoveryGuidance::new(
            "GPU Acceleration Unavailable",
            "This browser does not support the GPU acceleration needed for live captioning.",
            &[
                "Use image upload mode instead",
                "Or switch to a browser with WebGPU support",
            ],
            technical,
        ),
        ErrorKind::ModelLoad => RecoveryGuidance::new(
            "Model Failed to Load",
            "The vision model could not be loaded.",
            &[
                "Check your network connection",
                "Make sure there is enough free memory",
                "Reload the page",
            ],
            technical,
        ),
        ErrorKind::Warmup => RecoveryGuidance::new(
            "Model Failed to Start",
            "The vision model loaded but could not be initialized on this device.",
            &["Close other GPU-heavy tabs", "Reload the page"],
            technical,
        ),
        ErrorKind::Inference => RecoveryGuidance::new(
            "Captioning Hiccup",
            "A frame could not be processed. Captioning will continue shortly.",
            &[],
            technical,
        ),
        ErrorKind::StreamLost => RecoveryGuidance::new(
            "Camera Disconnected",
            "The camera stream ended and could not be restored.",
            &[
                "Check that the camera is still connected",
                "Close other applications that may be using the camera",
                "Reload the page",
            ],
            technical,
        ),
        ErrorKind::Unknown => RecoveryGuidance::new(
            "Unexpected Error",
            "Something went wrong.",
            &["Reload the page"],
            technical,
        ),
    }
}

fn permission_guidance(platform: PlatformFamily, technical: Option<&str>) -> RecoveryGuidance {
    let steps: &[&str] = match platform {
        PlatformFamily::Chromium => &[
            "Click the camera icon in the address bar",
            "Select \"Always allow\" for this site",
            "Click Try Again",
        ],
        PlatformFamily::Firefox => &[
            "Click the permissions icon to the left of the address bar",
            "Remove the blocked camera permission",
            "Click Try Again and allow access when prompted",
        ],
        PlatformFamily::Safari => &[
            "Open Safari > Settings for This Website",
            "Set Camera to \"Allow\"",
            "Click Try Again",
        ],
        PlatformFamily::Ios => &[
            "Open the Settings app and go to Safari > Camera",
            "Choose \"Ask\" or \"Allow\"",
            "Return here and tap Try Again",
        ],
        PlatformFamily::Android => &[
            "Tap the lock icon in the address bar",
            "Open Permissions and allow Camera",
            "Tap Try Again",
        ],
        PlatformFamily::Other => &[
            "Allow camera access in your browser's site settings",
            "Click Try Again",
        ],
    };

    RecoveryGuidance::new(
        "Camera Access Denied",
        "Camera access was denied. Allow camera access and try again.",
        steps,
        technical,
    )
}

fn in_use_guidance(platform: PlatformFamily, technical: Option<&str>) -> RecoveryGuidance {
    let steps: &[&str] = match platform {
        PlatformFamily::Ios | PlatformFamily::Android => &[
            "Close other apps that are using the camera",
            "Try again",
        ],
        _ => &[
            "Close other applications or tabs using the camera (video calls, recorders)",
            "Unplug and reconnect an external camera",
            "Try again",
        ],
    };

    RecoveryGuidance::new(
        "Camera Unavailable",
        "The camera is in use by another application or could not be read.",
        steps,
        technical,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::RecoverHandler;

    #[test]
    fn test_platform_from_user_agent() {
        let chrome = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";
        assert_eq!(PlatformFamily::from_user_agent(chrome), PlatformFamily::Chromium);

        let firefox = "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";
        assert_eq!(PlatformFamily::from_user_agent(firefox), PlatformFamily::Firefox);

        let safari = "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_2) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15";
        assert_eq!(PlatformFamily::from_user_agent(safari), PlatformFamily::Safari);

        let ios_chrome = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_2 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) CriOS/120.0 Mobile/15E148 Safari/604.1";
        assert_eq!(PlatformFamily::from_user_agent(ios_chrome), PlatformFamily::Ios);

        let android = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Mobile Safari/537.36";
        assert_eq!(PlatformFamily::from_user_agent(android), PlatformFamily::Android);

        assert_eq!(PlatformFamily::from_user_agent("curl/8.0"), PlatformFamily::Other);
    }

    #[test]
    fn test_resolve_is_pure() {
        let a = resolve(ErrorKind::Permission, PlatformFamily::Firefox, true, Some("x"));
        let b = resolve(ErrorKind::Permission, PlatformFamily::Firefox, true, Some("x"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_permission_steps_differ_by_platform() {
        let chrome = resolve(ErrorKind::Permission, PlatformFamily::Chromium, true, None);
        let ios = resolve(ErrorKind::Permission, PlatformFamily::Ios, true, None);
        assert_ne!(chrome.steps, ios.steps);
        assert!(ios.steps[0].contains("Settings"));
    }

    #[test]
    fn test_insecure_context_overrides_permission() {
        let guidance = resolve(ErrorKind::Permission, PlatformFamily::Chromium, false, None);
        assert_eq!(guidance.title, "Secure Connection Required");
        assert!(guidance.message.contains("Retrying will not help"));
    }

    #[test]
    fn test_security_error_state_uses_reload() {
        let state = resolve(ErrorKind::Security, PlatformFamily::Other, false, Some("http:"))
            .into_error_state(ErrorKind::Security);
        assert_eq!(state.code, ErrorCode::InsecureContext);
        assert_eq!(state.recover_action.handler, RecoverHandler::Reload);
        assert_eq!(state.technical.as_deref(), Some("http:"));
        assert!(!ErrorKind::Security.is_retryable());
    }

    #[test]
    fn test_error_state_keeps_guidance_title() {
        let guidance = resolve(ErrorKind::Permission, PlatformFamily::Chromium, false, None);
        let title = guidance.title.clone();
        let state = guidance.into_error_state(ErrorKind::Security);
        assert_eq!(state.title.as_deref(), Some(title.as_str()));

        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"title\":\"Secure Connection Required\""));
    }

    #[test]
    fn test_every_kind_has_an_action_and_steps_or_message() {
        let kinds = [
            ErrorKind::Permission,
            ErrorKind::HardwareNotFound,
            ErrorKind::HardwareInUse,
            ErrorKind::Constraint,
            ErrorKind::Security,
            ErrorKind::CapabilityUnavailable,
            ErrorKind::ModelLoad,
            ErrorKind::Warmup,
            ErrorKind::Inference,
            ErrorKind::StreamLost,
            ErrorKind::Unknown,
        ];

        for kind in kinds {
            let state = resolve(kind, PlatformFamily::Other, true, None).into_error_state(kind);
            assert!(!state.message.is_empty());
            assert!(!state.recover_action.label.is_empty());
            assert_eq!(state.code, kind.code());
        }
    }

    #[test]
    fn test_capability_unavailable_offers_fallback() {
        assert_eq!(
            ErrorKind::CapabilityUnavailable.default_action().handler,
            RecoverHandler::FallbackMode
        );
    }
}
