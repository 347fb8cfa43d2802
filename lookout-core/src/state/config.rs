//! 应用配置模块
//!
//! 提供配置的加载、保存以及到运行时策略类型的转换
//!
//! # 使用示例
//!
//! ```no_run
//! use lookout_lib::state::config::{AppConfig, ConfigManager};
//!
//! // 加载配置（文件不存在时返回默认值）
//! let mut config = ConfigManager::load("lookout.json")?;
//!
//! // 修改配置
//! config.recovery.max_attempts = 5;
//!
//! // 保存配置
//! ConfigManager::save("lookout.json", &config)?;
//! # Ok::<(), lookout_lib::state::config::ConfigError>(())
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::camera::{BackoffPolicy, CameraSettings, Resolution};
use crate::inference::PacingConfig;

/// 默认的字幕指令
pub const DEFAULT_INSTRUCTION: &str = "Describe what you see in one short sentence.";

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 序列化/反序列化错误
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// 配置结果类型
pub type ConfigResult<T> = Result<T, ConfigError>;

/// 应用配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 摄像头配置
    pub camera: CameraConfig,
    /// 自动恢复配置
    pub recovery: RecoveryConfig,
    /// 推理配置
    pub inference: InferenceConfig,
}

/// 摄像头配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// 是否优先使用前置摄像头
    pub prefer_front_facing: bool,
    /// 理想宽度
    pub ideal_width: u32,
    /// 理想高度
    pub ideal_height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            prefer_front_facing: true,
            ideal_width: 1280,
            ideal_height: 720,
        }
    }
}

/// 自动恢复配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// 轨道中断后是否自动重连
    pub auto_recover: bool,
    /// 最大重连次数
    pub max_attempts: u32,
    /// 基础延迟（毫秒），每次翻倍
    pub base_delay_ms: u64,
    /// 延迟上限（毫秒）
    pub max_delay_ms: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            auto_recover: true,
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 10_000,
        }
    }
}

/// 推理配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// 发送给模型的指令
    pub instruction: String,
    /// 部分结果的最小间隔（毫秒）
    pub partial_interval_ms: u64,
    /// 滚动平均窗口大小
    pub latency_window: usize,
    /// 动态延迟下限（毫秒）
    pub min_delay_ms: u64,
    /// 动态延迟上限（毫秒）
    pub max_delay_ms: u64,
    /// 推理失败后的冷却时间（毫秒）
    pub error_cooldown_ms: u64,
    /// 推理进行中时的轮询间隔（毫秒）
    pub busy_poll_ms: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            instruction: DEFAULT_INSTRUCTION.to_string(),
            partial_interval_ms: 100,
            latency_window: 8,
            min_delay_ms: 100,
            max_delay_ms: 5000,
            error_cooldown_ms: 2000,
            busy_poll_ms: 50,
        }
    }
}

impl AppConfig {
    /// 是否优先使用前置摄像头
    pub fn prefer_front_facing(&self) -> bool {
        self.camera.prefer_front_facing
    }

    /// 转换为摄像头管理器设置
    pub fn camera_settings(&self) -> CameraSettings {
        CameraSettings {
            ideal_resolution: Resolution::new(self.camera.ideal_width, self.camera.ideal_height),
            auto_recover: self.recovery.auto_recover,
            backoff: BackoffPolicy::new(
                Duration::from_millis(self.recovery.base_delay_ms),
                Duration::from_millis(self.recovery.max_delay_ms),
                self.recovery.max_attempts,
            ),
        }
    }

    /// 转换为推理节奏配置
    pub fn pacing_config(&self) -> PacingConfig {
        let inference = &self.inference;
        PacingConfig {
            partial_interval: Duration::from_millis(inference.partial_interval_ms),
            latency_window: inference.latency_window.max(1),
            min_delay: Duration::from_millis(inference.min_delay_ms),
            max_delay: Duration::from_millis(inference.max_delay_ms.max(inference.min_delay_ms)),
            error_cooldown: Duration::from_millis(inference.error_cooldown_ms),
            busy_poll: Duration::from_millis(inference.busy_poll_ms.max(1)),
            ..PacingConfig::default()
        }
    }
}

/// 配置管理器
///
/// 提供配置的加载和保存功能
pub struct ConfigManager;

impl ConfigManager {
    /// 加载配置
    ///
    /// 从配置文件加载配置，如果文件不存在则返回默认配置。
    /// 缺失的字段使用默认值。
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<AppConfig> {
        let path = path.as_ref();

        tracing::debug!(path = %path.display(), "Loading config");

        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: AppConfig = serde_json::from_str(&content)?;
            tracing::info!(path = %path.display(), "Config loaded successfully");
            Ok(config)
        } else {
            tracing::info!("Config file not found, using defaults");
            Ok(AppConfig::default())
        }
    }

    /// 保存配置
    pub fn save(path: impl AsRef<Path>, config: &AppConfig) -> ConfigResult<()> {
        let path = path.as_ref();

        tracing::debug!(path = %path.display(), "Saving config");

        // 确保目录存在
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(config)?;
        std::fs::write(path, content)?;

        tracing::info!(path = %path.display(), "Config saved successfully");
        Ok(())
    }
}
