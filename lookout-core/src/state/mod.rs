//! 状态管理模块
//!
//! 提供应用程序状态机和状态管理功能
//!
//! # 模块结构
//!
//! - `app_state` - 视图状态、运行状态和共享上下文
//! - `events` - 状态机事件
//! - `transitions` - 固定的转换规则表
//! - `machine` - 状态机（派发、订阅）
//! - `error` - 派发被拒绝的原因
//! - `config` - 应用配置

mod app_state;
pub mod config;
mod error;
mod events;
mod machine;
mod transitions;

pub use app_state::{
    ApplicationState, LoadingPhase, RuntimeState, StateContext, StatePatch, StateSummary,
    ViewState,
};
pub use config::{AppConfig, ConfigError, ConfigManager, ConfigResult};
pub use error::{StateError, StateResult};
pub use events::{Event, EventKind};
pub use machine::{StateMachine, Subscription};
pub use transitions::{
    find_transition, transition_table, Action, ChangeCause, Guard, Source, StateChange,
    Transition,
};
