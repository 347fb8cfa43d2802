use thiserror::Error;

use super::app_state::ViewState;
use super::events::EventKind;

/// 状态相关错误
///
/// 表示派发被拒绝的原因。两者都不是致命错误，
/// 通常是界面操作与异步完成之间的竞争造成的。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// 当前视图状态下没有匹配该事件的规则
    #[error("No transition for {event} from {view}")]
    NoMatchingTransition { event: EventKind, view: ViewState },

    /// 守卫拒绝了转换
    #[error("Guard rejected {event} in {view}")]
    GuardRejected { event: EventKind, view: ViewState },
}

/// 状态模块的结果类型
pub type StateResult<T> = Result<T, StateError>;
