use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use arc_swap::ArcSwap;
use tokio::sync::watch;

use super::app_state::{ApplicationState, StatePatch};
use super::error::{StateError, StateResult};
use super::events::Event;
use super::transitions::{find_transition, transition_table, ChangeCause, StateChange, Transition};

type Listener = Arc<dyn Fn(&StateChange) + Send + Sync>;
type ListenerList = Mutex<Vec<(u64, Listener)>>;

/// 通知投递队列
///
/// 保证通知按提交顺序投递；监听器内部再次派发的事件排在当前通知之后
#[derive(Default)]
struct Delivery {
    queue: VecDeque<StateChange>,
    active: bool,
}

/// 状态机
///
/// 唯一允许修改应用状态的组件。所有修改都经过 `dispatch`（转换表）
/// 或 `set_state`（连续字段），并在修改后同步通知订阅者。
pub struct StateMachine {
    /// 当前状态（使用 ArcSwap 实现无锁读取）
    state: ArcSwap<ApplicationState>,

    /// 串行化所有写操作
    write_lock: Mutex<()>,

    /// 订阅者列表，按注册顺序调用
    listeners: Arc<ListenerList>,

    /// 下一个订阅者 ID
    next_listener_id: AtomicU64,

    /// 待投递的通知
    delivery: Mutex<Delivery>,

    /// 转换表
    table: &'static [Transition],
}

impl StateMachine {
    /// 创建新的状态机
    ///
    /// `has_capability` 来自启动时的能力检测，此后不再改变
    ///
    /// # Examples
    ///
    /// ```
    /// use lookout_lib::state::{StateMachine, ViewState};
    ///
    /// let machine = StateMachine::new(true);
    /// assert_eq!(machine.get_state().view_state, ViewState::Permission);
    /// ```
    pub fn new(has_capability: bool) -> Self {
        Self::with_state(ApplicationState::initial(has_capability))
    }

    /// 从指定状态创建状态机
    pub fn with_state(initial: ApplicationState) -> Self {
        Self {
            state: ArcSwap::new(Arc::new(initial)),
            write_lock: Mutex::new(()),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener_id: AtomicU64::new(1),
            delivery: Mutex::new(Delivery::default()),
            table: transition_table(),
        }
    }

    /// 获取当前状态的不可变副本
    pub fn get_state(&self) -> ApplicationState {
        (*self.state.load_full()).clone()
    }

    /// 获取当前状态的共享引用（无锁）
    pub fn current(&self) -> Arc<ApplicationState> {
        self.state.load_full()
    }

    /// 派发事件
    ///
    /// 没有匹配规则或守卫拒绝时返回 false，状态保持不变。
    /// 两种情况都只记录日志，不视为错误。
    ///
    /// # Examples
    ///
    /// ```
    /// use lookout_lib::state::{Event, StateMachine, ViewState};
    ///
    /// let machine = StateMachine::new(false);
    ///
    /// // 欢迎页之前不能开始
    /// assert!(!machine.dispatch(Event::Start));
    /// assert_eq!(machine.get_state().view_state, ViewState::Permission);
    /// ```
    pub fn dispatch(&self, event: Event) -> bool {
        match self.try_dispatch(event) {
            Ok(()) => true,
            Err(e @ StateError::NoMatchingTransition { .. }) => {
                tracing::warn!(error = %e, "Event rejected");
                false
            }
            Err(e @ StateError::GuardRejected { .. }) => {
                tracing::debug!(error = %e, "Event rejected by guard");
                false
            }
        }
    }

    /// 派发事件并返回拒绝原因
    ///
    /// # Errors
    ///
    /// - [`StateError::NoMatchingTransition`] - 当前视图状态下没有该事件的规则
    /// - [`StateError::GuardRejected`] - 守卫未通过
    pub fn try_dispatch(&self, event: Event) -> StateResult<()> {
        {
            let _write = lock(&self.write_lock);
            let previous = self.state.load_full();
            let kind = event.kind();
            let view = previous.view_state;

            let transition = find_transition(self.table, kind, view)
                .ok_or(StateError::NoMatchingTransition { event: kind, view })?;

            if let Some(guard) = transition.guard {
                if !guard(&previous, &event) {
                    return Err(StateError::GuardRejected { event: kind, view });
                }
            }

            let mut next = (*previous).clone();
            if let Some(action) = transition.action {
                action(&mut next.context, &event);
            }
            next.view_state = transition.to;

            tracing::info!(
                event = %kind,
                from = %view,
                to = %next.view_state,
                runtime = %next.context.runtime_state,
                "State transition"
            );

            self.state.store(Arc::new(next.clone()));
            self.enqueue(StateChange {
                previous: (*previous).clone(),
                current: next,
                cause: ChangeCause::Event(event),
            });
        }

        self.deliver();
        Ok(())
    }

    /// 非转换更新
    ///
    /// 绕过转换表，只能修改连续变化的字段，仍然会通知订阅者
    pub fn set_state(&self, patch: StatePatch) {
        {
            let _write = lock(&self.write_lock);
            let previous = self.state.load_full();
            let mut next = (*previous).clone();
            patch.apply(&mut next.context);

            tracing::debug!(patch = ?patch, "State patched");

            self.state.store(Arc::new(next.clone()));
            self.enqueue(StateChange {
                previous: (*previous).clone(),
                current: next,
                cause: ChangeCause::Patch(patch),
            });
        }

        self.deliver();
    }

    /// 注册订阅者
    ///
    /// 回调在每次通知时同步调用，按注册顺序执行。
    /// 返回的 [`Subscription`] 被丢弃或调用 `unsubscribe` 时注销。
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.listeners).push((id, Arc::new(callback)));

        Subscription {
            listeners: Arc::downgrade(&self.listeners),
            id,
            active: true,
        }
    }

    /// 以 watch 通道的形式订阅最新状态
    ///
    /// 接收端总是持有最新快照，适合只关心当前状态的异步任务
    pub fn watch(&self) -> (watch::Receiver<ApplicationState>, Subscription) {
        let (tx, rx) = watch::channel(self.get_state());
        let subscription = self.subscribe(move |change| {
            tx.send_replace(change.current.clone());
        });
        (rx, subscription)
    }

    /// 获取当前订阅者数量
    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    fn enqueue(&self, change: StateChange) {
        lock(&self.delivery).queue.push_back(change);
    }

    /// 投递队列中的通知
    ///
    /// 已有投递循环在运行时直接返回，由该循环负责投递
    fn deliver(&self) {
        {
            let mut delivery = lock(&self.delivery);
            if delivery.active {
                return;
            }
            delivery.active = true;
        }

        let mut guard = DeliveryGuard {
            delivery: &self.delivery,
            armed: true,
        };

        loop {
            let change = {
                let mut delivery = lock(&self.delivery);
                match delivery.queue.pop_front() {
                    Some(change) => change,
                    None => {
                        delivery.active = false;
                        guard.armed = false;
                        return;
                    }
                }
            };

            // 复制列表后再调用，允许监听器内部订阅/注销/派发
            let listeners: Vec<Listener> = lock(&self.listeners)
                .iter()
                .map(|(_, listener)| Arc::clone(listener))
                .collect();

            for listener in listeners {
                listener(&change);
            }
        }
    }
}

/// 监听器 panic 时释放投递标记
struct DeliveryGuard<'a> {
    delivery: &'a Mutex<Delivery>,
    armed: bool,
}

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut delivery = lock(self.delivery);
            delivery.active = false;
        }
    }
}

/// 订阅句柄
///
/// 丢弃时自动注销；调用 [`Subscription::detach`] 可以保持订阅直到状态机销毁
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    listeners: Weak<ListenerList>,
    id: u64,
    active: bool,
}

impl Subscription {
    /// 注销订阅
    pub fn unsubscribe(mut self) {
        self.remove();
    }

    /// 保持订阅，不再随句柄注销
    pub fn detach(mut self) {
        self.active = false;
    }

    fn remove(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(listeners) = self.listeners.upgrade() {
            lock(&listeners).retain(|(id, _)| *id != self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{MediaStream, MediaTrack};
    use crate::state::{EventKind, RuntimeState, ViewState};

    fn live_stream() -> MediaStream {
        MediaStream::new(vec![MediaTrack::new("video-0", "Test Camera")])
    }

    #[test]
    fn test_permission_granted() {
        let machine = StateMachine::new(true);
        let stream = live_stream();

        assert!(machine.dispatch(Event::PermissionGranted {
            stream: stream.clone()
        }));

        let state = machine.get_state();
        assert_eq!(state.view_state, ViewState::Welcome);
        assert_eq!(state.camera_stream(), Some(&stream));
    }

    #[test]
    fn test_permission_granted_with_dead_stream_is_rejected() {
        let machine = StateMachine::new(true);
        let stream = live_stream();
        stream.stop_all();

        assert_eq!(
            machine.try_dispatch(Event::PermissionGranted { stream }),
            Err(StateError::GuardRejected {
                event: EventKind::PermissionGranted,
                view: ViewState::Permission,
            })
        );
    }

    #[test]
    fn test_unmatched_event_is_noop() {
        let machine = StateMachine::new(true);
        let before = machine.get_state();

        assert!(!machine.dispatch(Event::Resume));
        assert_eq!(machine.get_state(), before);
    }

    #[test]
    fn test_get_state_returns_copy() {
        let machine = StateMachine::new(true);
        let mut copy = machine.get_state();
        copy.view_state = ViewState::Runtime;
        copy.context.runtime_state = RuntimeState::Running;

        assert_eq!(machine.get_state().view_state, ViewState::Permission);
    }

    #[test]
    fn test_set_state_notifies() {
        let machine = StateMachine::new(true);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let _sub = machine.subscribe(move |change| {
            seen_clone.lock().unwrap().push(change.clone());
        });

        machine.set_state(StatePatch::new().video_ready(true));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(!seen[0].previous.context.is_video_ready);
        assert!(seen[0].current.context.is_video_ready);
        assert!(seen[0].event().is_none());
        assert_eq!(seen[0].current.view_state, ViewState::Permission);
    }

    #[test]
    fn test_listeners_called_in_registration_order() {
        let machine = StateMachine::new(true);
        let order = Arc::new(Mutex::new(Vec::new()));

        let subs: Vec<_> = (0..3)
            .map(|i| {
                let order = Arc::clone(&order);
                machine.subscribe(move |_| order.lock().unwrap().push(i))
            })
            .collect();

        machine.set_state(StatePatch::new().video_ready(true));
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
        drop(subs);
    }

    #[test]
    fn test_unsubscribe() {
        let machine = StateMachine::new(true);
        let count = Arc::new(AtomicU64::new(0));
        let count_clone = Arc::clone(&count);

        let sub = machine.subscribe(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(machine.listener_count(), 1);

        machine.set_state(StatePatch::new().video_ready(true));
        sub.unsubscribe();
        machine.set_state(StatePatch::new().video_ready(false));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(machine.listener_count(), 0);
    }

    #[test]
    fn test_detached_subscription_survives_handle() {
        let machine = StateMachine::new(true);
        machine.subscribe(|_| {}).detach();
        assert_eq!(machine.listener_count(), 1);
    }

    #[test]
    fn test_reentrant_dispatch_is_delivered_in_order() {
        let machine = Arc::new(StateMachine::new(true));
        let log = Arc::new(Mutex::new(Vec::new()));

        // 第一个监听器在看到 welcome 后立即派发 START
        let weak = Arc::downgrade(&machine);
        let _a = machine.subscribe(move |change| {
            if change.current.view_state == ViewState::Welcome {
                if let Some(machine) = weak.upgrade() {
                    machine.dispatch(Event::Start);
                }
            }
        });

        let log_clone = Arc::clone(&log);
        let _b = machine.subscribe(move |change| {
            log_clone
                .lock()
                .unwrap()
                .push((change.previous.view_state, change.current.view_state));
        });

        machine.dispatch(Event::PermissionGranted {
            stream: live_stream(),
        });

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                (ViewState::Permission, ViewState::Welcome),
                (ViewState::Welcome, ViewState::Loading),
            ]
        );
    }

    #[tokio::test]
    async fn test_watch_receives_latest_state() {
        let machine = StateMachine::new(true);
        let (mut rx, _sub) = machine.watch();

        machine.dispatch(Event::PermissionGranted {
            stream: live_stream(),
        });

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().view_state, ViewState::Welcome);
    }
}
