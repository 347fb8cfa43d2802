//! 实时采集循环
//!
//! 在状态机处于 runtime/running 时反复采集帧并推理：
//! - 推理进行中时跳过调度，只轮询忙标志
//! - 每轮之间按动态延迟等待
//! - 推理失败后等待冷却时间
//! - 停止或离开运行状态时，进行中的推理允许完成，但结果被丢弃

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::inference::{FrameSource, InferenceCoordinator};
use crate::state::{ApplicationState, StateMachine, Subscription};
use crate::utils::error::AppError;

/// 字幕更新
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "text", rename_all = "snake_case")]
pub enum CaptionUpdate {
    /// 流式部分结果
    Partial(String),
    /// 一帧的最终结果
    Final(String),
    /// 单次推理失败（非致命）
    Error(String),
}

/// 等待结果
enum Wake {
    /// 等待正常结束
    Elapsed,
    /// 运行状态发生变化
    StateChanged,
    /// 收到停止信号
    Stop,
}

/// 采集循环句柄
///
/// 丢弃句柄会发送停止信号
pub struct CaptureLoop {
    /// 停止信号发送器
    stop_tx: Option<watch::Sender<bool>>,
    /// 任务句柄
    handle: Option<JoinHandle<()>>,
}

impl CaptureLoop {
    /// 创建并启动采集循环
    ///
    /// 循环本身不改变状态机，只根据状态决定是否工作
    pub fn start(
        machine: &StateMachine,
        coordinator: Arc<InferenceCoordinator>,
        source: Arc<dyn FrameSource>,
        instruction: String,
        captions: broadcast::Sender<CaptionUpdate>,
    ) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (state_rx, subscription) = machine.watch();

        let worker = Worker {
            coordinator,
            source,
            instruction,
            captions,
            state_rx,
            stop_rx,
            _subscription: subscription,
        };

        let handle = tokio::spawn(worker.run());

        tracing::info!("CaptureLoop started");
        Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }

    /// 停止循环并等待任务退出
    ///
    /// 进行中的推理不能被打断，会等待其完成
    pub async fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "CaptureLoop task failed");
            }
        }
    }

    /// 循环任务是否仍在运行
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(true);
        }
    }
}

struct Worker {
    coordinator: Arc<InferenceCoordinator>,
    source: Arc<dyn FrameSource>,
    instruction: String,
    captions: broadcast::Sender<CaptionUpdate>,
    state_rx: watch::Receiver<ApplicationState>,
    stop_rx: watch::Receiver<bool>,
    _subscription: Subscription,
}

impl Worker {
    async fn run(mut self) {
        loop {
            if self.stopped() {
                break;
            }

            let live = self.state_rx.borrow().is_live();
            if !live {
                if !self.wait_until_live().await {
                    break;
                }
                continue;
            }

            // 推理进行中：不采集，稍后再看
            if self.coordinator.is_busy() {
                let poll = self.coordinator.config().busy_poll;
                match self.sleep(poll).await {
                    Wake::Stop => break,
                    Wake::Elapsed | Wake::StateChanged => continue,
                }
            }

            let captions = self.captions.clone();
            let result = self
                .coordinator
                .run_once(self.source.as_ref(), &self.instruction, move |partial| {
                    let _ = captions.send(CaptionUpdate::Partial(partial.to_string()));
                })
                .await;

            let still_live = self.state_rx.borrow().is_live();
            if self.stopped() || !still_live {
                tracing::debug!("Discarding inference result from a stopped loop");
                continue;
            }

            let delay = match result {
                Ok(text) if text.is_empty() => self.coordinator.config().busy_poll,
                Ok(text) => {
                    let _ = self.captions.send(CaptionUpdate::Final(text));
                    self.coordinator.dynamic_delay()
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Caption inference failed, cooling down");
                    let message = AppError::from(e).user_message();
                    let _ = self.captions.send(CaptionUpdate::Error(message));
                    self.coordinator.config().error_cooldown
                }
            };

            if let Wake::Stop = self.sleep(delay).await {
                break;
            }
        }

        tracing::debug!("CaptureLoop stopped");
    }

    fn stopped(&self) -> bool {
        *self.stop_rx.borrow() || self.stop_rx.has_changed().is_err()
    }

    /// 等待进入运行状态，返回 false 表示应当退出
    async fn wait_until_live(&mut self) -> bool {
        tokio::select! {
            _ = self.stop_rx.changed() => false,
            result = self.state_rx.wait_for(ApplicationState::is_live) => result.is_ok(),
        }
    }

    /// 可取消的等待，离开运行状态时提前结束
    async fn sleep(&mut self, delay: Duration) -> Wake {
        tokio::select! {
            _ = self.stop_rx.changed() => Wake::Stop,
            result = self.state_rx.wait_for(|s| !s.is_live()) => match result {
                Ok(_) => Wake::StateChanged,
                Err(_) => Wake::Stop,
            },
            _ = tokio::time::sleep(delay) => Wake::Elapsed,
        }
    }
}
