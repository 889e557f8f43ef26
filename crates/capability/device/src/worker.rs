//! 设备生命周期工作任务
//!
//! 每个设备一个单消费者队列：同一设备的 start/stop 严格按提交顺序执行、互不重叠；
//! 不同设备的队列彼此独立。配置线程只入队，不等待网络 I/O。

use crate::error::DeviceError;
use domain::{DeviceState, STATUS_START_LISTENING, STATUS_STOP_LISTENING};
use mbsim_protocol::Listener;
use mbsim_telemetry::{record_lifecycle_command, record_listener_start, record_listener_stop_failure};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{error, info, warn};

/// start/stop 的执行结果；可 await，也可直接丢弃
pub type LifecycleReceipt = oneshot::Receiver<Result<(), DeviceError>>;

pub(crate) enum Command {
    Start {
        listener: Option<Arc<dyn Listener>>,
        reply: oneshot::Sender<Result<(), DeviceError>>,
    },
    Stop {
        listener: Option<Arc<dyn Listener>>,
        reply: oneshot::Sender<Result<(), DeviceError>>,
    },
    Flush {
        reply: oneshot::Sender<()>,
    },
}

/// 设备状态与状态字段的广播
pub(crate) struct DeviceSignals {
    state: watch::Sender<DeviceState>,
    status: watch::Sender<String>,
    last_error: Mutex<Option<String>>,
}

impl DeviceSignals {
    pub(crate) fn new(status: &str) -> Self {
        let (state, _) = watch::channel(DeviceState::Initializing);
        let (status, _) = watch::channel(status.to_string());
        Self {
            state,
            status,
            last_error: Mutex::new(None),
        }
    }

    /// 按状态机迁移；非法迁移（如 Removed 之后）忽略
    pub(crate) fn transition(&self, next: DeviceState) -> bool {
        self.state.send_if_modified(|current| {
            if *current != next && current.can_transition_to(next) {
                *current = next;
                true
            } else {
                false
            }
        })
    }

    pub(crate) fn set_status(&self, status: &str) {
        if self.state().is_terminal() {
            return;
        }
        self.status.send_replace(status.to_string());
    }

    pub(crate) fn record_error(&self, err: &DeviceError) {
        if let Ok(mut last) = self.last_error.lock() {
            *last = Some(err.to_string());
        }
    }

    pub(crate) fn state(&self) -> DeviceState {
        *self.state.borrow()
    }

    pub(crate) fn status(&self) -> String {
        self.status.borrow().clone()
    }

    pub(crate) fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|e| e.clone())
    }

    pub(crate) fn subscribe_state(&self) -> watch::Receiver<DeviceState> {
        self.state.subscribe()
    }

    pub(crate) fn subscribe_status(&self) -> watch::Receiver<String> {
        self.status.subscribe()
    }
}

pub(crate) struct LifecycleWorker {
    device: Arc<RwLock<String>>,
    signals: Arc<DeviceSignals>,
    rx: mpsc::UnboundedReceiver<Command>,
}

impl LifecycleWorker {
    pub(crate) fn new(
        device: Arc<RwLock<String>>,
        signals: Arc<DeviceSignals>,
        rx: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        Self {
            device,
            signals,
            rx,
        }
    }

    fn device(&self) -> String {
        self.device.read().map(|n| n.clone()).unwrap_or_default()
    }

    /// 所有发送端释放后，处理完剩余命令再退出
    pub(crate) async fn run(mut self) {
        while let Some(command) = self.rx.recv().await {
            match command {
                Command::Start { listener, reply } => {
                    record_lifecycle_command();
                    let result = self.start(listener).await;
                    let _ = reply.send(result);
                }
                Command::Stop { listener, reply } => {
                    record_lifecycle_command();
                    let result = self.stop(listener).await;
                    let _ = reply.send(result);
                }
                Command::Flush { reply } => {
                    let _ = reply.send(());
                }
            }
        }
        info!(target: "mbsim.device", device = %self.device(), "lifecycle worker exited");
    }

    async fn start(&self, listener: Option<Arc<dyn Listener>>) -> Result<(), DeviceError> {
        let Some(listener) = listener else {
            let err = DeviceError::NoListener;
            warn!(target: "mbsim.device", device = %self.device(), "start skipped: {}", err);
            self.signals.transition(DeviceState::Stopped);
            self.signals.record_error(&err);
            return Err(err);
        };

        match listener.start().await {
            Ok(()) => {
                record_listener_start(true);
                self.signals.transition(DeviceState::Listening);
                self.signals.set_status(STATUS_START_LISTENING);
                info!(target: "mbsim.device", device = %self.device(), listener = %listener.key(), "listening started");
                Ok(())
            }
            Err(e) => {
                record_listener_start(false);
                let err = DeviceError::from(e);
                error!(target: "mbsim.device", device = %self.device(), listener = %listener.key(), error = %err, "listener start failed");
                self.signals.transition(DeviceState::Stopped);
                self.signals.record_error(&err);
                Err(err)
            }
        }
    }

    async fn stop(&self, listener: Option<Arc<dyn Listener>>) -> Result<(), DeviceError> {
        let result = match listener {
            Some(listener) => listener.stop().await.map_err(|e| {
                record_listener_stop_failure();
                let err = DeviceError::from(e);
                error!(target: "mbsim.device", device = %self.device(), listener = %listener.key(), error = %err, "listener stop failed");
                self.signals.record_error(&err);
                err
            }),
            None => Ok(()),
        };

        // 停止失败也视为已停止
        self.signals.transition(DeviceState::Stopped);
        self.signals.set_status(STATUS_STOP_LISTENING);
        info!(target: "mbsim.device", device = %self.device(), "listening stopped");
        result
    }
}
