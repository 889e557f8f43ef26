//! 设备生命周期控制器
//!
//! 一个控制器对应一个模拟从站设备：
//!
//! ```text
//! create ──► ProcessImage(slave_id) ◄── WriteBridge ──► PointSink
//!                 │
//!                 ▼ attach
//!          ListenerDirectory[(transport, port)] ──► Listener（多设备共享）
//!                 │
//!                 ▼ start/stop（单设备串行队列）
//!          LifecycleWorker
//! ```
//!
//! create/edit/remove 在调用方的配置线程上同步执行，只做挂载与入队，不等待网络 I/O。
//! 传输配置无效时设备降级为 `Stopped`，不绑定监听器，也不自动重试。

use crate::bridge::{WriteBridge, encode_packed_text};
use crate::error::DeviceError;
use crate::registry::PointRegistry;
use crate::worker::{Command, DeviceSignals, LifecycleReceipt, LifecycleWorker};
use domain::{DeviceIdentity, DeviceState, PointValueData, STATUS_SETUP_DEVICE, SlaveId};
use mbsim_protocol::{
    DEFAULT_INVALID_ADDRESS_VALUE, Listener, ListenerDirectory, ListenerKey, PointDataType,
    ProcessImage,
};
use mbsim_storage::PointSink;
use std::sync::{Arc, RwLock};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

/// 设备共享的外部协作者
#[derive(Clone)]
pub struct DeviceContext {
    pub directory: Arc<ListenerDirectory>,
    pub sink: Arc<dyn PointSink>,
    /// 生命周期工作任务所在的运行时
    pub runtime: Handle,
    pub invalid_address_value: i16,
}

impl DeviceContext {
    pub fn new(directory: Arc<ListenerDirectory>, sink: Arc<dyn PointSink>, runtime: Handle) -> Self {
        Self {
            directory,
            sink,
            runtime,
            invalid_address_value: DEFAULT_INVALID_ADDRESS_VALUE,
        }
    }

    pub fn with_invalid_address_value(mut self, value: i16) -> Self {
        self.invalid_address_value = value;
        self
    }
}

pub struct DeviceController {
    identity: DeviceIdentity,
    ctx: DeviceContext,
    name: Arc<RwLock<String>>,
    image: Arc<ProcessImage>,
    registry: Arc<PointRegistry>,
    bridge: Arc<WriteBridge>,
    listener: Option<Arc<dyn Listener>>,
    signals: Arc<DeviceSignals>,
    commands: mpsc::UnboundedSender<Command>,
}

impl DeviceController {
    /// 创建设备：建映像与写入桥、挂载到监听器，并异步启动监听
    ///
    /// 入队后立即返回。传输配置无效时设备进入 `Stopped`，不视为致命错误。
    pub fn create(ctx: DeviceContext, identity: DeviceIdentity) -> Self {
        let signals = Arc::new(DeviceSignals::new(STATUS_SETUP_DEVICE));
        let name = Arc::new(RwLock::new(identity.name.clone()));

        let image = Arc::new(ProcessImage::new(identity.slave_id));
        image.set_invalid_address_value(ctx.invalid_address_value);

        let registry = Arc::new(PointRegistry::new());
        let bridge = Arc::new(WriteBridge::new(
            Arc::clone(&name),
            Arc::clone(&registry),
            Arc::clone(&ctx.sink),
        ));
        if let Err(e) = image.add_listener(bridge.clone()) {
            error!(target: "mbsim.device", device = %identity.name, error = %e, "write bridge registration failed");
        }

        let (tx, rx) = mpsc::unbounded_channel();
        ctx.runtime
            .spawn(LifecycleWorker::new(Arc::clone(&name), Arc::clone(&signals), rx).run());

        let mut device = Self {
            identity,
            ctx,
            name,
            image,
            registry,
            bridge,
            listener: None,
            signals,
            commands: tx,
        };

        info!(
            target: "mbsim.device",
            device = %device.identity.name,
            slave_id = device.identity.slave_id,
            transport = %device.identity.transport_type,
            port = device.identity.port,
            "setting up device"
        );

        let transport = device.identity.transport_type.clone();
        match device.acquire_listener(&transport, device.identity.port) {
            Ok(listener) => {
                listener.attach(Arc::clone(&device.image));
                device.listener = Some(listener);
                drop(device.start());
            }
            Err(err) => {
                error!(target: "mbsim.device", device = %device.identity.name, error = %err, "invalid transport, device not listening");
                device.signals.record_error(&err);
                device.signals.transition(DeviceState::Stopped);
            }
        }
        device
    }

    fn acquire_listener(&self, transport: &str, port: u16) -> Result<Arc<dyn Listener>, DeviceError> {
        let key = ListenerKey::parse(transport, port)
            .map_err(|e| DeviceError::InvalidTransport(e.to_string()))?;
        Ok(self.ctx.directory.acquire(key)?)
    }

    /// 编辑设备属性
    ///
    /// - 仅名称变化：只改名，映像与监听器不变
    /// - 从站 ID 变化：以新 ID 重建映像（保留已存储的值）
    /// - 传输类型或端口变化：切换到新的监听器并入队启动
    ///
    /// 新传输配置无效时返回错误，设备保持原状。
    pub fn edit(&mut self, update: DeviceIdentity) -> Result<(), DeviceError> {
        let new_key = ListenerKey::parse(&update.transport_type, update.port)
            .map_err(|e| DeviceError::InvalidTransport(e.to_string()))?;
        let old_key = self.listener.as_ref().map(|l| l.key());

        if update.name != self.identity.name {
            self.rename(&update.name);
        }
        if update.slave_id != self.identity.slave_id {
            self.rebuild_image(update.slave_id)?;
        }
        if old_key != Some(new_key) {
            self.switch_listener(new_key)?;
        }

        self.identity = DeviceIdentity {
            transport_type: new_key.transport.to_string(),
            ..update
        };
        Ok(())
    }

    fn rename(&mut self, name: &str) {
        info!(target: "mbsim.device", from = %self.identity.name, to = %name, "device renamed");
        if let Ok(mut current) = self.name.write() {
            *current = name.to_string();
        }
        self.identity.name = name.to_string();
    }

    /// 以新从站 ID 重建映像；写入桥迁移到新映像，监听器上的挂载随之替换
    fn rebuild_image(&mut self, slave_id: SlaveId) -> Result<(), DeviceError> {
        let image = Arc::new(self.image.rebind(slave_id));
        image.add_listener(self.bridge.clone())?;
        self.image.clear_listeners();

        if let Some(listener) = &self.listener {
            listener.detach(&self.image);
            listener.attach(Arc::clone(&image));
        }
        info!(
            target: "mbsim.device",
            device = %self.identity.name,
            from = self.identity.slave_id,
            to = slave_id,
            "process image rebuilt"
        );
        self.image = image;
        self.identity.slave_id = slave_id;
        Ok(())
    }

    /// 切换监听器：从旧监听器卸载本设备的映像（其他设备不受影响），挂载到新监听器并入队启动
    fn switch_listener(&mut self, key: ListenerKey) -> Result<(), DeviceError> {
        let listener = self.ctx.directory.acquire(key)?;

        if let Some(old) = self.listener.take() {
            if old.key() != key {
                old.detach(&self.image);
                debug!(target: "mbsim.device", device = %self.identity.name, listener = %old.key(), "detached from listener");
            }
        }

        listener.attach(Arc::clone(&self.image));
        info!(target: "mbsim.device", device = %self.identity.name, listener = %key, "switched listener");
        self.listener = Some(listener);
        drop(self.start());
        Ok(())
    }

    fn enqueue(&self, build: impl FnOnce(oneshot::Sender<Result<(), DeviceError>>) -> Command) -> LifecycleReceipt {
        let (reply, receipt) = oneshot::channel();
        if let Err(mpsc::error::SendError(command)) = self.commands.send(build(reply)) {
            warn!(target: "mbsim.device", device = %self.identity.name, "lifecycle worker gone");
            if let Command::Start { reply, .. } | Command::Stop { reply, .. } = command {
                let _ = reply.send(Err(DeviceError::WorkerGone));
            }
        }
        receipt
    }

    /// 异步启动监听；同一设备的 start/stop 按提交顺序执行
    pub fn start(&self) -> LifecycleReceipt {
        let listener = self.listener.clone();
        self.enqueue(|reply| Command::Start { listener, reply })
    }

    /// 异步停止监听；失败只记录，设备仍视为已停止
    pub fn stop(&self) -> LifecycleReceipt {
        let listener = self.listener.clone();
        self.enqueue(|reply| Command::Stop { listener, reply })
    }

    /// 等待此前入队的全部生命周期命令执行完毕
    pub async fn flush(&self) {
        let (reply, done) = oneshot::channel();
        if self.commands.send(Command::Flush { reply }).is_ok() {
            let _ = done.await;
        }
    }

    /// 移除设备：先入队停止，再卸载映像、注销写入桥，进入 `Removed`
    ///
    /// 返回停止命令的结果；此后该设备的任何写入都不会到达点位。
    pub fn remove(self) -> LifecycleReceipt {
        let receipt = self.stop();
        if let Some(listener) = &self.listener {
            listener.detach(&self.image);
        }
        self.image.clear_listeners();
        self.bridge.disable();
        self.signals.transition(DeviceState::Removed);
        info!(target: "mbsim.device", device = %self.identity.name, "device removed");
        // 发送端随 self 释放，工作任务处理完停止命令后退出
        receipt
    }

    /// 绑定点位
    ///
    /// 32 位类型只映射单个寄存器，按有符号 16 位原值转发。
    pub fn bind_point(&self, offset: u16, name: impl Into<String>, data_type: PointDataType) {
        let name = name.into();
        if data_type.is_wide() {
            warn!(target: "mbsim.device", device = %self.identity.name, point = %name, offset, ?data_type, "32-bit point mapped to a single register");
        }
        if let Some(previous) = self.registry.bind(offset, name.clone(), data_type) {
            debug!(target: "mbsim.device", device = %self.identity.name, offset, from = %previous.name, to = %name, "point rebound");
        }
    }

    /// 本地推送点位值到映像（不经写入桥回传）
    pub fn write_point(&self, point: &str, value: PointValueData) -> Result<(), DeviceError> {
        let (offset, descriptor) = self
            .registry
            .find_by_name(point)
            .ok_or_else(|| DeviceError::UnknownPoint(point.to_string()))?;

        let mismatch = |expected| DeviceError::ValueType {
            point: point.to_string(),
            expected,
        };
        match (descriptor.data_type, value) {
            (PointDataType::Binary, PointValueData::Bool(v)) => self.image.set_coil(offset, v),
            (PointDataType::Binary, _) => return Err(mismatch("bool")),
            (ty, PointValueData::String(text)) if ty.is_string() => {
                self.image.set_holding_register(offset, encode_packed_text(&text))
            }
            (ty, _) if ty.is_string() => return Err(mismatch("text")),
            (_, PointValueData::I16(v)) => self.image.set_holding_register(offset, v as u16),
            (_, _) => return Err(mismatch("i16")),
        }
        Ok(())
    }

    pub fn name(&self) -> String {
        self.name.read().map(|n| n.clone()).unwrap_or_default()
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn state(&self) -> DeviceState {
        self.signals.state()
    }

    /// 状态字段当前值
    pub fn status(&self) -> String {
        self.signals.status()
    }

    pub fn last_error(&self) -> Option<String> {
        self.signals.last_error()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<DeviceState> {
        self.signals.subscribe_state()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<String> {
        self.signals.subscribe_status()
    }

    pub fn image(&self) -> &Arc<ProcessImage> {
        &self.image
    }

    pub fn registry(&self) -> &Arc<PointRegistry> {
        &self.registry
    }

    /// 当前监听器（降级时为 None）
    pub fn listener(&self) -> Option<&Arc<dyn Listener>> {
        self.listener.as_ref()
    }

    pub fn listener_key(&self) -> Option<ListenerKey> {
        self.listener.as_ref().map(|l| l.key())
    }
}
