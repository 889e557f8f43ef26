//! Modbus TCP 监听器实现
//!
//! 基于 tokio-modbus 服务端，按请求中的 unit id 路由到已挂载的过程映像。
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! let factory = ModbusListenerFactory::new(ListenerConfig::default());
//! let directory = ListenerDirectory::new(Arc::new(factory));
//! let listener = directory.resolve("tcp", 502)?;
//! listener.attach(image);
//! listener.start().await?;
//! ```

use crate::error::ProtocolError;
use crate::listener::{AttachedImages, Listener, ListenerFactory, ListenerState};
use crate::process_image::ProcessImage;
use crate::types::{ListenerKey, TransportType};
use async_trait::async_trait;
use domain::SlaveId;
use serde::{Deserialize, Serialize};
use std::future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_modbus::prelude::*;
use tokio_modbus::server::tcp::{Server, accept_tcp_connection};
use tracing::{debug, error, info, warn};

/// 监听器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// 绑定主机地址
    #[serde(default = "default_bind_host")]
    pub bind_host: String,
}

fn default_bind_host() -> String {
    "0.0.0.0".to_string()
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_host: default_bind_host(),
        }
    }
}

/// 默认监听器构造器：TCP 由 tokio-modbus 提供服务，其余传输启动时报初始化错误
pub struct ModbusListenerFactory {
    config: ListenerConfig,
}

impl ModbusListenerFactory {
    pub fn new(config: ListenerConfig) -> Self {
        Self { config }
    }
}

impl ListenerFactory for ModbusListenerFactory {
    fn create(&self, key: ListenerKey) -> Arc<dyn Listener> {
        match key.transport {
            TransportType::Tcp => Arc::new(ModbusTcpListener::new(key, self.config.clone())),
            TransportType::Udp => Arc::new(UnsupportedListener::new(key)),
        }
    }
}

struct Running {
    task: JoinHandle<()>,
    serving: Arc<AtomicBool>,
}

/// Modbus TCP 监听器
pub struct ModbusTcpListener {
    key: ListenerKey,
    config: ListenerConfig,
    images: AttachedImages,
    state: RwLock<ListenerState>,
    local_addr: RwLock<Option<SocketAddr>>,
    /// 串行化不同设备对同一监听器的启停
    running: Mutex<Option<Running>>,
}

impl ModbusTcpListener {
    pub fn new(key: ListenerKey, config: ListenerConfig) -> Self {
        Self {
            key,
            config,
            images: AttachedImages::new(),
            state: RwLock::new(ListenerState::Idle),
            local_addr: RwLock::new(None),
            running: Mutex::new(None),
        }
    }

    fn set_state(&self, state: ListenerState) {
        if let Ok(mut current) = self.state.write() {
            *current = state;
        }
    }

    fn init_error(&self, reason: impl ToString) -> ProtocolError {
        ProtocolError::ListenerInit {
            key: self.key,
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl Listener for ModbusTcpListener {
    fn key(&self) -> ListenerKey {
        self.key
    }

    fn state(&self) -> ListenerState {
        self.state.read().map(|s| *s).unwrap_or(ListenerState::Stopped)
    }

    fn attach(&self, image: Arc<ProcessImage>) {
        debug!(target: "mbsim.protocol", listener = %self.key, slave_id = image.slave_id(), "attach process image");
        self.images.attach(image);
    }

    fn detach(&self, image: &Arc<ProcessImage>) -> bool {
        debug!(target: "mbsim.protocol", listener = %self.key, slave_id = image.slave_id(), "detach process image");
        self.images.detach(image)
    }

    fn attached(&self) -> Vec<SlaveId> {
        self.images.slave_ids()
    }

    fn is_attached(&self, image: &Arc<ProcessImage>) -> bool {
        self.images.contains(image)
    }

    async fn start(&self) -> Result<(), ProtocolError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Ok(());
        }

        let addr = format!("{}:{}", self.config.bind_host, self.key.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| self.init_error(e))?;
        let local_addr = listener.local_addr().map_err(|e| self.init_error(e))?;

        let serving = Arc::new(AtomicBool::new(true));
        let images = self.images.clone();
        let service_flag = Arc::clone(&serving);
        let key = self.key;
        let server = Server::new(listener);

        let task = tokio::spawn(async move {
            let on_connected = move |stream: TcpStream, socket_addr: SocketAddr| {
                let images = images.clone();
                let serving = Arc::clone(&service_flag);
                async move {
                    debug!(target: "mbsim.protocol", peer = %socket_addr, "modbus master connected");
                    accept_tcp_connection(stream, socket_addr, move |_socket_addr| {
                        Ok(Some(SlaveService::new(images.clone(), Arc::clone(&serving))))
                    })
                }
            };
            let on_process_error = move |err| {
                warn!(target: "mbsim.protocol", listener = %key, "modbus session error: {err}");
            };
            if let Err(e) = server.serve(&on_connected, on_process_error).await {
                error!(target: "mbsim.protocol", listener = %key, "modbus server error: {}", e);
            }
        });

        if let Ok(mut slot) = self.local_addr.write() {
            *slot = Some(local_addr);
        }
        *running = Some(Running { task, serving });
        self.set_state(ListenerState::Running);
        info!(target: "mbsim.protocol", listener = %self.key, addr = %local_addr, "modbus tcp listener started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), ProtocolError> {
        let mut running = self.running.lock().await;
        if let Some(current) = running.take() {
            // 已建立的会话由 serving 标志拒绝后续请求
            current.serving.store(false, Ordering::SeqCst);
            current.task.abort();
            // 等待任务结束，确保监听套接字在返回前已关闭，可立即在同一端口重启
            if let Err(e) = current.task.await {
                if !e.is_cancelled() {
                    warn!(target: "mbsim.protocol", listener = %self.key, "modbus server task failed: {}", e);
                }
            }
            info!(target: "mbsim.protocol", listener = %self.key, "modbus tcp listener stopped");
        }
        if let Ok(mut slot) = self.local_addr.write() {
            *slot = None;
        }
        self.set_state(ListenerState::Stopped);
        Ok(())
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.read().ok().and_then(|a| *a)
    }
}

/// 当前引擎不提供服务的传输类型；可挂载，启动失败
pub struct UnsupportedListener {
    key: ListenerKey,
    images: AttachedImages,
    state: RwLock<ListenerState>,
}

impl UnsupportedListener {
    pub fn new(key: ListenerKey) -> Self {
        Self {
            key,
            images: AttachedImages::new(),
            state: RwLock::new(ListenerState::Idle),
        }
    }
}

#[async_trait]
impl Listener for UnsupportedListener {
    fn key(&self) -> ListenerKey {
        self.key
    }

    fn state(&self) -> ListenerState {
        self.state.read().map(|s| *s).unwrap_or(ListenerState::Stopped)
    }

    fn attach(&self, image: Arc<ProcessImage>) {
        self.images.attach(image);
    }

    fn detach(&self, image: &Arc<ProcessImage>) -> bool {
        self.images.detach(image)
    }

    fn attached(&self) -> Vec<SlaveId> {
        self.images.slave_ids()
    }

    fn is_attached(&self, image: &Arc<ProcessImage>) -> bool {
        self.images.contains(image)
    }

    async fn start(&self) -> Result<(), ProtocolError> {
        Err(ProtocolError::ListenerInit {
            key: self.key,
            reason: format!("{} transport is not served by the modbus engine", self.key.transport),
        })
    }

    async fn stop(&self) -> Result<(), ProtocolError> {
        if let Ok(mut state) = self.state.write() {
            *state = ListenerState::Stopped;
        }
        Ok(())
    }
}

/// 单个连接上的 Modbus 服务
#[derive(Clone)]
struct SlaveService {
    images: AttachedImages,
    serving: Arc<AtomicBool>,
}

impl SlaveService {
    fn new(images: AttachedImages, serving: Arc<AtomicBool>) -> Self {
        Self { images, serving }
    }
}

impl tokio_modbus::server::Service for SlaveService {
    type Request = SlaveRequest<'static>;
    type Response = Option<Response>;
    type Exception = ExceptionCode;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        if !self.serving.load(Ordering::SeqCst) {
            return future::ready(Ok(None));
        }
        // 未挂载的 unit id 不应答
        let Some(image) = self.images.find(req.slave) else {
            debug!(target: "mbsim.protocol", slave_id = req.slave, "request for unknown slave");
            return future::ready(Ok(None));
        };
        let res = handle_request(&image, req.request);
        if let Err(e) = &res {
            debug!(target: "mbsim.protocol", slave_id = image.slave_id(), "modbus exception: {:?}", e);
        }
        future::ready(res.map(Some))
    }
}

/// 校验地址区间，返回区间内的偏移
fn offsets(addr: u16, cnt: u16) -> Result<impl Iterator<Item = u16>, ExceptionCode> {
    if cnt == 0 {
        return Err(ExceptionCode::IllegalDataValue);
    }
    if u32::from(addr) + u32::from(cnt) > 0x1_0000 {
        return Err(ExceptionCode::IllegalDataAddress);
    }
    Ok((0..cnt).map(move |i| addr + i))
}

fn device_failure(err: ProtocolError) -> ExceptionCode {
    error!(target: "mbsim.protocol", "process image write failed: {}", err);
    ExceptionCode::ServerDeviceFailure
}

/// 把单个请求映射到过程映像
fn handle_request(image: &ProcessImage, request: Request<'static>) -> Result<Response, ExceptionCode> {
    match request {
        Request::ReadCoils(addr, cnt) => Ok(Response::ReadCoils(
            offsets(addr, cnt)?.map(|o| image.coil(o)).collect(),
        )),
        Request::ReadDiscreteInputs(addr, cnt) => Ok(Response::ReadDiscreteInputs(
            offsets(addr, cnt)?.map(|o| image.discrete_input(o)).collect(),
        )),
        Request::ReadHoldingRegisters(addr, cnt) => Ok(Response::ReadHoldingRegisters(
            offsets(addr, cnt)?.map(|o| image.holding_register(o)).collect(),
        )),
        Request::ReadInputRegisters(addr, cnt) => Ok(Response::ReadInputRegisters(
            offsets(addr, cnt)?.map(|o| image.input_register(o)).collect(),
        )),
        Request::WriteSingleCoil(addr, value) => {
            image.write_coil(addr, value).map_err(device_failure)?;
            Ok(Response::WriteSingleCoil(addr, value))
        }
        Request::WriteMultipleCoils(addr, values) => {
            let cnt = values.len() as u16;
            for (offset, value) in offsets(addr, cnt)?.zip(values.iter()) {
                image.write_coil(offset, *value).map_err(device_failure)?;
            }
            Ok(Response::WriteMultipleCoils(addr, cnt))
        }
        Request::WriteSingleRegister(addr, value) => {
            image
                .write_holding_register(addr, value)
                .map_err(device_failure)?;
            Ok(Response::WriteSingleRegister(addr, value))
        }
        Request::WriteMultipleRegisters(addr, values) => {
            let cnt = values.len() as u16;
            for (offset, value) in offsets(addr, cnt)?.zip(values.iter()) {
                image
                    .write_holding_register(offset, *value)
                    .map_err(device_failure)?;
            }
            Ok(Response::WriteMultipleRegisters(addr, cnt))
        }
        Request::ReadWriteMultipleRegisters(read_addr, read_cnt, write_addr, values) => {
            let read = offsets(read_addr, read_cnt)?;
            let write_cnt = values.len() as u16;
            for (offset, value) in offsets(write_addr, write_cnt)?.zip(values.iter()) {
                image
                    .write_holding_register(offset, *value)
                    .map_err(device_failure)?;
            }
            Ok(Response::ReadWriteMultipleRegisters(
                read.map(|o| image.holding_register(o)).collect(),
            ))
        }
        other => {
            warn!(target: "mbsim.protocol", "unsupported modbus function: {:?}", other);
            Err(ExceptionCode::IllegalFunction)
        }
    }
}
