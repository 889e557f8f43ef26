#![allow(dead_code)]

use async_trait::async_trait;
use mbsim_device::DeviceContext;
use mbsim_protocol::{
    AttachedImages, Listener, ListenerDirectory, ListenerFactory, ListenerKey, ListenerState,
    ProcessImage, ProtocolError, TransportType,
};
use mbsim_storage::InMemoryPointStore;
use domain::SlaveId;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

/// 记录启停顺序的监听器
pub struct RecordingListener {
    key: ListenerKey,
    images: AttachedImages,
    state: RwLock<ListenerState>,
    pub events: Mutex<Vec<&'static str>>,
    start_delay: Duration,
    fail_start: bool,
    fail_stop: bool,
}

impl RecordingListener {
    pub fn new(key: ListenerKey, start_delay: Duration, fail_start: bool, fail_stop: bool) -> Self {
        Self {
            key,
            images: AttachedImages::new(),
            state: RwLock::new(ListenerState::Idle),
            events: Mutex::new(Vec::new()),
            start_delay,
            fail_start,
            fail_stop,
        }
    }

    pub fn events(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl Listener for RecordingListener {
    fn key(&self) -> ListenerKey {
        self.key
    }

    fn state(&self) -> ListenerState {
        *self.state.read().unwrap()
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
        tokio::time::sleep(self.start_delay).await;
        if self.fail_start {
            self.events.lock().unwrap().push("start-failed");
            return Err(ProtocolError::ListenerInit {
                key: self.key,
                reason: "port in use".to_string(),
            });
        }
        self.events.lock().unwrap().push("start");
        *self.state.write().unwrap() = ListenerState::Running;
        Ok(())
    }

    async fn stop(&self) -> Result<(), ProtocolError> {
        if self.fail_stop {
            self.events.lock().unwrap().push("stop-failed");
            return Err(ProtocolError::ListenerStop {
                key: self.key,
                reason: "socket close failed".to_string(),
            });
        }
        self.events.lock().unwrap().push("stop");
        *self.state.write().unwrap() = ListenerState::Stopped;
        Ok(())
    }
}

/// 记录创建过的监听器，供测试取回
#[derive(Default)]
pub struct RecordingFactory {
    pub start_delay: Duration,
    /// 这些端口上的监听器启动失败
    pub failing_ports: Vec<u16>,
    /// 这些端口上的监听器停止失败
    pub failing_stop_ports: Vec<u16>,
    pub created: Mutex<Vec<Arc<RecordingListener>>>,
}

impl RecordingFactory {
    pub fn listener(&self, transport: TransportType, port: u16) -> Arc<RecordingListener> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .find(|l| l.key() == ListenerKey::new(transport, port))
            .cloned()
            .expect("listener created")
    }
}

impl ListenerFactory for RecordingFactory {
    fn create(&self, key: ListenerKey) -> Arc<dyn Listener> {
        let listener = Arc::new(RecordingListener::new(
            key,
            self.start_delay,
            self.failing_ports.contains(&key.port),
            self.failing_stop_ports.contains(&key.port),
        ));
        self.created.lock().unwrap().push(listener.clone());
        listener
    }
}

pub struct Harness {
    pub factory: Arc<RecordingFactory>,
    pub directory: Arc<ListenerDirectory>,
    pub store: Arc<InMemoryPointStore>,
    pub ctx: DeviceContext,
}

pub fn harness(factory: RecordingFactory) -> Harness {
    let factory = Arc::new(factory);
    let directory = Arc::new(ListenerDirectory::new(factory.clone()));
    let store = Arc::new(InMemoryPointStore::new());
    let ctx = DeviceContext::new(
        directory.clone(),
        store.clone(),
        tokio::runtime::Handle::current(),
    );
    Harness {
        factory,
        directory,
        store,
        ctx,
    }
}
