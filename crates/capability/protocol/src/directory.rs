//! 监听器目录
//!
//! 按 (传输类型, 端口) 共享监听器：同一 key 始终返回同一实例，首次使用时创建。
//! 目录从不销毁监听器，设备只持有非独占引用。

use crate::error::ProtocolError;
use crate::listener::{Listener, ListenerFactory};
use crate::types::ListenerKey;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::info;

pub struct ListenerDirectory {
    factory: Arc<dyn ListenerFactory>,
    listeners: RwLock<HashMap<ListenerKey, Arc<dyn Listener>>>,
}

impl ListenerDirectory {
    pub fn new(factory: Arc<dyn ListenerFactory>) -> Self {
        Self {
            factory,
            listeners: RwLock::new(HashMap::new()),
        }
    }

    /// 获取（或创建）监听器
    pub fn acquire(&self, key: ListenerKey) -> Result<Arc<dyn Listener>, ProtocolError> {
        if let Some(listener) = self
            .listeners
            .read()
            .map_err(|_| ProtocolError::LockPoisoned("listener directory"))?
            .get(&key)
        {
            return Ok(Arc::clone(listener));
        }

        let mut listeners = self
            .listeners
            .write()
            .map_err(|_| ProtocolError::LockPoisoned("listener directory"))?;
        // 读锁释放后可能已被其他线程创建
        let listener = listeners
            .entry(key)
            .or_insert_with(|| {
                info!(target: "mbsim.protocol", listener = %key, "listener created");
                self.factory.create(key)
            })
            .clone();
        Ok(listener)
    }

    /// 由配置树的字符串属性解析 key 后获取
    pub fn resolve(&self, transport: &str, port: u16) -> Result<Arc<dyn Listener>, ProtocolError> {
        self.acquire(ListenerKey::parse(transport, port)?)
    }

    /// 已存在时返回，不创建
    pub fn get(&self, key: &ListenerKey) -> Option<Arc<dyn Listener>> {
        self.listeners.read().ok().and_then(|l| l.get(key).cloned())
    }

    pub fn keys(&self) -> Vec<ListenerKey> {
        self.listeners
            .read()
            .map(|l| l.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.listeners.read().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
