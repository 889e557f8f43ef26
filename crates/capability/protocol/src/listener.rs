//! 监听器抽象
//!
//! 一个监听器绑定 (传输类型, 端口)，可同时承载多个设备的过程映像。
//! 启停作用于全部已挂载的设备。

use crate::error::ProtocolError;
use crate::process_image::ProcessImage;
use crate::types::ListenerKey;
use async_trait::async_trait;
use domain::SlaveId;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

/// 监听器运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Idle,
    Running,
    Stopped,
}

/// 网络监听器
#[async_trait]
pub trait Listener: Send + Sync {
    fn key(&self) -> ListenerKey;

    fn state(&self) -> ListenerState;

    /// 挂载过程映像；同一映像重复挂载无效果
    fn attach(&self, image: Arc<ProcessImage>);

    /// 卸载过程映像（按实例比较），返回是否存在
    fn detach(&self, image: &Arc<ProcessImage>) -> bool;

    /// 当前挂载的从站 ID 列表
    fn attached(&self) -> Vec<SlaveId>;

    /// 已挂载映像中是否包含该实例
    fn is_attached(&self, image: &Arc<ProcessImage>) -> bool;

    /// 启动；已在运行时直接返回成功
    async fn start(&self) -> Result<(), ProtocolError>;

    async fn stop(&self) -> Result<(), ProtocolError>;

    /// 实际绑定的地址（端口为 0 时由系统分配）
    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }
}

/// 监听器构造器，由监听器目录在首次使用某个 key 时调用
pub trait ListenerFactory: Send + Sync {
    fn create(&self, key: ListenerKey) -> Arc<dyn Listener>;
}

/// 已挂载映像集合（各监听器实现共用）
#[derive(Default, Clone)]
pub struct AttachedImages {
    images: Arc<RwLock<Vec<Arc<ProcessImage>>>>,
}

impl AttachedImages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, image: Arc<ProcessImage>) {
        if let Ok(mut images) = self.images.write() {
            if !images.iter().any(|existing| Arc::ptr_eq(existing, &image)) {
                images.push(image);
            }
        }
    }

    pub fn detach(&self, image: &Arc<ProcessImage>) -> bool {
        match self.images.write() {
            Ok(mut images) => {
                let before = images.len();
                images.retain(|existing| !Arc::ptr_eq(existing, image));
                images.len() != before
            }
            Err(_) => false,
        }
    }

    pub fn contains(&self, image: &Arc<ProcessImage>) -> bool {
        self.images
            .read()
            .map(|images| images.iter().any(|existing| Arc::ptr_eq(existing, image)))
            .unwrap_or(false)
    }

    /// 按从站 ID 查找，同 ID 多个映像时取最早挂载者
    pub fn find(&self, slave_id: SlaveId) -> Option<Arc<ProcessImage>> {
        self.images
            .read()
            .ok()
            .and_then(|images| images.iter().find(|i| i.slave_id() == slave_id).cloned())
    }

    pub fn slave_ids(&self) -> Vec<SlaveId> {
        self.images
            .read()
            .map(|images| images.iter().map(|i| i.slave_id()).collect())
            .unwrap_or_default()
    }
}
