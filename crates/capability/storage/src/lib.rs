//! # 点位输出模块
//!
//! 写入桥解码后的点位值经 [`PointSink`] 推送给外部：
//!
//! - [`InMemoryPointStore`]：保存最新值和推送历史（测试、本地演示）
//! - [`ChannelPointSink`]：转发到 mpsc 通道，由异步任务消费
//!
//! ```rust,ignore
//! let (sink, mut rx) = ChannelPointSink::new();
//! let store = Arc::new(InMemoryPointStore::new());
//! tokio::spawn(async move {
//!     while let Some(value) = rx.recv().await {
//!         let _ = store.publish(value);
//!     }
//! });
//! ```

pub mod channel;
pub mod error;
pub mod in_memory;
pub mod traits;

pub use channel::ChannelPointSink;
pub use error::StorageError;
pub use in_memory::*;
pub use traits::PointSink;
