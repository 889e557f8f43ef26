//! 点位输出接口
//!
//! 写入桥把主站写入解码为 [`PointValue`] 后交给 `PointSink`。
//! 调用发生在监听器的网络任务上，实现方不得阻塞。

use crate::error::StorageError;
use domain::PointValue;

/// 点位值输出
pub trait PointSink: Send + Sync {
    fn publish(&self, value: PointValue) -> Result<(), StorageError>;
}
