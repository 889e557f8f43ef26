//! 通道点位输出
//!
//! 把点位值转发到无界 mpsc 通道，由异步消费者处理；
//! 网络任务上的推送不会阻塞。

use crate::error::StorageError;
use crate::traits::PointSink;
use domain::PointValue;
use tokio::sync::mpsc;

pub struct ChannelPointSink {
    tx: mpsc::UnboundedSender<PointValue>,
}

impl ChannelPointSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PointValue>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl PointSink for ChannelPointSink {
    fn publish(&self, value: PointValue) -> Result<(), StorageError> {
        self.tx
            .send(value)
            .map_err(|_| StorageError::new("point channel closed"))
    }
}
