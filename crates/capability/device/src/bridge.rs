//! 写入桥
//!
//! 监听过程映像的主站写入，查点位注册表，把原始值转换为类型化的点位值推送出去。
//! 回调在监听器的网络任务上执行；任何失败只记录并丢弃，不向协议层传播。
//! 等值写入已由过程映像过滤并计数，这里的比较只防直接调用。

use crate::registry::{PointDescriptor, PointRegistry};
use domain::{PointValue, PointValueData};
use mbsim_protocol::ProcessImageObserver;
use mbsim_storage::PointSink;
use mbsim_telemetry::{
    record_dropped_unmapped, record_point_published,
    record_publish_failure,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// 把寄存器值按大端拆成两个字节并按 UTF-8 宽松解码
///
/// 非法字节序列替换为 U+FFFD，不报错。
pub fn decode_packed_text(value: i16) -> String {
    String::from_utf8_lossy(&value.to_be_bytes()).into_owned()
}

/// 把文本的前两个字节按大端打包为寄存器值，不足补 0
pub fn encode_packed_text(text: &str) -> u16 {
    let bytes = text.as_bytes();
    let high = bytes.first().copied().unwrap_or(0);
    let low = bytes.get(1).copied().unwrap_or(0);
    u16::from_be_bytes([high, low])
}

pub struct WriteBridge {
    device: Arc<RwLock<String>>,
    registry: Arc<PointRegistry>,
    sink: Arc<dyn PointSink>,
    enabled: AtomicBool,
}

impl WriteBridge {
    pub fn new(
        device: Arc<RwLock<String>>,
        registry: Arc<PointRegistry>,
        sink: Arc<dyn PointSink>,
    ) -> Self {
        Self {
            device,
            registry,
            sink,
            enabled: AtomicBool::new(true),
        }
    }

    /// 停止转发（设备移除后）
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn device_name(&self) -> String {
        self.device.read().map(|n| n.clone()).unwrap_or_default()
    }

    fn forward(&self, offset: u16, value: impl FnOnce(&PointDescriptor) -> PointValueData) {
        if !self.is_enabled() {
            return;
        }
        let device = self.device_name();
        let Some(descriptor) = self.registry.resolve(offset) else {
            warn!(target: "mbsim.device", device = %device, offset, "write to unmapped offset dropped");
            record_dropped_unmapped();
            return;
        };

        let data = value(&descriptor);
        debug!(
            target: "mbsim.device",
            device = %device,
            point = %descriptor.name,
            offset,
            value = %data,
            "point update"
        );
        match self.sink.publish(PointValue::new(device, descriptor.name.clone(), data)) {
            Ok(()) => record_point_published(),
            Err(e) => {
                warn!(target: "mbsim.device", point = %descriptor.name, error = %e, "point publish failed");
                record_publish_failure();
            }
        }
    }
}

impl ProcessImageObserver for WriteBridge {
    fn coil_write(&self, offset: u16, old_value: bool, new_value: bool) {
        if old_value == new_value {
            return;
        }
        self.forward(offset, |_| PointValueData::Bool(new_value));
    }

    fn holding_register_write(&self, offset: u16, old_value: i16, new_value: i16) {
        if old_value == new_value {
            return;
        }
        self.forward(offset, |descriptor| {
            if descriptor.data_type.is_string() {
                PointValueData::String(decode_packed_text(new_value))
            } else {
                PointValueData::I16(new_value)
            }
        });
    }
}
