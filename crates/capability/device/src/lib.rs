//! # 设备能力模块
//!
//! Modbus 从站设备的生命周期与写入同步：
//!
//! - [`PointRegistry`]：偏移 → 点位描述（名称 + 数据类型）
//! - [`WriteBridge`]：把主站对线圈/保持寄存器的写入转换为类型化点位值
//! - [`DeviceController`]：创建、编辑、启停、移除设备；按 (传输类型, 端口) 共享监听器
//!
//! 每个设备拥有独立的生命周期队列，同一设备的 start/stop 不会交错执行。

mod bridge;
mod controller;
mod error;
mod registry;
mod worker;

pub use bridge::{WriteBridge, decode_packed_text, encode_packed_text};
pub use controller::{DeviceContext, DeviceController};
pub use error::DeviceError;
pub use registry::{PointDescriptor, PointRegistry};
pub use worker::LifecycleReceipt;
