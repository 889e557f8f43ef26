//! # 协议能力模块
//!
//! 为 Modbus 从站模拟提供协议侧的能力：
//! - **ProcessImage**：单个从站的线圈/寄存器地址空间，写入变化时通知观察者
//! - **Listener**：绑定 (传输类型, 端口) 的网络监听器，可承载多个过程映像
//! - **ListenerDirectory**：按 key 共享监听器，首次使用时创建
//! - **ModbusTcpListener**：基于 tokio-modbus 的 TCP 服务端实现
//!
//! ## 架构设计
//!
//! ```text
//! Modbus 主站
//!       │  (TCP, unit id)
//!       ▼
//! ModbusTcpListener ──── ListenerDirectory[(TCP, 502)]
//!       │
//!       ├── ProcessImage(slave 1) ──► ProcessImageObserver
//!       └── ProcessImage(slave 2) ──► ProcessImageObserver
//! ```
//!
//! PDU 编解码由 tokio-modbus 负责，本模块只做请求到映像的映射。

mod directory;
mod error;
mod listener;
mod modbus_tcp;
mod process_image;
mod types;

pub use directory::ListenerDirectory;
pub use error::ProtocolError;
pub use listener::{AttachedImages, Listener, ListenerFactory, ListenerState};
pub use modbus_tcp::{ListenerConfig, ModbusListenerFactory, ModbusTcpListener, UnsupportedListener};
pub use process_image::{DEFAULT_INVALID_ADDRESS_VALUE, ProcessImage, ProcessImageObserver};
pub use types::*;
