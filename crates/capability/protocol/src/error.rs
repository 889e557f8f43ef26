//! 协议错误类型定义

use crate::types::ListenerKey;

/// 协议层错误
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// 传输类型无法解析
    #[error("invalid transport type: {0}")]
    InvalidTransport(String),

    /// 监听器初始化失败（绑定端口、传输不受支持等）
    #[error("listener {key} init failed: {reason}")]
    ListenerInit { key: ListenerKey, reason: String },

    /// 监听器停止失败
    #[error("listener {key} stop failed: {reason}")]
    ListenerStop { key: ListenerKey, reason: String },

    /// IO 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 锁失效
    #[error("lock poisoned: {0}")]
    LockPoisoned(&'static str),
}
