//! 设备错误类型定义

use mbsim_protocol::ProtocolError;

/// 设备控制链路错误
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// 传输类型或端口无效，设备无监听器
    #[error("invalid transport configuration: {0}")]
    InvalidTransport(String),

    /// 设备处于降级状态，未绑定监听器
    #[error("device has no listener bound")]
    NoListener,

    /// 监听器启停或目录访问失败
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// 点位不存在
    #[error("unknown point: {0}")]
    UnknownPoint(String),

    /// 点位值与声明类型不符
    #[error("point {point} expects {expected}")]
    ValueType { point: String, expected: &'static str },

    /// 生命周期工作任务已退出
    #[error("lifecycle worker stopped")]
    WorkerGone,
}
