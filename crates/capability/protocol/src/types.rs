//! 协议相关类型定义

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ProtocolError;

/// 监听器传输类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransportType {
    Tcp,
    Udp,
}

impl TransportType {
    pub const ALL: [TransportType; 2] = [TransportType::Tcp, TransportType::Udp];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
        }
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportType {
    type Err = ProtocolError;

    /// 大小写不敏感，首尾空白忽略。
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TCP" => Ok(Self::Tcp),
            "UDP" => Ok(Self::Udp),
            _ => Err(ProtocolError::InvalidTransport(s.to_string())),
        }
    }
}

/// 监听器标识：(传输类型, 端口)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerKey {
    pub transport: TransportType,
    pub port: u16,
}

impl ListenerKey {
    pub fn new(transport: TransportType, port: u16) -> Self {
        Self { transport, port }
    }

    /// 从配置树的字符串属性解析
    pub fn parse(transport: &str, port: u16) -> Result<Self, ProtocolError> {
        Ok(Self::new(transport.parse()?, port))
    }
}

impl fmt::Display for ListenerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.transport, self.port)
    }
}

/// 点位数据类型
///
/// 单个寄存器内的数值类型按有符号 16 位原值输出；
/// 字符串类型把寄存器按大端拆成两个字节解码为文本。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointDataType {
    /// 线圈（单比特）
    Binary,
    /// 16位有符号整数
    Int16,
    /// 16位无符号整数
    Uint16,
    /// 32位有符号整数；只映射单个寄存器，按有符号 16 位原值转发，不做双寄存器拼接
    Int32,
    /// 32位无符号整数；同上，只转发单个寄存器的原值
    Uint32,
    /// 32位浮点数；同上，只转发单个寄存器的原值
    Float32,
    /// 定长字符串
    CharString,
    /// 变长字符串
    VarCharString,
}

impl Default for PointDataType {
    fn default() -> Self {
        Self::Int16
    }
}

impl PointDataType {
    pub fn is_string(self) -> bool {
        matches!(self, Self::CharString | Self::VarCharString)
    }

    pub fn is_binary(self) -> bool {
        matches!(self, Self::Binary)
    }

    /// 声明宽度超过单个寄存器的类型（只转发所映射寄存器的原值）
    pub fn is_wide(self) -> bool {
        matches!(self, Self::Int32 | Self::Uint32 | Self::Float32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_parse_ignores_case() {
        assert_eq!("tcp".parse::<TransportType>().unwrap(), TransportType::Tcp);
        assert_eq!(" Udp ".parse::<TransportType>().unwrap(), TransportType::Udp);
        assert!("serial".parse::<TransportType>().is_err());
    }

    #[test]
    fn listener_key_display() {
        let key = ListenerKey::parse("tcp", 502).unwrap();
        assert_eq!(key.to_string(), "TCP:502");
    }

    #[test]
    fn data_type_from_json() {
        let ty: PointDataType = serde_json::from_str("\"char_string\"").unwrap();
        assert!(ty.is_string());
        let ty: PointDataType = serde_json::from_str("\"binary\"").unwrap();
        assert!(ty.is_binary());
        assert!(!PointDataType::default().is_string());
    }

    #[test]
    fn wide_types() {
        assert!(PointDataType::Float32.is_wide());
        assert!(PointDataType::Uint32.is_wide());
        assert!(!PointDataType::Int16.is_wide());
        assert!(!PointDataType::CharString.is_wide());
    }
}
