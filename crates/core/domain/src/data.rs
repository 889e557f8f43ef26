/// 点位值的数据类型。
///
/// 一个寄存器槽位按点位声明的类型，输出为数值或两字符文本。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PointValueData {
    Bool(bool),
    I16(i16),
    String(String),
}

impl std::fmt::Display for PointValueData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", v),
            Self::I16(v) => write!(f, "{}", v),
            Self::String(v) => write!(f, "{}", v),
        }
    }
}

/// 推送给外部的点位值。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointValue {
    /// 设备名称
    pub device: String,
    /// 点位名称
    pub point: String,
    pub ts_ms: i64,
    pub value: PointValueData,
}

impl PointValue {
    pub fn new(device: impl Into<String>, point: impl Into<String>, value: PointValueData) -> Self {
        Self {
            device: device.into(),
            point: point.into(),
            ts_ms: now_epoch_ms(),
            value,
        }
    }
}

/// 获取当前时间戳（毫秒）
pub fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
