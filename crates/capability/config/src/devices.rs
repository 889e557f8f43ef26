//! 设备清单文件。
//!
//! ```json
//! [
//!   {
//!     "name": "boiler",
//!     "transport_type": "TCP",
//!     "port": 1502,
//!     "slave_id": 1,
//!     "points": [
//!       { "offset": 0, "name": "running", "data_type": "binary", "initial": false },
//!       { "offset": 1, "name": "setpoint", "data_type": "int16", "initial": 42 },
//!       { "offset": 2, "name": "label", "data_type": "char_string", "initial": "AB" }
//!     ]
//!   }
//! ]
//! ```

use crate::ConfigError;
use domain::{PointValueData, SlaveId};
use mbsim_protocol::PointDataType;
use serde::Deserialize;
use std::path::Path;

/// 单个设备配置。
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    pub name: String,
    /// 传输类型原始字符串，由设备控制器解析
    pub transport_type: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_slave_id")]
    pub slave_id: SlaveId,
    #[serde(default)]
    pub points: Vec<PointConfig>,
}

/// 点位配置。
#[derive(Debug, Clone, Deserialize)]
pub struct PointConfig {
    pub offset: u16,
    pub name: String,
    #[serde(default)]
    pub data_type: PointDataType,
    #[serde(default)]
    pub initial: Option<InitialValue>,
}

/// 点位初始值。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum InitialValue {
    Bool(bool),
    Number(i16),
    Text(String),
}

impl From<InitialValue> for PointValueData {
    fn from(value: InitialValue) -> Self {
        match value {
            InitialValue::Bool(v) => PointValueData::Bool(v),
            InitialValue::Number(v) => PointValueData::I16(v),
            InitialValue::Text(v) => PointValueData::String(v),
        }
    }
}

fn default_port() -> u16 {
    502
}

fn default_slave_id() -> SlaveId {
    1
}

/// 解析设备清单 JSON。
pub fn parse_devices(json: &str) -> Result<Vec<DeviceConfig>, ConfigError> {
    Ok(serde_json::from_str(json)?)
}

/// 读取并解析设备清单文件。
pub fn load_devices(path: impl AsRef<Path>) -> Result<Vec<DeviceConfig>, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(path.display().to_string(), e))?;
    parse_devices(&content)
}
