//! 应用运行配置加载。
//!
//! - 运行参数来自 `MBSIM_*` 环境变量
//! - 设备与点位清单来自 JSON 文件（`MBSIM_DEVICES_FILE`）

mod devices;

pub use devices::{DeviceConfig, InitialValue, PointConfig, load_devices, parse_devices};

use std::env;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
    #[error("read {0} failed: {1}")]
    Io(String, std::io::Error),
    #[error("device file parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// 监听器绑定主机
    pub bind_host: String,
    /// 设备清单文件路径
    pub devices_file: Option<String>,
    /// 过程映像无效地址哨兵
    pub invalid_address_value: i16,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_host = env::var("MBSIM_BIND_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let devices_file = read_optional("MBSIM_DEVICES_FILE");
        let invalid_address_value =
            read_i16_with_default("MBSIM_INVALID_ADDRESS_VALUE", i16::MIN)?;

        Ok(Self {
            bind_host,
            devices_file,
            invalid_address_value,
        })
    }

    /// 加载设备清单；未配置文件时为空。
    pub fn devices(&self) -> Result<Vec<DeviceConfig>, ConfigError> {
        match &self.devices_file {
            Some(path) => load_devices(path),
            None => Ok(Vec::new()),
        }
    }
}

fn read_i16_with_default(key: &str, default: i16) -> Result<i16, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .trim()
        .parse::<i16>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}
