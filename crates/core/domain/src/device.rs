/// 从站 ID（Modbus unit id）。
pub type SlaveId = u8;

/// 设备状态字段的字面值（外部配置树沿用的原值，含拼写）。
pub const STATUS_SETUP_DEVICE: &str = "Setting up device";
pub const STATUS_START_LISTENING: &str = "Listening started";
pub const STATUS_STOP_LISTENING: &str = "Listening stoppd";

/// 设备生命周期状态。
///
/// `Initializing` 为初始态，`Removed` 为终态，不可再迁出。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceState {
    Initializing,
    Listening,
    Stopped,
    Removed,
}

impl DeviceState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Removed)
    }

    /// 状态迁移是否合法。
    pub fn can_transition_to(self, next: DeviceState) -> bool {
        match (self, next) {
            (Self::Removed, _) => false,
            (_, Self::Removed) => true,
            (Self::Initializing, Self::Listening | Self::Stopped) => true,
            (Self::Listening, Self::Stopped) | (Self::Stopped, Self::Listening) => true,
            (a, b) => a == b,
        }
    }
}

impl std::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Initializing => "initializing",
            Self::Listening => "listening",
            Self::Stopped => "stopped",
            Self::Removed => "removed",
        };
        f.write_str(name)
    }
}

/// 设备可编辑属性（名称、传输类型字符串、端口、从站 ID）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub name: String,
    pub transport_type: String,
    pub port: u16,
    pub slave_id: SlaveId,
}

impl DeviceIdentity {
    pub fn new(
        name: impl Into<String>,
        transport_type: impl Into<String>,
        port: u16,
        slave_id: SlaveId,
    ) -> Self {
        Self {
            name: name.into(),
            transport_type: transport_type.into(),
            port,
            slave_id,
        }
    }
}
