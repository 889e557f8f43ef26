pub mod data;
pub mod device;

pub use data::{PointValue, PointValueData, now_epoch_ms};
pub use device::{
    DeviceIdentity, DeviceState, STATUS_SETUP_DEVICE, STATUS_START_LISTENING,
    STATUS_STOP_LISTENING, SlaveId,
};
