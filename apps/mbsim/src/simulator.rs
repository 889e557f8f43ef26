//! 模拟器装配
//!
//! 把监听器目录、写入通道与设备控制器组装起来：
//! 主站写入经写入桥进入通道，由后台任务记录日志并写入内存点位存储。

use domain::{DeviceIdentity, PointValue};
use mbsim_config::{AppConfig, DeviceConfig};
use mbsim_device::{DeviceContext, DeviceController};
use mbsim_protocol::{ListenerConfig, ListenerDirectory, ModbusListenerFactory};
use mbsim_storage::{ChannelPointSink, InMemoryPointStore, PointSink};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct Simulator {
    devices: Vec<DeviceController>,
    store: Arc<InMemoryPointStore>,
    consumer: JoinHandle<()>,
}

impl Simulator {
    pub fn start(config: &AppConfig, devices: Vec<DeviceConfig>) -> Self {
        let listener = ListenerConfig {
            bind_host: config.bind_host.clone(),
        };
        Self::with_listener_config(listener, config.invalid_address_value, devices)
    }

    fn with_listener_config(
        listener: ListenerConfig,
        invalid_address_value: i16,
        devices: Vec<DeviceConfig>,
    ) -> Self {
        let directory = Arc::new(ListenerDirectory::new(Arc::new(ModbusListenerFactory::new(
            listener,
        ))));
        let (sink, rx) = ChannelPointSink::new();
        let store = Arc::new(InMemoryPointStore::new());
        let consumer = tokio::spawn(consume_updates(rx, Arc::clone(&store)));

        let ctx = DeviceContext::new(directory, Arc::new(sink), tokio::runtime::Handle::current())
            .with_invalid_address_value(invalid_address_value);
        let devices = devices
            .into_iter()
            .map(|device| create_device(&ctx, device))
            .collect();

        Self {
            devices,
            store,
            consumer,
        }
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    #[cfg(test)]
    fn devices(&self) -> &[DeviceController] {
        &self.devices
    }

    /// 移除全部设备并等待写入通道排空
    pub async fn shutdown(self) -> Arc<InMemoryPointStore> {
        for device in self.devices {
            let name = device.name();
            match device.remove().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(target: "mbsim", device = %name, error = %e, "device stop failed"),
                Err(_) => warn!(target: "mbsim", device = %name, "lifecycle worker gone before stop"),
            }
        }
        // 所有写入桥释放后通道关闭，后台任务随之退出
        if let Err(e) = self.consumer.await {
            warn!(target: "mbsim", error = %e, "point consumer aborted");
        }
        info!(target: "mbsim", points = self.store.len(), "point store drained");
        self.store
    }
}

fn create_device(ctx: &DeviceContext, config: DeviceConfig) -> DeviceController {
    let identity = DeviceIdentity::new(
        config.name,
        config.transport_type,
        config.port,
        config.slave_id,
    );
    let device = DeviceController::create(ctx.clone(), identity);

    for point in config.points {
        device.bind_point(point.offset, point.name.clone(), point.data_type);
        if let Some(initial) = point.initial {
            if let Err(e) = device.write_point(&point.name, initial.into()) {
                warn!(target: "mbsim", device = %device.name(), point = %point.name, error = %e, "initial value rejected");
            }
        }
    }
    device
}

async fn consume_updates(mut rx: mpsc::UnboundedReceiver<PointValue>, store: Arc<InMemoryPointStore>) {
    while let Some(value) = rx.recv().await {
        info!(
            target: "mbsim",
            device = %value.device,
            point = %value.point,
            value = %value.value,
            "point updated"
        );
        if let Err(e) = store.publish(value) {
            warn!(target: "mbsim", error = %e, "point store write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{DeviceState, PointValueData};
    use mbsim_config::parse_devices;

    const DEVICES: &str = r#"[
        {
            "name": "boiler",
            "transport_type": "tcp",
            "port": 0,
            "slave_id": 4,
            "points": [
                { "offset": 0, "name": "running", "data_type": "binary", "initial": true },
                { "offset": 1, "name": "setpoint", "initial": 42 },
                { "offset": 2, "name": "label", "data_type": "char_string", "initial": "AB" },
                { "offset": 3, "name": "broken", "data_type": "binary", "initial": 7 }
            ]
        },
        { "name": "ghost", "transport_type": "serial" }
    ]"#;

    fn local() -> ListenerConfig {
        ListenerConfig {
            bind_host: "127.0.0.1".to_string(),
        }
    }

    #[tokio::test]
    async fn devices_start_with_initial_values() {
        let devices = parse_devices(DEVICES).expect("devices");
        let simulator = Simulator::with_listener_config(local(), i16::MIN, devices);
        assert_eq!(simulator.device_count(), 2);

        let boiler = &simulator.devices()[0];
        boiler.flush().await;
        assert_eq!(boiler.state(), DeviceState::Listening);
        assert!(boiler.image().coil(0));
        assert_eq!(boiler.image().holding_register(1), 42);
        assert_eq!(boiler.image().holding_register(2), 0x4142);
        // 类型不符的初始值被拒绝，读到哨兵
        assert_eq!(boiler.image().coil(3), i16::MIN != 0);

        let ghost = &simulator.devices()[1];
        assert_eq!(ghost.state(), DeviceState::Stopped);
        assert!(ghost.listener().is_none());

        let store = simulator.shutdown().await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn master_writes_are_stored() {
        let devices = parse_devices(DEVICES).expect("devices");
        let simulator = Simulator::with_listener_config(local(), i16::MIN, devices);
        let image = Arc::clone(simulator.devices()[0].image());

        image.write_holding_register(1, 43).expect("write setpoint");
        image.write_coil(0, false).expect("write running");

        let store = simulator.shutdown().await;
        assert_eq!(store.last_value("boiler", "setpoint"), Some(PointValueData::I16(43)));
        assert_eq!(store.last_value("boiler", "running"), Some(PointValueData::Bool(false)));
    }
}
