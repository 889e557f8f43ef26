//! Modbus 从站模拟器：按设备清单启动监听，把主站写入转为点位更新。

mod simulator;

use mbsim_config::AppConfig;
use mbsim_telemetry::{init_tracing, metrics};
use simulator::Simulator;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    // 从环境变量加载运行配置
    let config = AppConfig::from_env()?;
    // 初始化结构化日志
    init_tracing();

    let devices = config.devices()?;
    let simulator = Simulator::start(&config, devices);
    info!(target: "mbsim", devices = simulator.device_count(), "simulator running");

    tokio::signal::ctrl_c().await?;
    info!(target: "mbsim", "shutdown requested");
    let store = simulator.shutdown().await;

    let snapshot = metrics().snapshot();
    info!(
        target: "mbsim",
        points_published = snapshot.points_published,
        publish_failure = snapshot.publish_failure,
        dropped_unmapped = snapshot.dropped_unmapped,
        stored_points = store.len(),
        "simulator stopped"
    );
    Ok(())
}
