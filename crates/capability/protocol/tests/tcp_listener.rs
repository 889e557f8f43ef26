use mbsim_protocol::{
    Listener, ListenerConfig, ListenerKey, ListenerState, ModbusTcpListener, ProcessImage,
    TransportType,
};
use std::sync::Arc;
use tokio_modbus::prelude::*;

fn local_listener() -> ModbusTcpListener {
    ModbusTcpListener::new(
        ListenerKey::new(TransportType::Tcp, 0),
        ListenerConfig {
            bind_host: "127.0.0.1".to_string(),
        },
    )
}

#[tokio::test]
async fn start_is_idempotent_and_stop_releases_address() {
    let listener = local_listener();
    assert_eq!(listener.state(), ListenerState::Idle);
    assert!(listener.local_addr().is_none());

    listener.start().await.expect("start");
    let addr = listener.local_addr().expect("bound address");
    listener.start().await.expect("second start");
    assert_eq!(listener.local_addr(), Some(addr));
    assert_eq!(listener.state(), ListenerState::Running);

    listener.stop().await.expect("stop");
    assert_eq!(listener.state(), ListenerState::Stopped);
    assert!(listener.local_addr().is_none());

    // 停止后可再次启动
    listener.start().await.expect("restart");
    assert_eq!(listener.state(), ListenerState::Running);
    listener.stop().await.expect("stop again");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn routes_requests_by_unit_id() {
    let listener = local_listener();
    let first = Arc::new(ProcessImage::new(1));
    let second = Arc::new(ProcessImage::new(2));
    first.set_input_register(0, 11);
    second.set_input_register(0, 22);
    second.set_discrete_input(5, true);
    listener.attach(first.clone());
    listener.attach(second.clone());

    listener.start().await.expect("start");
    let addr = listener.local_addr().expect("bound address");

    let mut ctx = tcp::connect_slave(addr, Slave(1)).await.expect("connect");
    let values = ctx
        .read_input_registers(0, 1)
        .await
        .expect("transport")
        .expect("read first");
    assert_eq!(values, vec![11]);

    ctx.set_slave(Slave(2));
    let values = ctx
        .read_input_registers(0, 1)
        .await
        .expect("transport")
        .expect("read second");
    assert_eq!(values, vec![22]);
    let bits = ctx
        .read_discrete_inputs(5, 1)
        .await
        .expect("transport")
        .expect("read discrete");
    assert!(bits[0]);

    ctx.write_multiple_registers(10, &[1, 2, 3])
        .await
        .expect("transport")
        .expect("write multiple");
    assert_eq!(second.holding_register(11), 2);
    assert_eq!(first.holding_register(11), i16::MIN as u16);

    let err = ctx
        .read_holding_registers(u16::MAX, 2)
        .await
        .expect("transport")
        .expect_err("address overflow");
    assert_eq!(err, ExceptionCode::IllegalDataAddress);

    let _ = ctx.disconnect().await;
    listener.stop().await.expect("stop");
}

/// 取一个当前空闲的本地端口
fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .expect("bind probe socket")
        .local_addr()
        .expect("local addr")
        .port()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn restart_on_same_port_succeeds() {
    let port = free_port();
    let listener = ModbusTcpListener::new(
        ListenerKey::new(TransportType::Tcp, port),
        ListenerConfig {
            bind_host: "127.0.0.1".to_string(),
        },
    );

    for round in 0..20 {
        listener
            .start()
            .await
            .unwrap_or_else(|e| panic!("start round {round}: {e}"));
        assert_eq!(listener.local_addr().map(|a| a.port()), Some(port));
        listener.stop().await.expect("stop");
    }

    // 停止后端口立即可被其他套接字占用
    let rebound = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .expect("port released");
    drop(rebound);
}
