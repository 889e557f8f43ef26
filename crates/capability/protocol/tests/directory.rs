use mbsim_protocol::{
    ListenerConfig, ListenerDirectory, ListenerKey, ListenerState, ModbusListenerFactory,
    ProtocolError, TransportType,
};
use std::sync::Arc;

fn directory() -> ListenerDirectory {
    ListenerDirectory::new(Arc::new(ModbusListenerFactory::new(ListenerConfig::default())))
}

#[test]
fn equal_keys_share_one_listener() {
    let directory = directory();
    let a = directory
        .acquire(ListenerKey::new(TransportType::Tcp, 502))
        .expect("acquire");
    let b = directory.resolve("tcp", 502).expect("resolve");
    let c = directory.resolve(" TCP ", 502).expect("resolve trimmed");

    assert!(Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(&a, &c));
    assert_eq!(directory.len(), 1);
    assert_eq!(a.state(), ListenerState::Idle);
}

#[test]
fn transport_and_port_both_distinguish_listeners() {
    let directory = directory();
    let tcp = directory.resolve("TCP", 502).expect("tcp");
    let udp = directory.resolve("UDP", 502).expect("udp");
    let other = directory.resolve("TCP", 503).expect("other port");

    assert!(!Arc::ptr_eq(&tcp, &udp));
    assert!(!Arc::ptr_eq(&tcp, &other));
    assert_eq!(directory.len(), 3);

    let mut keys = directory.keys();
    keys.sort_by_key(|k| (k.transport.as_str(), k.port));
    assert_eq!(
        keys,
        vec![
            ListenerKey::new(TransportType::Tcp, 502),
            ListenerKey::new(TransportType::Tcp, 503),
            ListenerKey::new(TransportType::Udp, 502),
        ]
    );
    assert!(directory.get(&ListenerKey::new(TransportType::Udp, 503)).is_none());
}

#[test]
fn unknown_transport_is_rejected() {
    let directory = directory();
    let err = directory
        .resolve("RTU", 502)
        .err()
        .expect("unknown transport");
    assert!(matches!(err, ProtocolError::InvalidTransport(_)));
    assert!(directory.is_empty());
}
