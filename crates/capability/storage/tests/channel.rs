use domain::{PointValue, PointValueData};
use mbsim_storage::{ChannelPointSink, PointSink};

#[tokio::test]
async fn channel_forwards_values() {
    let (sink, mut rx) = ChannelPointSink::new();
    sink.publish(PointValue::new("pump", "run", PointValueData::Bool(true)))
        .expect("publish");

    let value = rx.recv().await.expect("value");
    assert_eq!(value.device, "pump");
    assert_eq!(value.value, PointValueData::Bool(true));
}

#[test]
fn closed_channel_reports_error() {
    let (sink, rx) = ChannelPointSink::new();
    drop(rx);
    let err = sink
        .publish(PointValue::new("pump", "run", PointValueData::Bool(false)))
        .expect_err("closed");
    assert_eq!(err.to_string(), "point channel closed");
}
