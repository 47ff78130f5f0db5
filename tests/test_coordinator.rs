mod common;
use common::*;

use growatt_bridge::coordinator::Coordinator;
use growatt_bridge::datalog_writer::DatalogWriter;
use growatt_bridge::prelude::*;
use growatt_bridge::proxy::{Direction, Intercepted};

use bytes::Bytes;

fn intercepted(direction: Direction, wire: Vec<u8>) -> Intercepted {
    Intercepted {
        direction,
        peer: "192.0.2.10:40000".parse().unwrap(),
        bytes: Bytes::from(wire),
    }
}

fn mqtt_config() -> ConfigWrapper {
    config(
        r#"
proxy:
  listen: 127.0.0.1:0
  upstream: 127.0.0.1:5279
mqtt:
  host: localhost
  namespace: solar
"#,
    )
}

#[test]
fn data_request_yields_record() {
    common_setup();

    let coordinator = Coordinator::new(default_config(), Channels::new(), None);
    let record = coordinator
        .process(&intercepted(Direction::Request, Factory::data_frame()))
        .unwrap();

    assert_eq!(record.serial.trimmed(), "SER0000001");
    assert_eq!(record.state_of_charge, 65.0);

    let stats = coordinator.shared_stats.lock().unwrap();
    assert_eq!(stats.requests_received, 1);
    assert_eq!(stats.records_decoded, 1);
    assert_eq!(stats.frames_by_kind.get(&MessageKind::Data), Some(&1));
    assert_eq!(
        stats.last_seen.get("SER0000001").map(String::as_str),
        Some("2024-03-15T10:30:00+00:00")
    );
}

#[test]
fn responses_are_counted_but_not_decoded() {
    common_setup();

    let coordinator = Coordinator::new(default_config(), Channels::new(), None);
    let result = coordinator.process(&intercepted(Direction::Response, Factory::data_frame()));

    assert!(result.is_none());
    let stats = coordinator.shared_stats.lock().unwrap();
    assert_eq!(stats.responses_received, 1);
    assert_eq!(stats.records_decoded, 0);
}

#[test]
fn ping_yields_nothing() {
    common_setup();

    let coordinator = Coordinator::new(default_config(), Channels::new(), None);
    assert!(coordinator
        .process(&intercepted(Direction::Request, Factory::ping_frame()))
        .is_none());

    let stats = coordinator.shared_stats.lock().unwrap();
    assert_eq!(stats.frames_by_kind.get(&MessageKind::Ping), Some(&1));
    assert!(stats.decode_errors.is_empty());
}

#[test]
fn decode_errors_are_counted_by_class() {
    common_setup();

    let coordinator = Coordinator::new(default_config(), Channels::new(), None);

    let mut corrupt = Factory::data_frame();
    corrupt[20] ^= 0x01;
    assert!(coordinator
        .process(&intercepted(Direction::Request, corrupt))
        .is_none());

    let short = Factory::data_frame()[..30].to_vec();
    assert!(coordinator
        .process(&intercepted(Direction::Request, short))
        .is_none());

    let stats = coordinator.shared_stats.lock().unwrap();
    assert_eq!(stats.decode_errors.get("checksum"), Some(&1));
    assert_eq!(stats.decode_errors.get("truncated"), Some(&1));
    assert_eq!(stats.requests_received, 0);
}

#[test]
fn records_are_sent_to_mqtt() -> Result<()> {
    common_setup();

    let channels = Channels::new();
    let mut to_mqtt = channels.to_mqtt.subscribe();
    let coordinator = Coordinator::new(mqtt_config(), channels.clone(), None);

    coordinator
        .process(&intercepted(Direction::Request, Factory::data_frame()))
        .unwrap();

    let mut messages = Vec::new();
    while let Ok(mqtt::ChannelData::Message(message)) = to_mqtt.try_recv() {
        messages.push(message);
    }

    let soc = messages
        .iter()
        .find(|m| m.topic == "SER0000001/inverter_battery_state_of_charge")
        .unwrap();
    assert_eq!(soc.payload, "65");
    assert!(soc.retain);

    let to_user = messages
        .iter()
        .find(|m| m.topic == "SER0000001/inverter_power_watts/to-user")
        .unwrap();
    assert_eq!(to_user.payload, "1234.5");

    let record = messages
        .iter()
        .find(|m| m.topic == "SER0000001/record")
        .unwrap();
    let json: serde_json::Value = serde_json::from_str(&record.payload)?;
    assert_eq!(json["serial"], "SER0000001");
    assert!(!record.retain);

    Ok(())
}

#[test]
fn nothing_goes_to_mqtt_when_disabled() {
    common_setup();

    let channels = Channels::new();
    let mut to_mqtt = channels.to_mqtt.subscribe();
    let coordinator = Coordinator::new(default_config(), channels.clone(), None);

    coordinator
        .process(&intercepted(Direction::Request, Factory::data_frame()))
        .unwrap();

    assert!(to_mqtt.try_recv().is_err());
}

#[test]
fn records_are_appended_to_datalog() -> Result<()> {
    common_setup();

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("logs").join("records.jsonl");
    let writer = DatalogWriter::new(path.to_str().unwrap())?;
    assert_eq!(writer.path(), path.to_str().unwrap());

    let coordinator = Coordinator::new(default_config(), Channels::new(), Some(writer.clone()));
    coordinator.process(&intercepted(Direction::Request, Factory::data_frame()));
    coordinator.process(&intercepted(Direction::Request, Factory::data_frame()));

    assert_eq!(writer.values_written(), 2);

    let content = std::fs::read_to_string(&path)?;
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2);
    let json: serde_json::Value = serde_json::from_str(lines[0])?;
    assert_eq!(json["timestamp"], "2024-03-15T10:30:00Z");

    assert_eq!(coordinator.shared_stats.lock().unwrap().datalog_writes, 2);

    Ok(())
}

#[tokio::test]
async fn start_consumes_proxy_frames_until_shutdown() -> Result<()> {
    common_setup();

    let channels = Channels::new();
    let coordinator = Coordinator::new(default_config(), channels.clone(), None);

    let coordinator_clone = coordinator.clone();
    let handle = tokio::spawn(async move { coordinator_clone.start().await });

    // let the loop subscribe before anything is sent
    tokio::task::yield_now().await;
    while channels.from_proxy.receiver_count() == 0 {
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    channels
        .from_proxy
        .send(growatt_bridge::proxy::ChannelData::Frame(intercepted(
            Direction::Request,
            Factory::data_frame(),
        )))?;
    coordinator.stop();

    handle.await??;

    assert_eq!(coordinator.shared_stats.lock().unwrap().records_decoded, 1);
    Ok(())
}
