mod common;
use common::*;

use growatt_bridge::growatt::layout::{self, RECORD_LEN};
use growatt_bridge::growatt::Measurement;
use growatt_bridge::prelude::*;

fn decode(wire: &[u8]) -> Result<Option<TelemetryRecord>, DecodeError> {
    Frame::decode(wire)?.record()
}

#[test]
fn data_frame_decodes_to_record() {
    common_setup();

    let record = decode(&Factory::data_frame()).unwrap().unwrap();

    assert_eq!(record.serial.trimmed(), "SER0000001");
    assert_eq!(record.inverter_id.trimmed(), "INV0000042");
    assert_eq!(record.timestamp.to_rfc3339(), "2024-03-15T10:30:00+00:00");
    assert_eq!(record.status, 1);
    assert_eq!(
        record.pv1,
        Measurement {
            voltage: 3000,
            current: 42,
            power: 1234,
        }
    );
    assert_eq!(record.grid_voltage, 230.1);
    assert_eq!(record.ac_power, 5000);
    assert_eq!(record.ac_frequency, 5000);
    assert_eq!(record.energy_today, 123);
    assert_eq!(record.energy_total, 45678);
    assert_eq!(record.battery_voltage, 51.2);
    assert_eq!(record.state_of_charge, 65.0);
    assert_eq!(record.soc_fraction(), 0.65);
    assert_eq!(record.ac_power_to_load, 1234.5);
    assert_eq!(record.battery_temperature, 25.3);
}

#[test]
fn buffered_data_uses_the_same_layout() {
    let wire = Factory::frame(MessageKind::BufferedData, &Factory::payload());
    let record = decode(&wire).unwrap().unwrap();

    assert_eq!(record.serial.trimmed(), "SER0000001");
    assert_eq!(record.state_of_charge, 65.0);
}

#[test]
fn ping_is_never_decoded_as_record() {
    // a ping carrying record-sized garbage is still just a ping
    let wire = Factory::frame(MessageKind::Ping, &Factory::payload());
    assert_eq!(decode(&wire), Ok(None));
}

#[test]
fn short_data_payload_is_truncated() {
    let payload = Factory::payload();
    let wire = Factory::frame(MessageKind::Data, &payload[..RECORD_LEN - 1]);

    assert_eq!(
        decode(&wire),
        Err(DecodeError::Truncated {
            needed: RECORD_LEN,
            available: RECORD_LEN - 1,
        })
    );
}

#[test]
fn bad_timestamp_fails_the_whole_record() {
    let mut payload = Factory::payload();
    Factory::put(&mut payload, layout::MONTH, &[0]);
    let wire = Factory::frame(MessageKind::Data, &payload);

    assert!(matches!(
        decode(&wire),
        Err(DecodeError::InvalidTimestamp { month: 0, .. })
    ));
}

#[test]
fn bytes_past_the_record_are_kept() {
    let mut payload = Factory::payload();
    payload.extend_from_slice(&[0xde, 0xad]);
    let wire = Factory::frame(MessageKind::Data, &payload);

    let record = decode(&wire).unwrap().unwrap();
    assert_eq!(record.extra, vec![0xde, 0xad]);
    assert_eq!(record.reserved.iter().count(), layout::reserved().count());
}

#[test]
fn record_serializes_without_diagnostics() {
    let record = decode(&Factory::data_frame()).unwrap().unwrap();
    let json: serde_json::Value = serde_json::to_value(&record).unwrap();

    assert_eq!(json["serial"], "SER0000001");
    assert_eq!(json["state_of_charge"], 65.0);
    assert!(json.get("reserved").is_none());
    assert!(json.get("extra").is_none());
}
