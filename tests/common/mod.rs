#![allow(dead_code)]

use growatt_bridge::growatt::layout::{self, Field};
use growatt_bridge::prelude::*;
use growatt_bridge::growatt::FrameFactory;

pub fn common_setup() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn config(yaml: &str) -> ConfigWrapper {
    ConfigWrapper::from_config(Config::from_yaml(yaml).unwrap())
}

pub fn default_config() -> ConfigWrapper {
    config("proxy:\n  listen: 127.0.0.1:0\n  upstream: 127.0.0.1:5279\n")
}

/// Builds unmasked record payloads and wire frames for tests.
pub struct Factory;

impl Factory {
    pub fn put(payload: &mut [u8], field: Field, bytes: &[u8]) {
        assert_eq!(bytes.len(), field.width, "{}", field.name);
        payload[field.offset..field.end()].copy_from_slice(bytes);
    }

    /// A full record for datalogger SER0000001 at 2024-03-15 10:30:00 with
    /// 65% battery and 1234.5 W going to the load.
    pub fn payload() -> Vec<u8> {
        use layout::*;

        let mut p = vec![0u8; RECORD_LEN];
        Self::put(&mut p, SERIAL, b"SER0000001");
        Self::put(&mut p, INVERTER_ID, b"INV0000042");
        Self::put(&mut p, YEAR, &[24]);
        Self::put(&mut p, MONTH, &[3]);
        Self::put(&mut p, DAY, &[15]);
        Self::put(&mut p, HOUR, &[10]);
        Self::put(&mut p, MINUTE, &[30]);
        Self::put(&mut p, SECOND, &[0]);
        Self::put(&mut p, STATUS, &[1]);
        Self::put(&mut p, PV1, &[0x0b, 0xb8, 0x00, 0x2a, 0x00, 0x00, 0x04, 0xd2]);
        Self::put(&mut p, GRID_VOLTAGE, &2301u16.to_be_bytes());
        Self::put(&mut p, AC_POWER, &5000u32.to_be_bytes());
        Self::put(&mut p, AC_FREQUENCY, &5000u16.to_be_bytes());
        Self::put(&mut p, ENERGY_TODAY, &123u32.to_be_bytes());
        Self::put(&mut p, ENERGY_TOTAL, &45678u32.to_be_bytes());
        Self::put(&mut p, BATTERY_VOLTAGE, &512u16.to_be_bytes());
        Self::put(&mut p, STATE_OF_CHARGE, &6500u16.to_be_bytes());
        Self::put(&mut p, AC_POWER_TO_LOAD, &12345u32.to_be_bytes());
        Self::put(&mut p, BATTERY_TEMPERATURE, &253u16.to_be_bytes());
        p
    }

    pub fn frame(kind: MessageKind, payload: &[u8]) -> Vec<u8> {
        FrameFactory::build(1, 6, 1, kind, payload).unwrap()
    }

    pub fn data_frame() -> Vec<u8> {
        Self::frame(MessageKind::Data, &Self::payload())
    }

    pub fn ping_frame() -> Vec<u8> {
        Self::frame(MessageKind::Ping, b"SER0000001")
    }
}
