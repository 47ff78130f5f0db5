//! Gauges derived from a decoded record, keyed by datalogger serial.
//!
//! The PV measurement triples arrive unscaled in [`TelemetryRecord`]; the
//! exported PV power and voltage gauges divide them by ten here, as the
//! dashboards built on these names expect. Current is not exported.

use crate::growatt::layout::Scale;
use crate::growatt::TelemetryRecord;

use serde::Serialize;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
pub enum Metric {
    Voltage,
    Power,
    LastSeen,
    BatteryStateOfCharge,
}

impl Metric {
    pub fn name(&self) -> &'static str {
        match self {
            Metric::Voltage => "inverter_voltage_volts",
            Metric::Power => "inverter_power_watts",
            Metric::LastSeen => "inverter_last_seen_unix_timestamp",
            Metric::BatteryStateOfCharge => "inverter_battery_state_of_charge",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Gauge {
    pub metric: Metric,
    pub serial: String,
    /// the `type` label, for metrics that have one
    pub circuit: Option<&'static str>,
    pub value: f64,
}

impl Gauge {
    fn new(metric: Metric, serial: &str, circuit: Option<&'static str>, value: f64) -> Self {
        Self {
            metric,
            serial: serial.to_owned(),
            circuit,
            value,
        }
    }

    /// `<serial>/<metric>[/<type>]`
    pub fn topic(&self) -> String {
        match self.circuit {
            Some(circuit) => format!("{}/{}/{}", self.serial, self.metric.name(), circuit),
            None => format!("{}/{}", self.serial, self.metric.name()),
        }
    }
}

pub fn gauges(record: &TelemetryRecord) -> Vec<Gauge> {
    use Metric::*;

    // NULs are not allowed in MQTT topics
    let serial = record.serial.trimmed();
    let tenths = |raw: u32| Scale::Tenths.apply(raw);
    let last_seen = record.timestamp.timestamp_millis() as f64 / 1000.0;

    vec![
        Gauge::new(LastSeen, &serial, None, last_seen),
        Gauge::new(Power, &serial, Some("battery-charge"), record.battery_charge_power),
        Gauge::new(Power, &serial, Some("battery-discharge"), record.battery_discharge_power),
        Gauge::new(Power, &serial, Some("to-user"), record.ac_power_to_load),
        Gauge::new(Power, &serial, Some("pv1"), tenths(record.pv1.power)),
        Gauge::new(Power, &serial, Some("pv2"), tenths(record.pv2.power)),
        Gauge::new(Voltage, &serial, Some("battery"), record.battery_voltage),
        Gauge::new(Voltage, &serial, Some("grid"), record.grid_voltage),
        Gauge::new(Voltage, &serial, Some("pv1"), tenths(record.pv1.voltage.into())),
        Gauge::new(Voltage, &serial, Some("pv2"), tenths(record.pv2.voltage.into())),
        Gauge::new(BatteryStateOfCharge, &serial, None, record.state_of_charge),
    ]
}
