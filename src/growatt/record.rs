use crate::error::DecodeError;
use crate::growatt::layout::{self, Field, FieldKind, FromField, RECORD_LEN};
use crate::growatt::serial::Serial;

use chrono::{DateTime, NaiveDate, Utc};
use nom::number::complete::{be_u16, be_u32};
use nom::sequence::tuple;
use serde::Serialize;

// {{{ Measurement
/// One electrical channel, in raw device units.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Measurement {
    pub voltage: u16,
    pub current: u16,
    pub power: u32,
}

impl FromField<'_> for Measurement {
    fn accepts(kind: FieldKind) -> bool {
        kind == FieldKind::Measurement
    }

    fn from_field(bytes: &[u8]) -> Result<Self, DecodeError> {
        let (_, (voltage, current, power)) =
            tuple((be_u16::<_, nom::error::Error<&[u8]>>, be_u16, be_u32))(bytes)
                .map_err(|_| layout::truncated(bytes, 8))?;

        Ok(Self {
            voltage,
            current,
            power,
        })
    }
}
// }}}

// {{{ ReservedRanges
/// Copies of the byte ranges whose meaning is not known yet.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ReservedRanges(Vec<(Field, Vec<u8>)>);

impl ReservedRanges {
    fn capture(payload: &[u8]) -> Result<Self, DecodeError> {
        layout::reserved()
            .map(|field| Ok((*field, field.bytes(payload)?.to_vec())))
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.0
            .iter()
            .find(|(field, _)| field.name == name)
            .map(|(_, bytes)| bytes.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Field, &[u8])> {
        self.0.iter().map(|(field, bytes)| (field, bytes.as_slice()))
    }
}
// }}}

// {{{ TelemetryRecord
/// Decoded contents of a `Data` payload.
///
/// Units follow the device: `pv1`, `pv2` and `ac1` are left unscaled,
/// the `f64` fields have their fixed-point scale applied.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TelemetryRecord {
    pub serial: Serial,
    pub inverter_id: Serial,
    pub timestamp: DateTime<Utc>,
    pub status: u8,

    pub dc_input_power: u32,
    pub pv1: Measurement,
    pub pv2: Measurement,
    /// W
    pub dc_output_power: f64,
    /// Hz
    pub pv_frequency: f64,
    /// V
    pub grid_voltage: f64,

    pub ac_power: u32,
    pub ac_frequency: u16,
    pub ac1: Measurement,

    pub energy_today: u32,
    pub energy_total: u32,

    /// W
    pub battery_charge_power: f64,
    /// W
    pub battery_discharge_power: f64,
    /// V
    pub battery_voltage: f64,
    /// percent
    pub state_of_charge: f64,
    /// °C
    pub battery_temperature: f64,
    /// W
    pub ac_power_to_load: f64,

    #[serde(skip)]
    pub reserved: ReservedRanges,
    /// Anything following the fixed layout, kept verbatim.
    #[serde(skip)]
    pub extra: Vec<u8>,
}

impl TelemetryRecord {
    /// Decode an unmasked `Data` payload. Either every field is read or an
    /// error is returned.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        use layout::*;

        if payload.len() < RECORD_LEN {
            return Err(DecodeError::Truncated {
                needed: RECORD_LEN,
                available: payload.len(),
            });
        }

        Ok(Self {
            serial: SERIAL.read(payload)?,
            inverter_id: INVERTER_ID.read(payload)?,
            timestamp: Self::timestamp(payload)?,
            status: STATUS.read(payload)?,

            dc_input_power: DC_INPUT_POWER.read(payload)?,
            pv1: PV1.read(payload)?,
            pv2: PV2.read(payload)?,
            dc_output_power: DC_OUTPUT_POWER.read_scaled(payload)?,
            pv_frequency: PV_FREQUENCY.read_scaled(payload)?,
            grid_voltage: GRID_VOLTAGE.read_scaled(payload)?,

            ac_power: AC_POWER.read(payload)?,
            ac_frequency: AC_FREQUENCY.read(payload)?,
            ac1: AC1.read(payload)?,

            energy_today: ENERGY_TODAY.read(payload)?,
            energy_total: ENERGY_TOTAL.read(payload)?,

            battery_charge_power: BATTERY_CHARGE_POWER.read_scaled(payload)?,
            battery_discharge_power: BATTERY_DISCHARGE_POWER.read_scaled(payload)?,
            battery_voltage: BATTERY_VOLTAGE.read_scaled(payload)?,
            state_of_charge: STATE_OF_CHARGE.read_scaled(payload)?,
            battery_temperature: BATTERY_TEMPERATURE.read_scaled(payload)?,
            ac_power_to_load: AC_POWER_TO_LOAD.read_scaled(payload)?,

            reserved: ReservedRanges::capture(payload)?,
            extra: payload[RECORD_LEN..].to_vec(),
        })
    }

    /// State of charge as a 0-1 fraction.
    pub fn soc_fraction(&self) -> f64 {
        self.state_of_charge / 100.0
    }

    fn timestamp(payload: &[u8]) -> Result<DateTime<Utc>, DecodeError> {
        use layout::{DAY, HOUR, MINUTE, MONTH, SECOND, YEAR};

        let year = 2000 + u16::from(YEAR.read::<u8>(payload)?);
        let month = MONTH.read::<u8>(payload)?;
        let day = DAY.read::<u8>(payload)?;
        let hour = HOUR.read::<u8>(payload)?;
        let minute = MINUTE.read::<u8>(payload)?;
        let second = SECOND.read::<u8>(payload)?;

        NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day))
            .and_then(|date| {
                date.and_hms_opt(u32::from(hour), u32::from(minute), u32::from(second))
            })
            .map(|t| t.and_utc())
            .ok_or(DecodeError::InvalidTimestamp {
                year,
                month,
                day,
                hour,
                minute,
                second,
            })
    }
}
// }}}
