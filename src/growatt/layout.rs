//! Byte layout of the telemetry record carried by `Data` frames.
//!
//! Every field, named or reserved, is listed here with its offset and width.
//! The record decoder reads through these constants only, so this table is
//! the single place to change when a new firmware shifts things around.
//! Reserved ranges have no known meaning yet but are kept so the table
//! covers all [`RECORD_LEN`] bytes.

use crate::error::DecodeError;

use nom::number::complete::{be_u16, be_u32};

pub const RECORD_LEN: usize = 409;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldKind {
    /// fixed-width ASCII, padding kept
    Text,
    U8,
    U16,
    U32,
    /// voltage u16, current u16, power u32
    Measurement,
    Reserved,
}

/// Fixed-point scaling applied to a raw unsigned value.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Scale {
    Unit,
    Tenths,
    Hundredths,
}

impl Scale {
    pub fn apply(&self, raw: u32) -> f64 {
        let raw = f64::from(raw);
        match self {
            Scale::Unit => raw,
            Scale::Tenths => raw / 10.0,
            Scale::Hundredths => raw / 100.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Field {
    pub name: &'static str,
    pub offset: usize,
    pub width: usize,
    pub kind: FieldKind,
    pub scale: Scale,
}

impl Field {
    const fn new(name: &'static str, offset: usize, width: usize, kind: FieldKind) -> Self {
        Self {
            name,
            offset,
            width,
            kind,
            scale: Scale::Unit,
        }
    }

    const fn scaled(self, scale: Scale) -> Self {
        Self { scale, ..self }
    }

    pub fn end(&self) -> usize {
        self.offset + self.width
    }

    /// The raw bytes of this field, or `Truncated` if `payload` ends first.
    pub fn bytes<'a>(&self, payload: &'a [u8]) -> Result<&'a [u8], DecodeError> {
        payload
            .get(self.offset..self.end())
            .ok_or(DecodeError::Truncated {
                needed: self.end(),
                available: payload.len(),
            })
    }

    pub fn read<'a, T: FromField<'a>>(&self, payload: &'a [u8]) -> Result<T, DecodeError> {
        debug_assert!(
            T::accepts(self.kind),
            "{} is {:?}, cannot be read as {}",
            self.name,
            self.kind,
            std::any::type_name::<T>()
        );
        T::from_field(self.bytes(payload)?)
    }

    /// Read an unsigned integer field and apply its scale.
    pub fn read_scaled(&self, payload: &[u8]) -> Result<f64, DecodeError> {
        let raw = match self.kind {
            FieldKind::U8 => u32::from(self.read::<u8>(payload)?),
            FieldKind::U16 => u32::from(self.read::<u16>(payload)?),
            _ => self.read::<u32>(payload)?,
        };
        Ok(self.scale.apply(raw))
    }
}

/// A value that can be built from exactly one field's bytes.
pub trait FromField<'a>: Sized {
    fn accepts(kind: FieldKind) -> bool;
    fn from_field(bytes: &'a [u8]) -> Result<Self, DecodeError>;
}

pub(crate) fn truncated(bytes: &[u8], needed: usize) -> DecodeError {
    DecodeError::Truncated {
        needed,
        available: bytes.len(),
    }
}

impl<'a> FromField<'a> for &'a [u8] {
    fn accepts(_: FieldKind) -> bool {
        true
    }

    fn from_field(bytes: &'a [u8]) -> Result<Self, DecodeError> {
        Ok(bytes)
    }
}

impl FromField<'_> for u8 {
    fn accepts(kind: FieldKind) -> bool {
        kind == FieldKind::U8
    }

    fn from_field(bytes: &[u8]) -> Result<Self, DecodeError> {
        bytes.first().copied().ok_or_else(|| truncated(bytes, 1))
    }
}

impl FromField<'_> for u16 {
    fn accepts(kind: FieldKind) -> bool {
        kind == FieldKind::U16
    }

    fn from_field(bytes: &[u8]) -> Result<Self, DecodeError> {
        be_u16::<_, nom::error::Error<&[u8]>>(bytes)
            .map(|(_, v)| v)
            .map_err(|_| truncated(bytes, 2))
    }
}

impl FromField<'_> for u32 {
    fn accepts(kind: FieldKind) -> bool {
        kind == FieldKind::U32
    }

    fn from_field(bytes: &[u8]) -> Result<Self, DecodeError> {
        be_u32::<_, nom::error::Error<&[u8]>>(bytes)
            .map(|(_, v)| v)
            .map_err(|_| truncated(bytes, 4))
    }
}

use FieldKind::*;
use Scale::*;

pub const SERIAL: Field = Field::new("serial", 0, 10, Text);
pub const RESERVED_1: Field = Field::new("reserved_1", 10, 20, Reserved);
pub const INVERTER_ID: Field = Field::new("inverter_id", 30, 10, Text);
pub const RESERVED_2: Field = Field::new("reserved_2", 40, 20, Reserved);

pub const YEAR: Field = Field::new("year", 60, 1, U8);
pub const MONTH: Field = Field::new("month", 61, 1, U8);
pub const DAY: Field = Field::new("day", 62, 1, U8);
pub const HOUR: Field = Field::new("hour", 63, 1, U8);
pub const MINUTE: Field = Field::new("minute", 64, 1, U8);
pub const SECOND: Field = Field::new("second", 65, 1, U8);
pub const RESERVED_3: Field = Field::new("reserved_3", 66, 6, Reserved);

pub const STATUS: Field = Field::new("status", 72, 1, U8);
pub const DC_INPUT_POWER: Field = Field::new("dc_input_power", 73, 4, U32);
pub const PV1: Field = Field::new("pv1", 77, 8, Measurement);
pub const PV2: Field = Field::new("pv2", 85, 8, Measurement);
pub const DC_OUTPUT_POWER: Field = Field::new("dc_output_power", 93, 4, U32).scaled(Tenths);
pub const PV_FREQUENCY: Field = Field::new("pv_frequency", 97, 2, U16).scaled(Hundredths);
pub const GRID_VOLTAGE: Field = Field::new("grid_voltage", 99, 2, U16).scaled(Tenths);
pub const RESERVED_4: Field = Field::new("reserved_4", 101, 16, Reserved);

pub const AC_POWER: Field = Field::new("ac_power", 117, 4, U32);
pub const AC_FREQUENCY: Field = Field::new("ac_frequency", 121, 2, U16);
pub const AC1: Field = Field::new("ac1", 123, 8, Measurement);
pub const RESERVED_5A: Field = Field::new("reserved_5a", 131, 14, Reserved);
// look like a frequency, a voltage and a state of charge, not confirmed
pub const RESERVED_5_FREQUENCY: Field = Field::new("reserved_5_frequency", 145, 2, Reserved);
pub const RESERVED_5_VOLTAGE: Field = Field::new("reserved_5_voltage", 147, 2, Reserved);
pub const RESERVED_5_SOC: Field = Field::new("reserved_5_soc", 149, 2, Reserved);
pub const RESERVED_5B: Field = Field::new("reserved_5b", 151, 18, Reserved);

pub const ENERGY_TODAY: Field = Field::new("energy_today", 169, 4, U32);
pub const RESERVED_6: Field = Field::new("reserved_6", 173, 4, Reserved);
pub const ENERGY_TOTAL: Field = Field::new("energy_total", 177, 4, U32);
pub const RESERVED_7: Field = Field::new("reserved_7", 181, 162, Reserved);

pub const BATTERY_DISCHARGE_POWER: Field =
    Field::new("battery_discharge_power", 343, 4, U32).scaled(Tenths);
pub const BATTERY_CHARGE_POWER: Field =
    Field::new("battery_charge_power", 347, 4, U32).scaled(Tenths);
pub const BATTERY_VOLTAGE: Field = Field::new("battery_voltage", 351, 2, U16).scaled(Tenths);
pub const STATE_OF_CHARGE: Field = Field::new("state_of_charge", 353, 2, U16).scaled(Hundredths);
pub const AC_POWER_TO_LOAD: Field = Field::new("ac_power_to_load", 355, 4, U32).scaled(Tenths);
pub const RESERVED_8: Field = Field::new("reserved_8", 359, 48, Reserved);
pub const BATTERY_TEMPERATURE: Field =
    Field::new("battery_temperature", 407, 2, U16).scaled(Tenths);

/// All fields in wire order.
pub const LAYOUT: &[Field] = &[
    SERIAL,
    RESERVED_1,
    INVERTER_ID,
    RESERVED_2,
    YEAR,
    MONTH,
    DAY,
    HOUR,
    MINUTE,
    SECOND,
    RESERVED_3,
    STATUS,
    DC_INPUT_POWER,
    PV1,
    PV2,
    DC_OUTPUT_POWER,
    PV_FREQUENCY,
    GRID_VOLTAGE,
    RESERVED_4,
    AC_POWER,
    AC_FREQUENCY,
    AC1,
    RESERVED_5A,
    RESERVED_5_FREQUENCY,
    RESERVED_5_VOLTAGE,
    RESERVED_5_SOC,
    RESERVED_5B,
    ENERGY_TODAY,
    RESERVED_6,
    ENERGY_TOTAL,
    RESERVED_7,
    BATTERY_DISCHARGE_POWER,
    BATTERY_CHARGE_POWER,
    BATTERY_VOLTAGE,
    STATE_OF_CHARGE,
    AC_POWER_TO_LOAD,
    RESERVED_8,
    BATTERY_TEMPERATURE,
];

pub fn reserved() -> impl Iterator<Item = &'static Field> {
    LAYOUT.iter().filter(|f| f.kind == Reserved)
}
