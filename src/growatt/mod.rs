//! Decoding of the datalogger <-> cloud protocol.
//!
//! Two layers: [`Frame`] validates the CRC and removes the XOR mask, then
//! [`TelemetryRecord`] reads the fixed layout out of `Data` payloads.

pub mod codec;
pub mod frame;
pub mod layout;
pub mod record;
pub mod serial;

pub use frame::{Frame, FrameFactory, FrameHeader, MessageKind};
pub use record::{Measurement, ReservedRanges, TelemetryRecord};
pub use serial::Serial;
