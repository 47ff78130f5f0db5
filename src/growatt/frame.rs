use crate::prelude::*;
use crate::growatt::record::TelemetryRecord;

use nom_derive::{Nom, Parse};
use num_enum::{FromPrimitive, IntoPrimitive};
use serde::Serialize;

/// id, protocol_id and declared_length; declared_length counts everything after these.
pub const HEADER_PREFIX_LEN: usize = 6;
/// prefix plus unit_id and kind
pub const HEADER_LEN: usize = 8;
pub const CRC_LEN: usize = 2;
/// A frame with an empty payload.
pub const MIN_FRAME_LEN: usize = HEADER_LEN + CRC_LEN;

/// XOR key cycled over the payload region.
pub const MASK: [u8; 7] = *b"Growatt";

// {{{ MessageKind
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum MessageKind {
    Announce = 0x03,
    Data = 0x04,
    Ping = 0x16,
    Config = 0x18,
    Query = 0x19,
    Reboot = 0x20,
    BufferedData = 0x50,
    #[num_enum(catch_all)]
    Unknown(u8),
}

impl MessageKind {
    /// Kinds whose payload is a telemetry record. BufferedData is a delayed
    /// upload of the same layout.
    pub fn carries_telemetry(&self) -> bool {
        matches!(self, MessageKind::Data | MessageKind::BufferedData)
    }
}
// }}}

// {{{ FrameHeader
#[derive(Clone, Copy, Debug, Eq, PartialEq, Nom)]
#[nom(BigEndian)]
pub struct FrameHeader {
    pub id: u16,
    pub protocol_id: u16,
    pub declared_length: u16,
    pub unit_id: u8,
    pub kind: u8,
}

impl FrameHeader {
    /// Total bytes on the wire for this frame, trailing CRC included.
    pub fn frame_len(&self) -> usize {
        HEADER_PREFIX_LEN + self.declared_length as usize + CRC_LEN
    }
}
// }}}

// {{{ Frame
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Frame {
    pub id: u16,
    pub protocol_id: u16,
    pub declared_length: u16,
    pub unit_id: u8,
    pub kind: MessageKind,
    #[serde(skip)]
    pub payload: Vec<u8>,
    pub crc: u16,
}

impl Frame {
    /// Validate and unwrap one complete frame.
    ///
    /// The checksum is verified over the still-masked bytes; the payload is
    /// only unmasked once that succeeds. `input` is never modified, the
    /// returned payload is a fresh copy. The CRC is always the last two bytes
    /// of `input`, so anything appended after the frame fails the check.
    pub fn decode(input: &[u8]) -> Result<Self, DecodeError> {
        let available = input.len();
        if available < MIN_FRAME_LEN {
            return Err(DecodeError::Truncated {
                needed: MIN_FRAME_LEN,
                available,
            });
        }

        let parsed: nom::IResult<&[u8], FrameHeader> = FrameHeader::parse(input);
        let (_, header) = parsed.map_err(|_| DecodeError::Truncated {
            needed: HEADER_LEN,
            available,
        })?;

        if (header.declared_length as usize) < HEADER_LEN - HEADER_PREFIX_LEN {
            return Err(DecodeError::InvalidLength {
                declared_length: header.declared_length,
            });
        }

        let frame_len = header.frame_len();
        if available < frame_len {
            return Err(DecodeError::Truncated {
                needed: frame_len,
                available,
            });
        }

        let (body, crc_bytes) = input.split_at(available - CRC_LEN);
        let crc = u16::from_be_bytes([crc_bytes[0], crc_bytes[1]]);
        let computed = checksum(body);
        if computed != crc {
            return Err(DecodeError::ChecksumMismatch {
                expected: crc,
                computed,
            });
        }

        // the checksum held over more bytes than the header accounts for
        if available != frame_len {
            return Err(DecodeError::InvalidLength {
                declared_length: header.declared_length,
            });
        }

        Ok(Self {
            id: header.id,
            protocol_id: header.protocol_id,
            declared_length: header.declared_length,
            unit_id: header.unit_id,
            kind: MessageKind::from(header.kind),
            payload: apply_mask(&body[HEADER_LEN..]),
            crc,
        })
    }

    /// Decode the payload as a telemetry record, if this kind carries one.
    pub fn record(&self) -> Result<Option<TelemetryRecord>, DecodeError> {
        if !self.kind.carries_telemetry() {
            return Ok(None);
        }

        TelemetryRecord::decode(&self.payload).map(Some)
    }
}
// }}}

// {{{ FrameFactory
pub struct FrameFactory;
impl FrameFactory {
    /// Assemble a wire frame: header, masked payload, big-endian CRC.
    pub fn build(
        id: u16,
        protocol_id: u16,
        unit_id: u8,
        kind: MessageKind,
        payload: &[u8],
    ) -> Result<Vec<u8>> {
        let declared_length = u16::try_from(payload.len() + HEADER_LEN - HEADER_PREFIX_LEN)
            .map_err(|_| anyhow!("payload of {} bytes does not fit in a frame", payload.len()))?;

        let mut r = Vec::with_capacity(MIN_FRAME_LEN + payload.len());
        r.extend_from_slice(&id.to_be_bytes());
        r.extend_from_slice(&protocol_id.to_be_bytes());
        r.extend_from_slice(&declared_length.to_be_bytes());
        r.push(unit_id);
        r.push(kind.into());
        r.extend_from_slice(&apply_mask(payload));

        let crc = checksum(&r);
        r.extend_from_slice(&crc.to_be_bytes());

        Ok(r)
    }
}
// }}}

/// CRC-16/MODBUS.
pub fn checksum(data: &[u8]) -> u16 {
    crc16::State::<crc16::MODBUS>::calculate(data)
}

/// XOR `data` with [`MASK`], cycling by position. Applying it twice gives the
/// input back.
pub fn apply_mask(data: &[u8]) -> Vec<u8> {
    data.iter()
        .zip(MASK.iter().cycle())
        .map(|(b, m)| b ^ m)
        .collect()
}
