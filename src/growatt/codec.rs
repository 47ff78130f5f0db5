use crate::growatt::frame::{checksum, CRC_LEN, HEADER_PREFIX_LEN, MIN_FRAME_LEN};

use bytes::{Bytes, BytesMut};
use log::{debug, warn};
use tokio_util::codec::Decoder;

/// Splits a TCP byte stream into raw frames using the header's length field.
///
/// A candidate is only handed out as a frame once its CRC checks out. When it
/// does not (a stray byte shifted the stream, or the frame is corrupt), the
/// codec looks for the next offset where a complete, CRC-valid frame starts
/// and hands everything before it on as one chunk, which
/// [`crate::growatt::Frame::decode`] then reports as an error. Frames are
/// never unmasked here.
#[derive(Debug, Default)]
pub struct FrameCodec {
    // from the last good frame; narrows the search while resynchronising
    protocol_id: Option<u16>,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Length of the frame whose header starts `buf`, if the header is there.
    fn candidate_len(buf: &[u8]) -> Option<usize> {
        if buf.len() < HEADER_PREFIX_LEN {
            return None;
        }
        let declared_length = u16::from_be_bytes([buf[4], buf[5]]) as usize;
        Some(HEADER_PREFIX_LEN + declared_length + CRC_LEN)
    }

    /// Whether `buf` starts with a complete frame whose CRC holds.
    fn is_valid(buf: &[u8]) -> bool {
        match Self::candidate_len(buf) {
            Some(len) if len >= MIN_FRAME_LEN && buf.len() >= len => {
                let crc = u16::from_be_bytes([buf[len - 2], buf[len - 1]]);
                checksum(&buf[..len - CRC_LEN]) == crc
            }
            _ => false,
        }
    }

    /// First offset at or after `from` where a valid frame of the expected
    /// protocol starts.
    fn next_valid(&self, buf: &[u8], from: usize) -> Option<usize> {
        (from..buf.len().saturating_sub(MIN_FRAME_LEN - 1)).find(|&offset| {
            let rest = &buf[offset..];
            let protocol_id = u16::from_be_bytes([rest[2], rest[3]]);
            self.protocol_id.map_or(true, |p| p == protocol_id) && Self::is_valid(rest)
        })
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let frame_len = match Self::candidate_len(src) {
            Some(len) => len,
            None => return Ok(None),
        };

        if Self::is_valid(src) {
            self.protocol_id = Some(u16::from_be_bytes([src[2], src[3]]));
            return Ok(Some(src.split_to(frame_len).freeze()));
        }

        if let Some(offset) = self.next_valid(src, 1) {
            warn!("skipping {} bytes to the next valid frame", offset);
            return Ok(Some(src.split_to(offset).freeze()));
        }

        if src.len() >= frame_len {
            // aligned but corrupt; pass it on so the failure is reported
            debug!("passing on {} bytes that fail the checksum", frame_len);
            return Ok(Some(src.split_to(frame_len).freeze()));
        }

        src.reserve(frame_len - src.len());
        Ok(None)
    }

    // whatever is left when the peer hangs up is passed on so it gets reported as truncated
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Ok(Some(src.split().freeze())),
        }
    }
}
