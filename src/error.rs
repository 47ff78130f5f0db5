use thiserror::Error;

/// Reasons a frame or telemetry record could not be decoded.
///
/// None of these are transient; retrying the same bytes gives the same
/// answer. Callers log and drop the offending message.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// `expected` is the value carried in the frame, `computed` is what the
    /// bytes actually hash to.
    #[error("checksum mismatch: frame carries {expected:#06x}, computed {computed:#06x}")]
    ChecksumMismatch { expected: u16, computed: u16 },

    #[error("truncated: needed {needed} bytes, only {available} available")]
    Truncated { needed: usize, available: usize },

    #[error(
        "invalid timestamp {year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}"
    )]
    InvalidTimestamp {
        year: u16,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
    },

    /// Below 2 (it always counts unit id and kind), or disagreeing with the
    /// number of bytes the checksum was found to cover.
    #[error("declared length {declared_length} does not match the frame")]
    InvalidLength { declared_length: u16 },
}

impl DecodeError {
    /// Short label used for statistics and log grouping.
    pub fn class(&self) -> &'static str {
        match self {
            DecodeError::ChecksumMismatch { .. } => "checksum",
            DecodeError::Truncated { .. } => "truncated",
            DecodeError::InvalidTimestamp { .. } => "timestamp",
            DecodeError::InvalidLength { .. } => "length",
        }
    }
}
