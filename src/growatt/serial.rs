use crate::error::DecodeError;
use crate::growatt::layout::{self, FieldKind, FromField};

use serde::{Serialize, Serializer};

/// Fixed 10-byte ASCII identifier as it appears on the wire.
///
/// Padding is kept exactly as received; whether it is NULs or spaces varies
/// between devices. Use [`Serial::trimmed`] when presenting it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Serial([u8; 10]);

impl Serial {
    pub fn data(&self) -> [u8; 10] {
        self.0
    }

    /// Lossy text form without trailing NULs or spaces.
    pub fn trimmed(&self) -> String {
        self.to_string()
            .trim_end_matches(['\0', ' '])
            .to_string()
    }
}

impl From<[u8; 10]> for Serial {
    fn from(bytes: [u8; 10]) -> Self {
        Self(bytes)
    }
}

impl From<&str> for Serial {
    fn from(s: &str) -> Self {
        let mut result = [0u8; 10];
        let bytes = s.as_bytes();
        let len = std::cmp::min(bytes.len(), 10);
        result[..len].copy_from_slice(&bytes[..len]);
        Self(result)
    }
}

impl FromField<'_> for Serial {
    fn accepts(kind: FieldKind) -> bool {
        kind == FieldKind::Text
    }

    fn from_field(bytes: &[u8]) -> Result<Self, DecodeError> {
        bytes
            .try_into()
            .map(Self)
            .map_err(|_| layout::truncated(bytes, 10))
    }
}

impl std::fmt::Display for Serial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl std::fmt::Debug for Serial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(&self.0))
    }
}

impl Serialize for Serial {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
