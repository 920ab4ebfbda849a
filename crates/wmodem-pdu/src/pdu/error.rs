//! PDU codec error type.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Categorised codec error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PduError {
    pub kind: PduErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PduErrorKind {
    /// Input is not a valid hex string.
    InvalidHex,
    /// The buffer ends before a mandatory field.
    ShortPdu,
    /// Message type or field value the codec does not handle.
    Unsupported,
    /// User data does not fit in a single PDU.
    MessageTooLong,
    /// Caller supplied an unusable argument (empty number, etc).
    InvalidInput,
}

pub type PduResult<T> = Result<T, PduError>;

impl PduError {
    pub fn new(kind: PduErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
        }
    }

    /// `short pdu: <field>`
    pub fn short(field: &str) -> Self {
        Self::new(PduErrorKind::ShortPdu, format!("short pdu: {}", field))
    }

    pub fn invalid_hex(msg: impl Into<String>) -> Self {
        Self::new(PduErrorKind::InvalidHex, msg)
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::new(PduErrorKind::Unsupported, msg)
    }

    pub fn too_long(msg: impl Into<String>) -> Self {
        Self::new(PduErrorKind::MessageTooLong, msg)
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::new(PduErrorKind::InvalidInput, msg)
    }
}

impl fmt::Display for PduError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[PDU {:?}] {}", self.kind, self.message)
    }
}

impl std::error::Error for PduError {}

impl From<hex::FromHexError> for PduError {
    fn from(e: hex::FromHexError) -> Self {
        Self::invalid_hex(format!("invalid pdu hex: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_message_names_field() {
        let e = PduError::short("sender address");
        assert_eq!(e.kind, PduErrorKind::ShortPdu);
        assert_eq!(e.message, "short pdu: sender address");
    }

    #[test]
    fn test_from_hex_error() {
        let e: PduError = hex::decode("0G").unwrap_err().into();
        assert_eq!(e.kind, PduErrorKind::InvalidHex);
    }
}
