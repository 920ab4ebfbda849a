//! Modem-layer error type.

use serde::{Deserialize, Serialize};
use std::fmt;
use wmodem_pdu::pdu::{PduError, PduErrorKind};

/// Categorised modem error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModemError {
    pub kind: ModemErrorKind,
    pub message: String,
    /// Device name the error relates to, if any.
    pub port: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModemErrorKind {
    /// No bytes arrived within the response window. Retryable.
    Timeout,
    /// Reading or writing the stream failed. Fatal to the device.
    Io,
    /// The modem answered, but not with what the command expects.
    Protocol,
    /// A stored PDU could not be decoded.
    PduDecode,
    /// No device with that name.
    NotFound,
    /// The device exists but its stream is closed.
    NotConnected,
    /// Caller input rejected before anything was sent.
    Validation,
    /// Opening or initialising the port failed.
    Handshake,
}

pub type ModemResult<T> = Result<T, ModemError>;

impl ModemError {
    pub fn new(kind: ModemErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
            port: None,
        }
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    // ── Convenience constructors ─────────────────────────────────

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(ModemErrorKind::Timeout, msg)
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(ModemErrorKind::Io, msg)
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::new(ModemErrorKind::Protocol, msg)
    }

    pub fn pdu_decode(msg: impl Into<String>) -> Self {
        Self::new(ModemErrorKind::PduDecode, msg)
    }

    pub fn not_found(name: &str) -> Self {
        Self::new(ModemErrorKind::NotFound, format!("device '{}' not found", name))
            .with_port(name)
    }

    pub fn not_connected(name: &str) -> Self {
        Self::new(
            ModemErrorKind::NotConnected,
            format!("device '{}' is not connected", name),
        )
        .with_port(name)
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::new(ModemErrorKind::Validation, msg)
    }

    pub fn handshake(msg: impl Into<String>) -> Self {
        Self::new(ModemErrorKind::Handshake, msg)
    }

    // ── Classification ───────────────────────────────────────────

    /// Short machine-readable code.
    pub fn code(&self) -> &'static str {
        match self.kind {
            ModemErrorKind::Timeout => "timeout",
            ModemErrorKind::Io => "io",
            ModemErrorKind::Protocol => "protocol",
            ModemErrorKind::PduDecode => "pdu_decode",
            ModemErrorKind::NotFound => "not_found",
            ModemErrorKind::NotConnected => "not_connected",
            ModemErrorKind::Validation => "validation",
            ModemErrorKind::Handshake => "handshake",
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == ModemErrorKind::Timeout
    }

    /// The device's stream can no longer be used.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, ModemErrorKind::Io | ModemErrorKind::NotConnected)
    }

    /// Caused by the request rather than the device (4xx-class).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind,
            ModemErrorKind::NotFound | ModemErrorKind::Validation
        )
    }
}

impl fmt::Display for ModemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.port {
            Some(port) => write!(f, "[Modem {:?}] {}: {}", self.kind, port, self.message),
            None => write!(f, "[Modem {:?}] {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for ModemError {}

impl From<std::io::Error> for ModemError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::TimedOut {
            Self::timeout(format!("I/O timeout: {}", e))
        } else {
            Self::io(e.to_string())
        }
    }
}

impl From<PduError> for ModemError {
    fn from(e: PduError) -> Self {
        match e.kind {
            PduErrorKind::InvalidInput | PduErrorKind::MessageTooLong => {
                Self::validation(e.message)
            }
            _ => Self::pdu_decode(e.message),
        }
    }
}

impl From<serialport::Error> for ModemError {
    fn from(e: serialport::Error) -> Self {
        match e.kind() {
            serialport::ErrorKind::NoDevice => Self::handshake(format!("no such port: {}", e)),
            serialport::ErrorKind::InvalidInput => Self::validation(e.to_string()),
            _ => Self::io(e.to_string()),
        }
    }
}

impl From<ModemError> for String {
    fn from(e: ModemError) -> String {
        e.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_classes() {
        let t = ModemError::timeout("no answer");
        assert_eq!(t.code(), "timeout");
        assert!(t.is_retryable());
        assert!(!t.is_fatal());

        let v = ModemError::validation("empty number");
        assert!(v.is_client_error());
        assert!(!v.is_retryable());

        assert!(ModemError::io("broken pipe").is_fatal());
        assert!(ModemError::not_found("ttyUSB9").is_client_error());
    }

    #[test]
    fn test_display_includes_port() {
        let e = ModemError::protocol("unexpected reply").with_port("ttyUSB0");
        assert_eq!(e.to_string(), "[Modem Protocol] ttyUSB0: unexpected reply");
    }

    #[test]
    fn test_from_io_timeout() {
        let e: ModemError = std::io::Error::new(std::io::ErrorKind::TimedOut, "t").into();
        assert_eq!(e.kind, ModemErrorKind::Timeout);
        let e: ModemError = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "b").into();
        assert_eq!(e.kind, ModemErrorKind::Io);
    }

    #[test]
    fn test_from_pdu_error() {
        let e: ModemError = PduError::short("timestamp").into();
        assert_eq!(e.kind, ModemErrorKind::PduDecode);
        let e: ModemError = PduError::invalid_input("destination number is empty").into();
        assert_eq!(e.kind, ModemErrorKind::Validation);
    }

    #[test]
    fn test_serializes_kind_camel_case() {
        let json = serde_json::to_value(ModemError::not_connected("ttyACM0")).unwrap();
        assert_eq!(json["kind"], "notConnected");
        assert_eq!(json["port"], "ttyACM0");
    }
}
