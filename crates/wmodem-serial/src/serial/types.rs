//! Shared types for the serial modem crate.
//!
//! Covers endpoints, AT responses and URCs, typed device results, and
//! the payload handed to inbound-message sinks.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use wmodem_pdu::pdu::LogicalSms;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Endpoint
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Port path and line speed of a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerialEndpoint {
    pub path: String,
    pub baud_rate: u32,
}

impl SerialEndpoint {
    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            baud_rate,
        }
    }

    /// Registry key for this endpoint.
    pub fn name(&self) -> String {
        device_name(&self.path)
    }
}

/// Basename of a port path (`/dev/ttyUSB0` → `ttyUSB0`, `COM3` → `COM3`).
pub fn device_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
        .to_string()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  AT responses
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Final result of an AT exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResultCode {
    Ok,
    Error,
    CmeError(String),
    CmsError(String),
    /// `> ` prompt awaiting PDU input.
    Prompt,
    /// Response ended without a recognised final code.
    Missing,
}

impl ResultCode {
    /// Recognise a final result line.
    pub fn parse(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        match trimmed.to_uppercase().as_str() {
            "OK" => Some(Self::Ok),
            "ERROR" => Some(Self::Error),
            ">" => Some(Self::Prompt),
            _ => {
                if let Some(rest) = trimmed.strip_prefix("+CME ERROR:") {
                    Some(Self::CmeError(rest.trim().to_string()))
                } else if let Some(rest) = trimmed.strip_prefix("+CMS ERROR:") {
                    Some(Self::CmsError(rest.trim().to_string()))
                } else {
                    None
                }
            }
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error | Self::CmeError(_) | Self::CmsError(_))
    }

    pub fn is_prompt(&self) -> bool {
        matches!(self, Self::Prompt)
    }
}

/// Structured result of one command exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtResponse {
    pub command: String,
    pub raw: String,
    /// Information lines, without the command echo and the final code.
    pub lines: Vec<String>,
    pub result: ResultCode,
    pub elapsed_ms: u64,
}

impl AtResponse {
    /// One-line description for error messages.
    pub fn summary(&self) -> String {
        let body = self
            .raw
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join(" | ");
        format!("{} -> {}", self.command, if body.is_empty() { "<empty>" } else { body.as_str() })
    }
}

/// Unsolicited result code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Urc {
    /// `+CMTI`, `RING`, ...
    pub code: String,
    /// Comma-separated parameters with quotes stripped.
    pub params: Vec<String>,
    pub line: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Device results
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Registry listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSummary {
    pub name: String,
    pub path: String,
    pub connected: bool,
    pub phone_number: Option<String>,
}

/// Identification fields; each one is `None` when its query failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIdentity {
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub imei: Option<String>,
    pub imsi: Option<String>,
    pub phone_number: Option<String>,
    pub operator: Option<String>,
}

/// Decoded `+CSQ` reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalReport {
    pub rssi: u8,
    pub ber: u8,
    pub dbm: i32,
    /// 0 (none) to 5 (excellent).
    pub level: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteFailure {
    pub index: u32,
    pub reason: String,
}

/// Per-index outcome of a delete request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteReport {
    pub deleted: Vec<u32>,
    pub failed: Vec<DeleteFailure>,
}

impl DeleteReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Outcome of a successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReceipt {
    pub parts: usize,
    /// `+CMGS` message references, one per part when reported.
    pub references: Vec<u32>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Inbound messages
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A received message as handed to sinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundSms {
    /// Device name the message arrived on.
    pub device: String,
    /// Own number of the receiving SIM, `"unknown"` if it could not be read.
    pub receiver: String,
    pub message: LogicalSms,
    /// Service-centre timestamp, when it parses.
    pub sent_at: Option<NaiveDateTime>,
    pub detected_at: DateTime<Utc>,
}

impl InboundSms {
    pub fn new(device: impl Into<String>, receiver: impl Into<String>, message: LogicalSms) -> Self {
        Self {
            device: device.into(),
            receiver: receiver.into(),
            sent_at: message.timestamp_parsed(),
            message,
            detected_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wmodem_pdu::pdu::SmsStatus;

    #[test]
    fn test_device_name() {
        assert_eq!(device_name("/dev/ttyUSB0"), "ttyUSB0");
        assert_eq!(device_name("COM3"), "COM3");
        assert_eq!(SerialEndpoint::new("/dev/ttyACM1", 115200).name(), "ttyACM1");
    }

    #[test]
    fn test_result_code_parse() {
        assert_eq!(ResultCode::parse("OK"), Some(ResultCode::Ok));
        assert_eq!(ResultCode::parse(" error "), Some(ResultCode::Error));
        assert_eq!(ResultCode::parse("> "), Some(ResultCode::Prompt));
        assert_eq!(
            ResultCode::parse("+CMS ERROR: 321"),
            Some(ResultCode::CmsError("321".into()))
        );
        assert!(ResultCode::parse("+CME ERROR: 10").unwrap().is_error());
        assert_eq!(ResultCode::parse("+CSQ: 15,0"), None);
    }

    #[test]
    fn test_response_summary() {
        let resp = AtResponse {
            command: "AT+CMGD=9".into(),
            raw: "\r\n+CMS ERROR: 321\r\n".into(),
            lines: vec![],
            result: ResultCode::CmsError("321".into()),
            elapsed_ms: 3,
        };
        assert_eq!(resp.summary(), "AT+CMGD=9 -> +CMS ERROR: 321");
    }

    #[test]
    fn test_inbound_sms_parses_timestamp() {
        let msg = LogicalSms {
            indices: vec![1],
            status: SmsStatus::ReceivedUnread,
            sender: "+1555".into(),
            timestamp: Some("2023/12/18 10:00:00".into()),
            text: "hi".into(),
            reference: None,
            parts_expected: 1,
            parts_received: 1,
            error: None,
        };
        let inbound = InboundSms::new("ttyUSB0", "unknown", msg);
        assert_eq!(
            inbound.sent_at.map(|t| t.to_string()),
            Some("2023-12-18 10:00:00".to_string())
        );
    }
}
