//! Shared types for the PDU codec.
//!
//! Covers decoded PDUs, concatenation metadata, message storage status,
//! listing fragments and reassembled logical messages.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Format of the service-centre timestamp as rendered by the decoder.
pub const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Decoded PDU
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// TP-MTI of a decoded PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PduKind {
    /// SMS-DELIVER (network to handset).
    Deliver,
    /// SMS-SUBMIT (handset to network).
    Submit,
}

/// User-data alphabet selected by the DCS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataCoding {
    /// GSM 03.38 default alphabet, packed 7-bit.
    Gsm7,
    /// UCS2, big-endian 16-bit units.
    Ucs2,
}

/// Concatenation metadata from the user-data header.
///
/// A PDU without a concatenation IE reports `(0, 1, 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConcatInfo {
    pub reference: u16,
    pub total: u8,
    pub sequence: u8,
}

impl Default for ConcatInfo {
    fn default() -> Self {
        Self {
            reference: 0,
            total: 1,
            sequence: 1,
        }
    }
}

impl ConcatInfo {
    pub fn is_multipart(&self) -> bool {
        self.total > 1
    }
}

/// A single decoded PDU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedPdu {
    pub kind: PduKind,
    /// Originating address for a DELIVER, destination for a SUBMIT.
    pub address: String,
    /// Service-centre timestamp (`20YY/MM/DD HH:MM:SS`); DELIVER only.
    pub timestamp: Option<String>,
    pub coding: DataCoding,
    pub text: String,
    pub concat: ConcatInfo,
}

impl DecodedPdu {
    /// The timestamp as a calendar value, if present and well-formed.
    pub fn timestamp_parsed(&self) -> Option<NaiveDateTime> {
        self.timestamp.as_deref().and_then(parse_timestamp)
    }
}

/// Parse a timestamp string in the decoder's output format.
pub fn parse_timestamp(ts: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT).ok()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Storage status
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 27.005 message storage status (`<stat>` in PDU mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SmsStatus {
    ReceivedUnread,
    ReceivedRead,
    StoredUnsent,
    StoredSent,
    /// Listing filter only.
    All,
}

impl Default for SmsStatus {
    fn default() -> Self {
        Self::All
    }
}

impl SmsStatus {
    pub fn code(&self) -> u8 {
        match self {
            Self::ReceivedUnread => 0,
            Self::ReceivedRead => 1,
            Self::StoredUnsent => 2,
            Self::StoredSent => 3,
            Self::All => 4,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::ReceivedUnread),
            1 => Some(Self::ReceivedRead),
            2 => Some(Self::StoredUnsent),
            3 => Some(Self::StoredSent),
            4 => Some(Self::All),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::ReceivedUnread => "REC UNREAD",
            Self::ReceivedRead => "REC READ",
            Self::StoredUnsent => "STO UNSENT",
            Self::StoredSent => "STO SENT",
            Self::All => "ALL",
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Listing fragments & logical messages
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One stored PDU from a listing, ready for reassembly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsFragment {
    /// Storage index on the device.
    pub index: u32,
    pub status: SmsStatus,
    pub sender: String,
    pub timestamp: Option<String>,
    pub text: String,
    pub concat: ConcatInfo,
    /// Decoder diagnostic when the PDU could not be decoded. `text` then
    /// holds the raw PDU hex.
    pub error: Option<String>,
}

impl SmsFragment {
    pub fn from_pdu(index: u32, status: SmsStatus, pdu: DecodedPdu) -> Self {
        Self {
            index,
            status,
            sender: pdu.address,
            timestamp: pdu.timestamp,
            text: pdu.text,
            concat: pdu.concat,
            error: None,
        }
    }

    pub fn undecodable(
        index: u32,
        status: SmsStatus,
        raw_hex: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            index,
            status,
            sender: String::new(),
            timestamp: None,
            text: raw_hex.into(),
            concat: ConcatInfo::default(),
            error: Some(error.into()),
        }
    }
}

/// A user-visible message: a single PDU or all parts of a multi-part one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogicalSms {
    /// Storage indices of every part, in sequence order.
    pub indices: Vec<u32>,
    pub status: SmsStatus,
    pub sender: String,
    pub timestamp: Option<String>,
    pub text: String,
    /// Concatenation reference, for multi-part messages.
    pub reference: Option<u16>,
    pub parts_expected: u8,
    pub parts_received: usize,
    pub error: Option<String>,
}

impl LogicalSms {
    /// Storage index of the first-sequence part; used for ordering.
    pub fn first_index(&self) -> u32 {
        self.indices.first().copied().unwrap_or(0)
    }

    pub fn contains_index(&self, index: u32) -> bool {
        self.indices.contains(&index)
    }

    pub fn is_complete(&self) -> bool {
        self.parts_received >= self.parts_expected as usize
    }

    pub fn timestamp_parsed(&self) -> Option<NaiveDateTime> {
        self.timestamp.as_deref().and_then(parse_timestamp)
    }
}
