//! SMS-SUBMIT encoding (UCS2).
//!
//! The modem's stored service centre is used (`00` SCA prefix), the
//! message reference is left to the modem, and no validity period is
//! sent. `tpdu_len` is the value `AT+CMGS` expects: the PDU length in
//! octets minus the SCA prefix.

use crate::pdu::error::{PduError, PduResult};
use crate::pdu::{semi_octet, ucs2, udh};
use serde::{Deserialize, Serialize};

/// Maximum user-data octets in one PDU.
pub const MAX_USER_DATA_OCTETS: usize = 140;
/// UCS2 units that fit in a single-part message.
pub const MAX_UNITS_SINGLE: usize = MAX_USER_DATA_OCTETS / 2;
/// UCS2 units per part once a 6-octet concatenation header is present.
pub const MAX_UNITS_PER_PART: usize = (MAX_USER_DATA_OCTETS - 6) / 2;

const FIRST_OCTET_SUBMIT: u8 = 0x01;
const FIRST_OCTET_SUBMIT_UDHI: u8 = 0x41;
const TOA_INTERNATIONAL: u8 = 0x91;
const DCS_UCS2: u8 = 0x08;

/// A ready-to-send submit PDU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedPdu {
    /// Upper-case hex, SCA prefix included.
    pub hex: String,
    /// Octets after the SCA prefix.
    pub tpdu_len: usize,
}

/// Encode `text` for `number` as a single UCS2 SMS-SUBMIT.
pub fn encode_submit(number: &str, text: &str) -> PduResult<EncodedPdu> {
    let payload = ucs2::encode(text);
    if payload.len() > MAX_USER_DATA_OCTETS {
        return Err(PduError::too_long(format!(
            "{} octets of user data exceed the {} octet limit",
            payload.len(),
            MAX_USER_DATA_OCTETS
        )));
    }
    build(number, None, &payload)
}

/// Encode `text` as one PDU, or as several with a concatenation header
/// when it does not fit. Parts never split a surrogate pair.
pub fn encode_submit_concatenated(
    number: &str,
    text: &str,
    reference: u8,
) -> PduResult<Vec<EncodedPdu>> {
    if ucs2::unit_len(text) <= MAX_UNITS_SINGLE {
        return Ok(vec![encode_submit(number, text)?]);
    }

    let parts = split_units(text, MAX_UNITS_PER_PART);
    let total = u8::try_from(parts.len())
        .map_err(|_| PduError::too_long(format!("{} parts exceed 255", parts.len())))?;

    parts
        .iter()
        .enumerate()
        .map(|(i, part)| {
            let header = udh::concat_header(reference, total, i as u8 + 1);
            build(number, Some(&header), &ucs2::encode(part))
        })
        .collect()
}

fn split_units(text: &str, max_units: usize) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut units = 0;
    for ch in text.chars() {
        let n = ch.len_utf16();
        if units + n > max_units {
            parts.push(std::mem::take(&mut current));
            units = 0;
        }
        current.push(ch);
        units += n;
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

fn encode_address(number: &str) -> PduResult<Vec<u8>> {
    let digits = number.trim().trim_start_matches('+');
    if digits.is_empty() {
        return Err(PduError::invalid_input("destination number is empty"));
    }
    let mut out = vec![digits.len() as u8, TOA_INTERNATIONAL];
    out.extend(semi_octet::encode_digits(digits)?);
    Ok(out)
}

fn build(number: &str, header: Option<&[u8]>, payload: &[u8]) -> PduResult<EncodedPdu> {
    let udl = header.map_or(0, |h| h.len()) + payload.len();

    let mut pdu = Vec::with_capacity(16 + udl);
    pdu.push(0x00);
    pdu.push(if header.is_some() {
        FIRST_OCTET_SUBMIT_UDHI
    } else {
        FIRST_OCTET_SUBMIT
    });
    pdu.push(0x00);
    pdu.extend(encode_address(number)?);
    pdu.push(0x00);
    pdu.push(DCS_UCS2);
    pdu.push(udl as u8);
    if let Some(h) = header {
        pdu.extend_from_slice(h);
    }
    pdu.extend_from_slice(payload);

    Ok(EncodedPdu {
        tpdu_len: pdu.len() - 1,
        hex: hex::encode_upper(&pdu),
    })
}
