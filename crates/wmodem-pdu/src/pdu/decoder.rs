//! SMS-DELIVER / SMS-SUBMIT decoding.
//!
//! Layout (octets): SCA length + SCA, first octet, [MR], address,
//! PID, DCS, [SCTS | VP], UDL, UD. Every field read is bounds-checked
//! and reports the field it failed on.

use crate::pdu::error::{PduError, PduResult};
use crate::pdu::semi_octet;
use crate::pdu::types::{ConcatInfo, DataCoding, DecodedPdu, PduKind};
use crate::pdu::{gsm7, ucs2, udh};

const UDHI: u8 = 0x40;
const TON_MASK: u8 = 0x70;
const TON_INTERNATIONAL: u8 = 0x10;
const TON_ALPHANUMERIC: u8 = 0x50;

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn byte(&mut self, field: &str) -> PduResult<u8> {
        let b = *self.buf.get(self.pos).ok_or_else(|| PduError::short(field))?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize, field: &str) -> PduResult<&'a [u8]> {
        let end = self.pos + n;
        if end > self.buf.len() {
            return Err(PduError::short(field));
        }
        let s = &self.buf[self.pos..end];
        self.pos = end;
        Ok(s)
    }

    fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }
}

/// Decode a hex PDU as listed by `AT+CMGL` in PDU mode.
pub fn decode_pdu(pdu_hex: &str) -> PduResult<DecodedPdu> {
    let bytes = hex::decode(pdu_hex.trim())?;
    decode_bytes(&bytes)
}

/// Decode a binary PDU (SCA prefix included).
pub fn decode_bytes(buf: &[u8]) -> PduResult<DecodedPdu> {
    let mut c = Cursor::new(buf);

    let sca_len = c.byte("service centre length")? as usize;
    c.take(sca_len, "service centre address")?;

    let first = c.byte("pdu type")?;
    let kind = match first & 0x03 {
        0x00 => PduKind::Deliver,
        0x01 => PduKind::Submit,
        mti => {
            return Err(PduError::unsupported(format!(
                "unsupported message type indicator {}",
                mti
            )))
        }
    };
    let has_udh = first & UDHI != 0;

    if kind == PduKind::Submit {
        c.byte("message reference")?;
    }

    let address_field = match kind {
        PduKind::Deliver => "sender address",
        PduKind::Submit => "destination address",
    };
    let address = read_address(&mut c, address_field)?;

    c.byte("protocol identifier")?;
    let dcs = c.byte("data coding scheme")?;

    let timestamp = match kind {
        PduKind::Deliver => Some(semi_octet::decode_timestamp(c.take(7, "timestamp")?)?),
        PduKind::Submit => {
            match (first >> 3) & 0x03 {
                0x00 => {}
                0x02 => {
                    c.take(1, "validity period")?;
                }
                _ => {
                    c.take(7, "validity period")?;
                }
            }
            None
        }
    };

    let udl = c.byte("user data length")? as usize;
    let coding = coding_from_dcs(dcs);
    let (concat, text) = decode_user_data(c.rest(), udl, has_udh, coding)?;

    Ok(DecodedPdu {
        kind,
        address,
        timestamp,
        coding,
        text,
        concat,
    })
}

/// DCS bits 2-3: `10` selects UCS2, anything else the 7-bit alphabet.
pub fn coding_from_dcs(dcs: u8) -> DataCoding {
    if (dcs >> 2) & 0x03 == 0x02 {
        DataCoding::Ucs2
    } else {
        DataCoding::Gsm7
    }
}

fn read_address(c: &mut Cursor<'_>, field: &str) -> PduResult<String> {
    let digits = c.byte(field)? as usize;
    let toa = c.byte(field)?;
    let raw = c.take((digits + 1) / 2, field)?;

    match toa & TON_MASK {
        TON_ALPHANUMERIC => gsm7::decode(raw, digits * 4 / 7),
        TON_INTERNATIONAL => Ok(format!("+{}", semi_octet::decode_digits(raw))),
        _ => Ok(semi_octet::decode_digits(raw)),
    }
}

fn decode_user_data(
    ud: &[u8],
    udl: usize,
    has_udh: bool,
    coding: DataCoding,
) -> PduResult<(ConcatInfo, String)> {
    match coding {
        DataCoding::Gsm7 => {
            let septets = gsm7::unpack_septets(ud, udl)?;
            if !has_udh {
                return Ok((ConcatInfo::default(), gsm7::septets_to_string(&septets)));
            }
            let header = udh::parse(ud)?;
            // Header plus fill bits, rounded up to whole septets.
            let skip = (header.octets * 8 + 6) / 7;
            if skip > septets.len() {
                return Err(PduError::short("user data"));
            }
            Ok((header.concat, gsm7::septets_to_string(&septets[skip..])))
        }
        DataCoding::Ucs2 => {
            if ud.len() < udl {
                return Err(PduError::short("user data"));
            }
            let body = &ud[..udl];
            if !has_udh {
                return Ok((ConcatInfo::default(), ucs2::decode(body)));
            }
            let header = udh::parse(body)?;
            Ok((header.concat, ucs2::decode(&body[header.octets..])))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdu::error::PduErrorKind;

    #[test]
    fn test_decode_deliver_7bit() {
        let pdu = decode_pdu("00040D91683108108300F00000322181010000000BE8329BFD06DDDF723619").unwrap();
        assert_eq!(pdu.kind, PduKind::Deliver);
        assert_eq!(pdu.address, "+8613800138000");
        assert_eq!(pdu.timestamp.as_deref(), Some("2023/12/18 10:00:00"));
        assert_eq!(pdu.coding, DataCoding::Gsm7);
        assert_eq!(pdu.text, "hello world");
        assert_eq!(pdu.concat, ConcatInfo::default());
    }

    #[test]
    fn test_decode_with_service_centre() {
        let pdu = decode_pdu(
            "07917283010010F5040BC87238880900F10000993092516195800AE8329BFD4697D9EC37",
        )
        .unwrap();
        // Type 0xC8 is neither international nor alphanumeric.
        assert_eq!(pdu.address, "27838890001");
        assert_eq!(pdu.timestamp.as_deref(), Some("2099/03/29 15:16:59"));
        assert_eq!(pdu.text, "hellohello");
    }

    #[test]
    fn test_decode_deliver_ucs2() {
        let pdu = decode_pdu("00040D91683108108300F0000832218101000000044F60597D").unwrap();
        assert_eq!(pdu.coding, DataCoding::Ucs2);
        assert_eq!(pdu.text, "你好");
    }

    #[test]
    fn test_decode_ucs2_concat_8bit() {
        let pdu = decode_pdu(
            "00440D91683108108300F00008322181010000000E050003A703020062006900670020",
        )
        .unwrap();
        assert_eq!(pdu.text, "big ");
        assert_eq!(pdu.concat.reference, 0xA7);
        assert_eq!(pdu.concat.total, 3);
        assert_eq!(pdu.concat.sequence, 2);
    }

    #[test]
    fn test_decode_ucs2_concat_16bit() {
        let pdu = decode_pdu(
            "00440D91683108108300F00008322181010000000F060804123402010070006100720074",
        )
        .unwrap();
        assert_eq!(pdu.text, "part");
        assert_eq!(pdu.concat.reference, 0x1234);
        assert_eq!((pdu.concat.total, pdu.concat.sequence), (2, 1));
    }

    #[test]
    fn test_decode_7bit_concat_skips_header_septets() {
        let first = decode_pdu(
            "00440B915155214365F70000322181010000000E0500032A0201C2E231B96C3E03",
        )
        .unwrap();
        assert_eq!(first.address, "+15551234567");
        assert_eq!(first.text, "abcdefg");
        assert_eq!(first.concat.reference, 0x2A);
        assert_eq!((first.concat.total, first.concat.sequence), (2, 1));

        let second =
            decode_pdu("00440B915155214365F70000322181010000000B0500032A0202D069F51A").unwrap();
        assert_eq!(second.text, "hijk");
        assert_eq!(second.concat.sequence, 2);
    }

    #[test]
    fn test_decode_alphanumeric_sender() {
        let pdu = decode_pdu("00040CD0C7F7FBCC2E0300003221810100000002C834").unwrap();
        assert_eq!(pdu.address, "Google");
        assert_eq!(pdu.text, "Hi");
    }

    #[test]
    fn test_decode_submit() {
        let pdu = decode_pdu("0001000D91683108108300F000080400480069").unwrap();
        assert_eq!(pdu.kind, PduKind::Submit);
        assert_eq!(pdu.address, "+8613800138000");
        assert!(pdu.timestamp.is_none());
        assert_eq!(pdu.text, "Hi");
    }

    #[test]
    fn test_short_pdu_names_field() {
        let cases = [
            ("", "short pdu: service centre length"),
            ("07917283", "short pdu: service centre address"),
            ("0004", "short pdu: sender address"),
            ("00040D91683108", "short pdu: sender address"),
            ("00040D91683108108300F0", "short pdu: protocol identifier"),
            ("00040D91683108108300F0000032218101", "short pdu: timestamp"),
            ("00040D91683108108300F000003221810100000005C832", "short pdu: user data"),
        ];
        for (hex, expected) in cases {
            let err = decode_pdu(hex).unwrap_err();
            assert_eq!(err.kind, PduErrorKind::ShortPdu, "{}", hex);
            assert_eq!(err.message, expected, "{}", hex);
        }
    }

    #[test]
    fn test_invalid_hex() {
        let err = decode_pdu("00ZZ").unwrap_err();
        assert_eq!(err.kind, PduErrorKind::InvalidHex);
    }

    #[test]
    fn test_status_report_unsupported() {
        let err = decode_pdu("0002").unwrap_err();
        assert_eq!(err.kind, PduErrorKind::Unsupported);
    }

    #[test]
    fn test_coding_from_dcs() {
        assert_eq!(coding_from_dcs(0x00), DataCoding::Gsm7);
        assert_eq!(coding_from_dcs(0x04), DataCoding::Gsm7);
        assert_eq!(coding_from_dcs(0x08), DataCoding::Ucs2);
        assert_eq!(coding_from_dcs(0x18), DataCoding::Ucs2);
    }
}
