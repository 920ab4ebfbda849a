//! User-data header parsing and construction.

use crate::pdu::error::{PduError, PduResult};
use crate::pdu::types::ConcatInfo;

/// Concatenated short message, 8-bit reference.
pub const IE_CONCAT_8BIT: u8 = 0x00;
/// Concatenated short message, 16-bit reference.
pub const IE_CONCAT_16BIT: u8 = 0x08;

/// Parsed user-data header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserDataHeader {
    pub concat: ConcatInfo,
    /// Header size in octets including the UDHL octet itself.
    pub octets: usize,
}

/// Parse the header at the start of `ud`. Unknown IEs are skipped.
pub fn parse(ud: &[u8]) -> PduResult<UserDataHeader> {
    let udhl = *ud.first().ok_or_else(|| PduError::short("user data header"))? as usize;
    let end = 1 + udhl;
    if ud.len() < end {
        return Err(PduError::short("user data header"));
    }

    let mut concat = ConcatInfo::default();
    let mut i = 1;
    while i + 1 < end {
        let iei = ud[i];
        let iel = ud[i + 1] as usize;
        let start = i + 2;
        if start + iel > end {
            return Err(PduError::short("user data header element"));
        }
        let data = &ud[start..start + iel];
        let parsed = match (iei, iel) {
            (IE_CONCAT_8BIT, 3) => Some(ConcatInfo {
                reference: data[0] as u16,
                total: data[1],
                sequence: data[2],
            }),
            (IE_CONCAT_16BIT, 4) => Some(ConcatInfo {
                reference: u16::from_be_bytes([data[0], data[1]]),
                total: data[2],
                sequence: data[3],
            }),
            _ => None,
        };
        if let Some(c) = parsed {
            if c.total >= 1 && (c.total == 1 || (1..=c.total).contains(&c.sequence)) {
                concat = c;
            } else {
                log::debug!(
                    "ignoring malformed concatenation IE: ref={} total={} seq={}",
                    c.reference,
                    c.total,
                    c.sequence
                );
            }
        }
        i = start + iel;
    }

    Ok(UserDataHeader {
        concat,
        octets: end,
    })
}

/// `05 00 03 ref total seq`
pub fn concat_header(reference: u8, total: u8, sequence: u8) -> [u8; 6] {
    [0x05, IE_CONCAT_8BIT, 0x03, reference, total, sequence]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_8bit_reference() {
        let h = parse(&[0x05, 0x00, 0x03, 0xA7, 0x03, 0x02, 0x00, 0x41]).unwrap();
        assert_eq!(h.octets, 6);
        assert_eq!(h.concat.reference, 0xA7);
        assert_eq!(h.concat.total, 3);
        assert_eq!(h.concat.sequence, 2);
    }

    #[test]
    fn test_parse_16bit_reference() {
        let h = parse(&[0x06, 0x08, 0x04, 0x12, 0x34, 0x02, 0x01]).unwrap();
        assert_eq!(h.octets, 7);
        assert_eq!(h.concat.reference, 0x1234);
        assert_eq!((h.concat.total, h.concat.sequence), (2, 1));
    }

    #[test]
    fn test_unknown_ie_skipped() {
        // Port addressing IE (0x05) followed by an 8-bit concat IE.
        let ud = [0x0B, 0x05, 0x04, 0x0B, 0x84, 0x23, 0xF0, 0x00, 0x03, 0x01, 0x02, 0x02];
        let h = parse(&ud).unwrap();
        assert_eq!(h.octets, 12);
        assert_eq!(h.concat.reference, 1);
        assert_eq!(h.concat.sequence, 2);
    }

    #[test]
    fn test_no_concat_ie_defaults() {
        let h = parse(&[0x04, 0x05, 0x02, 0x0B, 0x84]).unwrap();
        assert_eq!(h.concat, ConcatInfo::default());
    }

    #[test]
    fn test_truncated_header() {
        assert!(parse(&[0x05, 0x00, 0x03]).is_err());
        assert!(parse(&[]).is_err());
    }

    #[test]
    fn test_sequence_out_of_range_ignored() {
        let h = parse(&[0x05, 0x00, 0x03, 0x01, 0x02, 0x05]).unwrap();
        assert_eq!(h.concat, ConcatInfo::default());
    }
}
