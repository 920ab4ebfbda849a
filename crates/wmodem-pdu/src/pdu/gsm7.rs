//! GSM 03.38 default alphabet, packed 7-bit.

use crate::pdu::error::{PduError, PduResult};

/// Escape to the extension table.
const ESCAPE: u8 = 0x1B;

#[rustfmt::skip]
const BASIC: [char; 128] = [
    '@', '£', '$', '¥', 'è', 'é', 'ù', 'ì', 'ò', 'Ç', '\n', 'Ø', 'ø', '\r', 'Å', 'å',
    'Δ', '_', 'Φ', 'Γ', 'Λ', 'Ω', 'Π', 'Ψ', 'Σ', 'Θ', 'Ξ', ' ', 'Æ', 'æ', 'ß', 'É',
    ' ', '!', '"', '#', '¤', '%', '&', '\'', '(', ')', '*', '+', ',', '-', '.', '/',
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', ':', ';', '<', '=', '>', '?',
    '¡', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O',
    'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', 'Ä', 'Ö', 'Ñ', 'Ü', '§',
    '¿', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o',
    'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', 'ä', 'ö', 'ñ', 'ü', 'à',
];

fn extension(septet: u8) -> Option<char> {
    match septet {
        0x0A => Some('\u{0C}'),
        0x14 => Some('^'),
        0x28 => Some('{'),
        0x29 => Some('}'),
        0x2F => Some('\\'),
        0x3C => Some('['),
        0x3D => Some('~'),
        0x3E => Some(']'),
        0x40 => Some('|'),
        0x65 => Some('€'),
        _ => None,
    }
}

/// Number of octets needed to hold `septets` packed septets.
pub fn packed_len(septets: usize) -> usize {
    (septets * 7 + 7) / 8
}

/// Unpack `count` septets from packed user data.
pub fn unpack_septets(data: &[u8], count: usize) -> PduResult<Vec<u8>> {
    if data.len() < packed_len(count) {
        return Err(PduError::short("user data"));
    }
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let bit = i * 7;
        let byte = bit / 8;
        let shift = bit % 8;
        let mut v = (data[byte] as u16) >> shift;
        if shift > 1 {
            v |= (data[byte + 1] as u16) << (8 - shift);
        }
        out.push((v & 0x7F) as u8);
    }
    Ok(out)
}

/// Map septets through the default alphabet and its extension table.
pub fn septets_to_string(septets: &[u8]) -> String {
    let mut out = String::with_capacity(septets.len());
    let mut iter = septets.iter().copied();
    while let Some(s) = iter.next() {
        if s == ESCAPE {
            match iter.next() {
                Some(next) => out.push(extension(next).unwrap_or(BASIC[(next & 0x7F) as usize])),
                None => break,
            }
        } else {
            out.push(BASIC[(s & 0x7F) as usize]);
        }
    }
    out
}

/// Unpack and map in one step.
pub fn decode(data: &[u8], count: usize) -> PduResult<String> {
    Ok(septets_to_string(&unpack_septets(data, count)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unpack_hellohello() {
        let data = hex::decode("E8329BFD4697D9EC37").unwrap();
        assert_eq!(decode(&data, 10).unwrap(), "hellohello");
    }

    #[test]
    fn test_unpack_hello() {
        let data = [0xC8, 0x32, 0x9B, 0xFD, 0x06];
        assert_eq!(decode(&data, 5).unwrap(), "Hello");
    }

    #[test]
    fn test_unpack_truncates_to_declared_count() {
        let data = hex::decode("E8329BFD4697D9EC37").unwrap();
        assert_eq!(decode(&data, 5).unwrap(), "hello");
    }

    #[test]
    fn test_unpack_short_buffer() {
        let err = unpack_septets(&[0xC8, 0x32], 5).unwrap_err();
        assert_eq!(err.message, "short pdu: user data");
    }

    #[test]
    fn test_alphabet_mapping() {
        assert_eq!(septets_to_string(&[0x00, 0x02, 0x11]), "@$_");
        assert_eq!(septets_to_string(&[0x1B, 0x65, 0x31]), "€1");
        assert_eq!(septets_to_string(&[0x41, 0x1B]), "A");
    }

    #[test]
    fn test_packed_len() {
        assert_eq!(packed_len(0), 0);
        assert_eq!(packed_len(7), 7);
        assert_eq!(packed_len(8), 7);
        assert_eq!(packed_len(10), 9);
    }
}
