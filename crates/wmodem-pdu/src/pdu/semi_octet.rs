//! Semi-octet (swapped BCD) helpers for addresses and timestamps.

use crate::pdu::error::{PduError, PduResult};

/// Filler nibble used to pad an odd digit count.
const FILLER: u8 = 0x0F;

fn nibble_char(n: u8) -> char {
    match n {
        0..=9 => (b'0' + n) as char,
        0x0A => '*',
        0x0B => '#',
        0x0C => 'a',
        0x0D => 'b',
        0x0E => 'c',
        _ => 'F',
    }
}

fn char_nibble(c: char) -> Option<u8> {
    match c {
        '0'..='9' => Some(c as u8 - b'0'),
        '*' => Some(0x0A),
        '#' => Some(0x0B),
        'a' | 'A' => Some(0x0C),
        'b' | 'B' => Some(0x0D),
        'c' | 'C' => Some(0x0E),
        _ => None,
    }
}

/// Decode swapped BCD digits, low nibble first.
///
/// Decoding stops at the first filler nibble.
pub fn decode_digits(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        for n in [b & 0x0F, b >> 4] {
            if n == FILLER {
                return out;
            }
            out.push(nibble_char(n));
        }
    }
    out
}

/// Encode a digit string as swapped BCD, padding odd lengths with `F`.
pub fn encode_digits(digits: &str) -> PduResult<Vec<u8>> {
    let nibbles = digits
        .chars()
        .map(|c| {
            char_nibble(c)
                .ok_or_else(|| PduError::invalid_input(format!("invalid address digit '{}'", c)))
        })
        .collect::<PduResult<Vec<u8>>>()?;

    Ok(nibbles
        .chunks(2)
        .map(|pair| {
            let lo = pair[0];
            let hi = pair.get(1).copied().unwrap_or(FILLER);
            (hi << 4) | lo
        })
        .collect())
}

/// Render a 7-byte SCTS as `20YY/MM/DD HH:MM:SS`. The time-zone byte is
/// not rendered.
pub fn decode_timestamp(scts: &[u8]) -> PduResult<String> {
    if scts.len() < 7 {
        return Err(PduError::short("timestamp"));
    }
    let f: Vec<String> = scts[..6]
        .iter()
        .map(|b| format!("{:X}{:X}", b & 0x0F, b >> 4))
        .collect();
    Ok(format!(
        "20{}/{}/{} {}:{}:{}",
        f[0], f[1], f[2], f[3], f[4], f[5]
    ))
}
