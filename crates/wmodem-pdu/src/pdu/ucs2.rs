//! UCS2 user data (big-endian UTF-16 code units).

/// Decode big-endian 16-bit units. Surrogate pairs are combined; an odd
/// trailing octet is ignored and unpaired surrogates become U+FFFD.
pub fn decode(data: &[u8]) -> String {
    let units: Vec<u16> = data
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

/// Encode text as big-endian 16-bit units.
pub fn encode(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(|u| u.to_be_bytes()).collect()
}

/// Length of `text` in 16-bit units.
pub fn unit_len(text: &str) -> usize {
    text.encode_utf16().count()
}
