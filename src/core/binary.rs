//! Decoding of PostgreSQL `bytea` literals
//!
//! Two textual encodings exist: the hex format (`\x` followed by hex digits)
//! and the legacy escape format, where non-printable bytes are written as
//! `\ooo` octal triplets and a backslash as `\\`.

/// Decode a `bytea` text payload into raw bytes.
///
/// Payloads that are not valid in either encoding are returned unchanged.
pub fn decode_bytea(payload: &[u8]) -> Vec<u8> {
    match payload.strip_prefix(br"\x") {
        Some(digits) => hex::decode(digits).unwrap_or_else(|_| payload.to_vec()),
        None => decode_escape_format(payload).unwrap_or_else(|| payload.to_vec()),
    }
}

fn decode_escape_format(payload: &[u8]) -> Option<Vec<u8>> {
    if !payload.contains(&b'\\') {
        return Some(payload.to_vec());
    }

    let mut decoded = Vec::with_capacity(payload.len());
    let mut i = 0;
    while i < payload.len() {
        if payload[i] != b'\\' {
            decoded.push(payload[i]);
            i += 1;
            continue;
        }

        match payload.get(i + 1..i + 4) {
            Some([b'\\', ..]) => {
                decoded.push(b'\\');
                i += 2;
            }
            Some(octal) if octal.iter().all(|b| (b'0'..=b'7').contains(b)) => {
                let value = octal
                    .iter()
                    .fold(0u16, |acc, digit| acc * 8 + u16::from(digit - b'0'));
                decoded.push(u8::try_from(value).ok()?);
                i += 4;
            }
            _ if payload.get(i + 1) == Some(&b'\\') => {
                decoded.push(b'\\');
                i += 2;
            }
            _ => return None,
        }
    }
    Some(decoded)
}
