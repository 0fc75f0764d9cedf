use anyhow::Result;

use super::error::FormatError;

/// Decode the big-endian base-128 varint starting at `offset`.
///
/// The low 7 bits of each of the first eight bytes contribute to the value,
/// most-significant group first; a set high bit means another byte follows.
/// The ninth byte, when reached, contributes all 8 bits. Returns the decoded
/// value and the number of bytes consumed (1-9).
pub fn read_varint(bytes: &[u8], offset: usize) -> Result<(i64, usize)> {
    let mut value: i64 = 0;
    for i in 0..9 {
        let byte = *bytes
            .get(offset + i)
            .ok_or(FormatError::MalformedVarint { offset })?;
        if i == 8 {
            return Ok(((value << 8) | i64::from(byte), 9));
        }
        value = (value << 7) | i64::from(byte & 0x7f);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    unreachable!("varint loop terminates within nine bytes")
}
