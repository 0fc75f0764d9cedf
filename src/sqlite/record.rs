use std::fmt;

use anyhow::Result;

use super::error::FormatError;
use super::varint::read_varint;

/// One decoded column value. Text is decoded lossily as UTF-8; the format
/// labels it UTF-8 but nothing in the read path depends on validity.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Int(i64),
    Float(f64),
    Blob(Vec<u8>),
    String(String),
}

impl CellValue {
    /// Predicate comparison used by the scan plan: same-typed values compare
    /// directly, and an int/text pair matches when the text side's lexical
    /// form coerces to the int side's value.
    pub fn loosely_equals(&self, other: &CellValue) -> bool {
        match (self, other) {
            (CellValue::Int(l), CellValue::Int(r)) => l == r,
            (CellValue::String(l), CellValue::String(r)) => l == r,
            (CellValue::Float(l), CellValue::Float(r)) => l == r,
            (CellValue::Int(l), CellValue::String(r)) | (CellValue::String(r), CellValue::Int(l)) => {
                r.parse::<i64>().map(|parsed| parsed == *l).unwrap_or(false)
            }
            _ => false,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::Int(v) => write!(f, "{v}"),
            CellValue::Float(v) => write!(f, "{v}"),
            CellValue::Blob(_) => Ok(()),
            CellValue::String(v) => write!(f, "{v}"),
        }
    }
}

/// The serial-type header entry for one column.
#[derive(Debug, Clone, Copy, PartialEq)]
enum SerialType {
    Null,
    Int(usize),
    Float,
    Zero,
    One,
    Blob(usize),
    Text(usize),
}

impl SerialType {
    fn from_code(code: i64) -> Result<SerialType> {
        Ok(match code {
            0 => SerialType::Null,
            1 => SerialType::Int(1),
            2 => SerialType::Int(2),
            3 => SerialType::Int(3),
            4 => SerialType::Int(4),
            5 => SerialType::Int(6),
            6 => SerialType::Int(8),
            7 => SerialType::Float,
            8 => SerialType::Zero,
            9 => SerialType::One,
            n if n >= 12 && n % 2 == 0 => SerialType::Blob(((n - 12) / 2) as usize),
            n if n >= 13 => SerialType::Text(((n - 13) / 2) as usize),
            n => return Err(FormatError::UnknownSerialType(n).into()),
        })
    }
}

/// A decoded record payload: the values in column order.
#[derive(Debug, Clone, Default)]
pub struct Record {
    pub values: Vec<CellValue>,
}

/// Decode a record (serial-type header followed by the value area) starting
/// at `offset` within a page.
pub fn decode_record(bytes: &[u8], offset: usize) -> Result<Record> {
    let (header_size, header_varint_len) = read_varint(bytes, offset)?;
    if header_size < header_varint_len as i64 {
        return Err(
            FormatError::MalformedRecord(format!("header size {header_size} is too small")).into(),
        );
    }
    let header_end = offset + header_size as usize;
    if header_end > bytes.len() {
        return Err(FormatError::MalformedRecord(
            "record header runs past the end of the page".into(),
        )
        .into());
    }

    let mut pos = offset + header_varint_len;
    let mut serial_types = Vec::new();
    while pos < header_end {
        let (code, read) = read_varint(bytes, pos)?;
        pos += read;
        serial_types.push(SerialType::from_code(code)?);
    }
    if pos != header_end {
        return Err(FormatError::MalformedRecord(
            "serial types overrun the declared header size".into(),
        )
        .into());
    }

    let mut values = Vec::with_capacity(serial_types.len());
    let mut body = header_end;
    for serial_type in serial_types {
        let (value, size) = decode_value(serial_type, bytes, body)?;
        values.push(value);
        body += size;
    }
    Ok(Record { values })
}

fn decode_value(serial_type: SerialType, bytes: &[u8], offset: usize) -> Result<(CellValue, usize)> {
    let take = |len: usize| {
        bytes.get(offset..offset + len).ok_or_else(|| {
            FormatError::MalformedRecord("record value area is truncated".into())
        })
    };
    Ok(match serial_type {
        SerialType::Null => (CellValue::Null, 0),
        SerialType::Zero => (CellValue::Int(0), 0),
        SerialType::One => (CellValue::Int(1), 0),
        SerialType::Int(width) => (CellValue::Int(sign_extend(take(width)?)), width),
        SerialType::Float => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(take(8)?);
            (CellValue::Float(f64::from_be_bytes(buf)), 8)
        }
        SerialType::Blob(len) => (CellValue::Blob(take(len)?.to_vec()), len),
        SerialType::Text(len) => (
            CellValue::String(String::from_utf8_lossy(take(len)?).into_owned()),
            len,
        ),
    })
}

/// Big-endian two's-complement integer of 1-8 bytes, sign-extended to 64 bits.
fn sign_extend(bytes: &[u8]) -> i64 {
    let mut padded = if bytes.first().is_some_and(|b| b & 0x80 != 0) {
        [0xff; 8]
    } else {
        [0; 8]
    };
    padded[8 - bytes.len()..].copy_from_slice(bytes);
    i64::from_be_bytes(padded)
}
