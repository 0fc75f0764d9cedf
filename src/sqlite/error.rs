use thiserror::Error;

/// Format-level failures raised while decoding the database file.
///
/// I/O failures are not represented here; they surface as `std::io::Error`
/// inside the surrounding `anyhow` context chain.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("malformed varint at byte {offset}")]
    MalformedVarint { offset: usize },

    #[error("malformed record: {0}")]
    MalformedRecord(String),

    #[error("unknown page type 0x{0:02x}")]
    UnknownPageType(u8),

    #[error("unknown serial type {0}")]
    UnknownSerialType(i64),

    #[error("no such table, index or column: {0}")]
    SchemaMissing(String),

    #[error("unsupported: {0}")]
    Unsupported(String),
}
