use anyhow::Result;
use itertools::Itertools;

use super::page_header::PageHeader;
use crate::sqlite::error::FormatError;
use crate::sqlite::record::{decode_record, Record};
use crate::sqlite::varint::read_varint;

#[derive(Debug)]
pub struct TableLeafPage {
    pub page_number: u32,
    pub header: PageHeader,
    pub cells: Vec<TableLeafCell>,
}

#[derive(Debug, Clone)]
pub struct TableLeafCell {
    pub row_id: i64,
    pub record: Record,
}

impl TableLeafPage {
    pub fn parse(
        page_number: u32,
        header: PageHeader,
        bytes: &[u8],
        cell_pointers: &[usize],
    ) -> Result<TableLeafPage> {
        let cells = cell_pointers
            .iter()
            .map(|&pointer| TableLeafCell::decode(bytes, pointer))
            .try_collect()?;
        Ok(TableLeafPage {
            page_number,
            header,
            cells,
        })
    }
}

impl TableLeafCell {
    /// Payload-size varint, row-id varint, then the record itself.
    pub fn decode(bytes: &[u8], offset: usize) -> Result<TableLeafCell> {
        let (payload_size, read) = read_varint(bytes, offset)?;
        let (row_id, id_read) = read_varint(bytes, offset + read)?;
        let payload_start = offset + read + id_read;
        if payload_size < 0 || payload_start + payload_size as usize > bytes.len() {
            return Err(FormatError::Unsupported(
                "record payload spills to overflow pages".into(),
            )
            .into());
        }
        let record = decode_record(bytes, payload_start)?;
        Ok(TableLeafCell { row_id, record })
    }
}
