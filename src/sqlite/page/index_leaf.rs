use anyhow::Result;
use itertools::Itertools;

use super::page_header::PageHeader;
use crate::sqlite::error::FormatError;
use crate::sqlite::record::{decode_record, CellValue};
use crate::sqlite::varint::read_varint;

#[derive(Debug)]
pub struct IndexLeafPage {
    pub page_number: u32,
    pub header: PageHeader,
    pub cells: Vec<IndexLeafCell>,
}

/// One index entry: the indexed key and the row-id it points at.
#[derive(Debug, Clone)]
pub struct IndexLeafCell {
    pub key: CellValue,
    pub row_id: i64,
}

impl IndexLeafPage {
    pub fn parse(
        page_number: u32,
        header: PageHeader,
        bytes: &[u8],
        cell_pointers: &[usize],
    ) -> Result<IndexLeafPage> {
        let cells = cell_pointers
            .iter()
            .map(|&pointer| IndexLeafCell::decode(bytes, pointer))
            .try_collect()?;
        Ok(IndexLeafPage {
            page_number,
            header,
            cells,
        })
    }
}

impl IndexLeafCell {
    pub fn decode(bytes: &[u8], offset: usize) -> Result<IndexLeafCell> {
        let (payload_size, read) = read_varint(bytes, offset)?;
        let payload_start = offset + read;
        if payload_size < 0 || payload_start + payload_size as usize > bytes.len() {
            return Err(FormatError::Unsupported(
                "index payload spills to overflow pages".into(),
            )
            .into());
        }
        let record = decode_record(bytes, payload_start)?;
        split_index_record(record.values)
            .map(|(key, row_id)| IndexLeafCell { key, row_id })
    }
}

/// An index record is the indexed key column(s) followed by the table row-id.
/// Only single-column keys are in the supported subset.
pub(super) fn split_index_record(mut values: Vec<CellValue>) -> Result<(CellValue, i64)> {
    if values.len() != 2 {
        return Err(FormatError::Unsupported(format!(
            "index records with {} columns (only single-column keys are supported)",
            values.len()
        ))
        .into());
    }
    let row_id = match values.pop() {
        Some(CellValue::Int(id)) => id,
        other => {
            return Err(FormatError::MalformedRecord(format!(
                "index record row-id must be an integer, found {other:?}"
            ))
            .into())
        }
    };
    let key = values.pop().expect("length checked above");
    Ok((key, row_id))
}
