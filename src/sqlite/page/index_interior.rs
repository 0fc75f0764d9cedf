use anyhow::{Context, Result};
use itertools::Itertools;

use super::index_leaf::split_index_record;
use super::page_header::PageHeader;
use crate::sqlite::error::FormatError;
use crate::sqlite::record::{decode_record, CellValue};
use crate::sqlite::varint::read_varint;

#[derive(Debug)]
pub struct IndexInteriorPage {
    pub page_number: u32,
    pub header: PageHeader,
    pub cells: Vec<IndexInteriorCell>,
    pub right_most: u32,
}

/// Keys up to and including `key` route into `left_child_page`; the cell's
/// own payload is a real index entry as well, so `row_id` resolves to a row.
#[derive(Debug, Clone)]
pub struct IndexInteriorCell {
    pub left_child_page: u32,
    pub key: CellValue,
    pub row_id: i64,
}

impl IndexInteriorPage {
    pub fn parse(
        page_number: u32,
        header: PageHeader,
        bytes: &[u8],
        cell_pointers: &[usize],
    ) -> Result<IndexInteriorPage> {
        let right_most = header
            .right_most_pointer
            .context("interior page is missing its right-most pointer")?;
        let cells = cell_pointers
            .iter()
            .map(|&pointer| IndexInteriorCell::decode(bytes, pointer))
            .try_collect()?;
        Ok(IndexInteriorPage {
            page_number,
            header,
            cells,
            right_most,
        })
    }
}

impl IndexInteriorCell {
    pub fn decode(bytes: &[u8], offset: usize) -> Result<IndexInteriorCell> {
        let raw = bytes.get(offset..offset + 4).ok_or_else(|| {
            FormatError::MalformedRecord("index interior cell is truncated".into())
        })?;
        let left_child_page = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
        let (payload_size, read) = read_varint(bytes, offset + 4)?;
        let payload_start = offset + 4 + read;
        if payload_size < 0 || payload_start + payload_size as usize > bytes.len() {
            return Err(FormatError::Unsupported(
                "index payload spills to overflow pages".into(),
            )
            .into());
        }
        let record = decode_record(bytes, payload_start)?;
        split_index_record(record.values).map(|(key, row_id)| IndexInteriorCell {
            left_child_page,
            key,
            row_id,
        })
    }
}
