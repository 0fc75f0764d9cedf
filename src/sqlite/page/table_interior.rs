use anyhow::{Context, Result};
use itertools::Itertools;

use super::page_header::PageHeader;
use crate::sqlite::error::FormatError;
use crate::sqlite::varint::read_varint;

#[derive(Debug)]
pub struct TableInteriorPage {
    pub page_number: u32,
    pub header: PageHeader,
    pub cells: Vec<TableInteriorCell>,
    pub right_most: u32,
}

/// Row-ids less than or equal to `row_id` live under `left_child_page`.
#[derive(Debug, Clone, Copy)]
pub struct TableInteriorCell {
    pub left_child_page: u32,
    pub row_id: i64,
}

impl TableInteriorPage {
    pub fn parse(
        page_number: u32,
        header: PageHeader,
        bytes: &[u8],
        cell_pointers: &[usize],
    ) -> Result<TableInteriorPage> {
        let right_most = header
            .right_most_pointer
            .context("interior page is missing its right-most pointer")?;
        let cells = cell_pointers
            .iter()
            .map(|&pointer| TableInteriorCell::decode(bytes, pointer))
            .try_collect()?;
        Ok(TableInteriorPage {
            page_number,
            header,
            cells,
            right_most,
        })
    }
}

impl TableInteriorCell {
    pub fn decode(bytes: &[u8], offset: usize) -> Result<TableInteriorCell> {
        let raw = bytes.get(offset..offset + 4).ok_or_else(|| {
            FormatError::MalformedRecord("table interior cell is truncated".into())
        })?;
        let left_child_page = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
        let (row_id, _) = read_varint(bytes, offset + 4)?;
        Ok(TableInteriorCell {
            left_child_page,
            row_id,
        })
    }
}
