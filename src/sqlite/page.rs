use anyhow::{bail, Result};

use self::{
    index_interior::IndexInteriorPage, index_leaf::IndexLeafPage, page_header::PageHeader,
    page_header::PageType, table_interior::TableInteriorPage, table_leaf::TableLeafPage,
};
use super::error::FormatError;

pub mod index_interior;
pub mod index_leaf;
pub mod page_header;
pub mod table_interior;
pub mod table_leaf;

/// Byte length of the database file header at the start of page 1.
pub const DB_HEADER_SIZE: usize = 100;

#[derive(Debug)]
pub enum Page {
    Table(TablePage),
    Index(IndexPage),
}

#[derive(Debug)]
pub enum TablePage {
    Leaf(TableLeafPage),
    Interior(TableInteriorPage),
}

#[derive(Debug)]
pub enum IndexPage {
    Leaf(IndexLeafPage),
    Interior(IndexInteriorPage),
}

impl Page {
    /// Decode a full page image: B-tree page header, cell pointer array, and
    /// every cell, dispatched on the page type. `usable_size` excludes the
    /// per-page reserved region; nothing beyond it is ever touched.
    pub fn parse(page_number: u32, bytes: &[u8], usable_size: usize) -> Result<Page> {
        let bytes = &bytes[..usable_size.min(bytes.len())];
        let btree_offset = if page_number == 1 { DB_HEADER_SIZE } else { 0 };
        let (header, header_len) = PageHeader::decode(bytes, btree_offset)?;

        let pointer_array = btree_offset + header_len;
        let content_floor = pointer_array + 2 * usize::from(header.cell_count);
        let mut cell_pointers = Vec::with_capacity(usize::from(header.cell_count));
        for i in 0..usize::from(header.cell_count) {
            let at = pointer_array + 2 * i;
            let raw = bytes.get(at..at + 2).ok_or_else(|| {
                FormatError::MalformedRecord("cell pointer array is truncated".into())
            })?;
            let pointer = usize::from(u16::from_be_bytes([raw[0], raw[1]]));
            if pointer < content_floor || pointer >= bytes.len() {
                return Err(FormatError::MalformedRecord(format!(
                    "cell pointer {pointer} lies outside the usable page area"
                ))
                .into());
            }
            cell_pointers.push(pointer);
        }

        Ok(match header.page_type {
            PageType::TableLeaf => Page::Table(TablePage::Leaf(TableLeafPage::parse(
                page_number,
                header,
                bytes,
                &cell_pointers,
            )?)),
            PageType::TableInterior => Page::Table(TablePage::Interior(TableInteriorPage::parse(
                page_number,
                header,
                bytes,
                &cell_pointers,
            )?)),
            PageType::IndexLeaf => Page::Index(IndexPage::Leaf(IndexLeafPage::parse(
                page_number,
                header,
                bytes,
                &cell_pointers,
            )?)),
            PageType::IndexInterior => Page::Index(IndexPage::Interior(IndexInteriorPage::parse(
                page_number,
                header,
                bytes,
                &cell_pointers,
            )?)),
        })
    }

    pub fn into_table_page(self) -> Result<TablePage> {
        match self {
            Page::Table(page) => Ok(page),
            Page::Index(_) => bail!("expected a table page but found an index page"),
        }
    }

    pub fn into_index_page(self) -> Result<IndexPage> {
        match self {
            Page::Index(page) => Ok(page),
            Page::Table(_) => bail!("expected an index page but found a table page"),
        }
    }
}
