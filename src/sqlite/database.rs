use std::{
    cell::RefCell,
    fs::File,
    io::{Read, Seek, SeekFrom},
    rc::Rc,
};

use anyhow::{bail, Context, Result};
use itertools::Itertools;
use tracing::{debug, warn};

use super::{
    error::FormatError,
    page::{IndexPage, Page, TablePage, DB_HEADER_SIZE},
    record::CellValue,
    schema::{index_schema::IndexSchema, table_schema::TableSchema, SqliteSchema},
};

#[derive(Debug)]
pub struct DatabaseHeader {
    pub page_size: u32,
    /// Bytes reserved at the end of every page, usually 0.
    pub reserved_space: u8,
}

pub struct Database {
    pub header: DatabaseHeader,
    file: RefCell<File>,
    schema: Vec<Rc<SqliteSchema>>,
    schema_entry_count: u16,
}

impl Database {
    pub fn new(file_path: impl Into<String>) -> Result<Database> {
        let path = file_path.into();
        let mut file = File::open(&path).with_context(|| format!("opening {path}"))?;
        let mut header_bytes = [0u8; DB_HEADER_SIZE];
        file.read_exact(&mut header_bytes)
            .context("reading the database file header")?;

        let page_size = match u16::from_be_bytes([header_bytes[16], header_bytes[17]]) {
            1 => return Err(FormatError::Unsupported("65536-byte pages".into()).into()),
            n if (512..=32768).contains(&n) && n.is_power_of_two() => u32::from(n),
            n => bail!("invalid page size {n} in the database header"),
        };
        let header = DatabaseHeader {
            page_size,
            reserved_space: header_bytes[20],
        };

        let mut db = Database {
            header,
            file: file.into(),
            schema: Vec::new(),
            schema_entry_count: 0,
        };
        let (schema, entry_count) = db.read_schema()?;
        db.schema = schema.into_iter().map(Rc::new).collect_vec();
        db.schema_entry_count = entry_count;
        Ok(db)
    }

    /// Read and decode one page. Page 1's buffer starts with the 100-byte
    /// file header, so its B-tree content begins at offset 100.
    pub fn read_page(&self, page_number: u32) -> Result<Page> {
        if page_number == 0 {
            bail!("pages are numbered from 1");
        }
        let page_size = self.header.page_size as usize;
        let mut buffer = vec![0u8; page_size];
        {
            let mut file = self.file.borrow_mut();
            let offset = u64::from(page_number - 1) * page_size as u64;
            file.seek(SeekFrom::Start(offset))
                .with_context(|| format!("seeking to page {page_number}"))?;
            file.read_exact(&mut buffer)
                .with_context(|| format!("reading page {page_number}"))?;
        }
        debug!(page_number, "page read");
        Page::parse(page_number, &buffer, page_size - usize::from(self.header.reserved_space))
    }

    pub fn read_table_page(&self, page_number: u32) -> Result<TablePage> {
        self.read_page(page_number)?.into_table_page()
    }

    pub fn read_index_page(&self, page_number: u32) -> Result<IndexPage> {
        self.read_page(page_number)?.into_index_page()
    }

    pub fn get_schemas(&self) -> &[Rc<SqliteSchema>] {
        &self.schema
    }

    /// Cell count of the root schema page, which `.dbinfo` reports as the
    /// table count.
    pub fn schema_entry_count(&self) -> u16 {
        self.schema_entry_count
    }

    pub fn get_table_schema(&self, table_name: impl AsRef<str>) -> Result<Rc<SqliteSchema>> {
        self.schema
            .iter()
            .find(|s| matches!(s.as_ref(), SqliteSchema::Table(t) if t.name.as_ref() == table_name.as_ref()))
            .cloned()
            .ok_or_else(|| FormatError::SchemaMissing(table_name.as_ref().to_string()).into())
    }

    /// The first index on `table_name` whose leading column is `column_name`.
    pub fn get_index_on(
        &self,
        table_name: impl AsRef<str>,
        column_name: impl AsRef<str>,
    ) -> Option<Rc<SqliteSchema>> {
        self.schema
            .iter()
            .find(|s| match s.as_ref() {
                SqliteSchema::Index(ix) => {
                    ix.table_name.as_ref() == table_name.as_ref()
                        && ix
                            .columns
                            .first()
                            .is_some_and(|c| c.as_ref() == column_name.as_ref())
                }
                SqliteSchema::Table(_) => false,
            })
            .cloned()
    }

    /// Bootstrap the catalog from page 1, the root of the `sqlite_schema`
    /// table. Returns the decoded entries and the page's cell count.
    fn read_schema(&self) -> Result<(Vec<SqliteSchema>, u16)> {
        let page = match self.read_table_page(1)? {
            TablePage::Leaf(leaf) => leaf,
            TablePage::Interior(_) => {
                return Err(
                    FormatError::Unsupported("multi-page schema tables".into()).into(),
                )
            }
        };
        let entry_count = page.header.cell_count;

        let mut schemas = Vec::new();
        for cell in page.cells {
            let row_id = cell.row_id;
            let mut values = cell.record.values;
            if values.len() != 5 {
                return Err(
                    FormatError::MalformedRecord("schema rows must have five columns".into()).into(),
                );
            }
            let sql = match values.pop().expect("length checked above") {
                CellValue::String(sql) => sql,
                CellValue::Null => {
                    warn!(row_id, "skipping schema entry without stored DDL");
                    continue;
                }
                other => {
                    return Err(FormatError::MalformedRecord(format!(
                        "schema sql column must be text, found {other:?}"
                    ))
                    .into())
                }
            };
            let root_page = match values.pop().expect("length checked above") {
                CellValue::Int(n) if n >= 1 => n as u32,
                other => {
                    return Err(FormatError::MalformedRecord(format!(
                        "schema root page must be a positive integer, found {other:?}"
                    ))
                    .into())
                }
            };
            let tbl_name = schema_text(values.pop().expect("length checked above"), "tbl_name")?;
            let name = schema_text(values.pop().expect("length checked above"), "name")?;
            let kind = schema_text(values.pop().expect("length checked above"), "type")?;

            match kind.as_str() {
                "table" => schemas.push(SqliteSchema::Table(TableSchema::new(
                    row_id,
                    Rc::from(name.as_str()),
                    Rc::from(tbl_name.as_str()),
                    root_page,
                    sql,
                )?)),
                "index" => schemas.push(SqliteSchema::Index(IndexSchema::new(
                    row_id,
                    Rc::from(name.as_str()),
                    Rc::from(tbl_name.as_str()),
                    root_page,
                    sql,
                )?)),
                "view" | "trigger" => {
                    warn!(name = %name, kind = %kind, "skipping unsupported schema entry");
                }
                other => {
                    return Err(FormatError::MalformedRecord(format!(
                        "invalid schema entry type {other:?}"
                    ))
                    .into())
                }
            }
        }

        Ok((schemas, entry_count))
    }
}

fn schema_text(value: CellValue, column: &str) -> Result<String> {
    match value {
        CellValue::String(text) => Ok(text),
        other => Err(FormatError::MalformedRecord(format!(
            "schema {column} column must be text, found {other:?}"
        ))
        .into()),
    }
}
