use std::borrow::Cow;
use std::rc::Rc;

use anyhow::{bail, Result};
use itertools::Itertools;
use ptree::{print_tree_with, PrintConfig, Style, TreeItem};
use tracing::debug;

use super::{
    database::Database,
    error::FormatError,
    page::{table_leaf::TableLeafCell, TablePage},
    record::{CellValue, Record},
    schema::SqliteSchema,
};

/// Walker over one table B-tree. Pages are read as they are visited; the
/// tree is never materialized.
#[derive(Debug)]
pub struct TableBTree {
    pub schema: Rc<SqliteSchema>,
    root_page: u32,
}

impl TableBTree {
    pub fn new(schema: Rc<SqliteSchema>) -> Result<TableBTree> {
        let SqliteSchema::Table(_) = schema.as_ref() else {
            bail!("expected a table schema but got an index");
        };
        let root_page = schema.root_page();
        Ok(TableBTree { schema, root_page })
    }

    /// Full scan in ascending row-id order.
    pub fn row_reader<'a>(&'a self, db: &'a Database) -> RowReader<'a> {
        RowReader {
            db,
            schema: self.schema.clone(),
            stack: vec![self.root_page],
            current: Vec::new().into_iter(),
        }
    }

    /// Fetch the rows for an ascending list of row-ids, pruning every branch
    /// that cannot contain one of them. Missing ids are silently skipped;
    /// output stays ascending.
    pub fn fetch_rows(&self, db: &Database, sorted_row_ids: &[i64]) -> Result<Vec<TableRow>> {
        let mut cells = Vec::with_capacity(sorted_row_ids.len());
        Self::fetch_into(db, self.root_page, sorted_row_ids, &mut cells)?;
        Ok(cells
            .into_iter()
            .map(|cell| TableRow::new(cell.row_id, cell.record, self.schema.clone()))
            .collect())
    }

    fn fetch_into(
        db: &Database,
        page_number: u32,
        targets: &[i64],
        out: &mut Vec<TableLeafCell>,
    ) -> Result<()> {
        if targets.is_empty() {
            return Ok(());
        }
        match db.read_table_page(page_number)? {
            TablePage::Leaf(leaf) => {
                let mut remaining = targets;
                for cell in leaf.cells {
                    while remaining.first().is_some_and(|&t| t < cell.row_id) {
                        remaining = &remaining[1..];
                    }
                    match remaining.first() {
                        Some(&target) if target == cell.row_id => {
                            out.push(cell);
                            remaining = &remaining[1..];
                        }
                        Some(_) => {}
                        None => break,
                    }
                }
            }
            TablePage::Interior(interior) => {
                // row-ids <= a cell's key live in its left child; everything
                // past the last key lives under the right-most pointer
                let mut remaining = targets;
                for cell in &interior.cells {
                    let split = remaining.partition_point(|&t| t <= cell.row_id);
                    if split > 0 {
                        Self::fetch_into(db, cell.left_child_page, &remaining[..split], out)?;
                        remaining = &remaining[split..];
                    }
                }
                Self::fetch_into(db, interior.right_most, remaining, out)?;
            }
        }
        Ok(())
    }

    pub fn pretty_print(&self, db: &Database) -> Result<()> {
        debug!(table = %self.schema.name(), root = self.root_page, "printing table B-tree");
        let root = Self::display_node(db, self.root_page)?;
        let config = PrintConfig {
            leaf: Style {
                bold: true,
                ..Style::default()
            },
            branch: Style::default(),
            ..PrintConfig::default()
        };
        print_tree_with(&root, &config)?;
        Ok(())
    }

    fn display_node(db: &Database, page_number: u32) -> Result<DisplayNode> {
        Ok(match db.read_table_page(page_number)? {
            TablePage::Leaf(leaf) => {
                let label = match (leaf.cells.first(), leaf.cells.last()) {
                    (Some(first), Some(last)) => {
                        format!("page {page_number}: rows {}..={}", first.row_id, last.row_id)
                    }
                    _ => format!("page {page_number}: empty leaf"),
                };
                DisplayNode {
                    label,
                    children: Vec::new(),
                }
            }
            TablePage::Interior(interior) => {
                let mut children: Vec<DisplayNode> = interior
                    .cells
                    .iter()
                    .map(|cell| Self::display_node(db, cell.left_child_page))
                    .try_collect()?;
                children.push(Self::display_node(db, interior.right_most)?);
                DisplayNode {
                    label: format!("page {page_number}: {} children", children.len()),
                    children,
                }
            }
        })
    }
}

/// In-order traversal of a table B-tree: an explicit stack of pages still to
/// visit plus the cells of the leaf currently being drained.
pub struct RowReader<'a> {
    db: &'a Database,
    schema: Rc<SqliteSchema>,
    stack: Vec<u32>,
    current: std::vec::IntoIter<TableLeafCell>,
}

impl Iterator for RowReader<'_> {
    type Item = Result<TableRow>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(cell) = self.current.next() {
                return Some(Ok(TableRow::new(
                    cell.row_id,
                    cell.record,
                    self.schema.clone(),
                )));
            }
            let page_number = self.stack.pop()?;
            match self.db.read_table_page(page_number) {
                Ok(TablePage::Leaf(leaf)) => {
                    self.current = leaf.cells.into_iter();
                }
                Ok(TablePage::Interior(interior)) => {
                    self.stack.push(interior.right_most);
                    for cell in interior.cells.iter().rev() {
                        self.stack.push(cell.left_child_page);
                    }
                }
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

#[derive(Debug)]
pub struct TableRow {
    pub row_id: i64,
    pub record: Record,
    schema: Rc<SqliteSchema>,
}

impl TableRow {
    pub fn new(row_id: i64, record: Record, schema: Rc<SqliteSchema>) -> TableRow {
        TableRow {
            row_id,
            record,
            schema,
        }
    }

    pub fn read_column(&self, column_name: &str) -> Result<CellValue> {
        let SqliteSchema::Table(schema) = self.schema.as_ref() else {
            bail!("rows can only be read against a table schema");
        };
        let index = schema.column_index(column_name).ok_or_else(|| {
            FormatError::SchemaMissing(format!(
                "column {column_name} on table {}",
                schema.table_name
            ))
        })?;
        let value = self
            .record
            .values
            .get(index)
            .cloned()
            .unwrap_or(CellValue::Null);
        // the INTEGER PRIMARY KEY column is stored as NULL; its value is the
        // cell's row-id
        if schema.rowid_alias == Some(index) && value == CellValue::Null {
            return Ok(CellValue::Int(self.row_id));
        }
        Ok(value)
    }
}

/// Materialized page summary used only by the `.btree` command.
#[derive(Debug, Clone)]
pub struct DisplayNode {
    pub(crate) label: String,
    pub(crate) children: Vec<DisplayNode>,
}

impl TreeItem for DisplayNode {
    type Child = DisplayNode;

    fn write_self<W: std::io::Write>(&self, f: &mut W, _: &Style) -> std::io::Result<()> {
        write!(f, "{}", self.label)
    }

    fn children(&self) -> Cow<[Self::Child]> {
        Cow::from(&self.children[..])
    }
}
