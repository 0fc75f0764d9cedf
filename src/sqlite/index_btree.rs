use std::borrow::Cow;
use std::cmp::Ordering;
use std::rc::Rc;

use anyhow::{bail, Result};
use itertools::Itertools;
use ptree::{print_tree_with, PrintConfig, Style};
use tracing::debug;

use super::{
    btree::DisplayNode,
    database::Database,
    page::IndexPage,
    record::CellValue,
    schema::SqliteSchema,
};

/// Walker over one index B-tree, keyed by the indexed value.
#[derive(Debug)]
pub struct IndexBTree {
    pub schema: Rc<SqliteSchema>,
    root_page: u32,
}

impl IndexBTree {
    pub fn new(schema: Rc<SqliteSchema>) -> Result<IndexBTree> {
        let SqliteSchema::Index(_) = schema.as_ref() else {
            bail!("expected an index schema but got a table");
        };
        let root_page = schema.root_page();
        Ok(IndexBTree { schema, root_page })
    }

    /// Every table row-id whose indexed key equals `key`, in index order.
    /// Callers sort before handing the ids to the table fetch.
    pub fn find_row_ids(&self, db: &Database, key: &CellValue) -> Result<Vec<i64>> {
        let mut row_ids = Vec::new();
        Self::find_into(db, self.root_page, key, &mut row_ids)?;
        debug!(index = %self.schema.name(), matches = row_ids.len(), "index lookup finished");
        Ok(row_ids)
    }

    fn find_into(db: &Database, page_number: u32, key: &CellValue, out: &mut Vec<i64>) -> Result<()> {
        match db.read_index_page(page_number)? {
            IndexPage::Leaf(leaf) => {
                // keys are sorted, so equal keys form one contiguous run
                for cell in &leaf.cells {
                    match key_cmp(&cell.key, key) {
                        Ordering::Less => continue,
                        Ordering::Equal => out.push(cell.row_id),
                        Ordering::Greater => break,
                    }
                }
            }
            IndexPage::Interior(interior) => {
                let mut descend_right_most = true;
                for cell in &interior.cells {
                    match key_cmp(key, &cell.key) {
                        // equal keys route left under the <= rule, and the
                        // interior cell itself holds a matching entry
                        Ordering::Equal => {
                            Self::find_into(db, cell.left_child_page, key, out)?;
                            out.push(cell.row_id);
                        }
                        Ordering::Less => {
                            Self::find_into(db, cell.left_child_page, key, out)?;
                            descend_right_most = false;
                            break;
                        }
                        Ordering::Greater => {}
                    }
                }
                if descend_right_most {
                    Self::find_into(db, interior.right_most, key, out)?;
                }
            }
        }
        Ok(())
    }

    pub fn pretty_print(&self, db: &Database) -> Result<()> {
        debug!(index = %self.schema.name(), root = self.root_page, "printing index B-tree");
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
        Ok(match db.read_index_page(page_number)? {
            IndexPage::Leaf(leaf) => {
                let label = match (leaf.cells.first(), leaf.cells.last()) {
                    (Some(first), Some(last)) => {
                        format!("page {page_number}: keys {}..={}", first.key, last.key)
                    }
                    _ => format!("page {page_number}: empty leaf"),
                };
                DisplayNode {
                    label,
                    children: Vec::new(),
                }
            }
            IndexPage::Interior(interior) => {
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

/// Index keys compare lexicographically on their decoded text form.
pub(crate) fn key_cmp(left: &CellValue, right: &CellValue) -> Ordering {
    key_text(left).cmp(&key_text(right))
}

fn key_text(value: &CellValue) -> Cow<'_, str> {
    match value {
        CellValue::String(s) => Cow::from(s.as_str()),
        CellValue::Int(i) => Cow::from(i.to_string()),
        CellValue::Float(f) => Cow::from(f.to_string()),
        CellValue::Null | CellValue::Blob(_) => Cow::from(""),
    }
}
