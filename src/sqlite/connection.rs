use std::rc::Rc;

use anyhow::{bail, Result};
use itertools::Itertools;
use sqlparser::{dialect::SQLiteDialect, parser::Parser};
use tracing::debug;

use super::{
    btree::{TableBTree, TableRow},
    database::{Database, DatabaseHeader},
    error::FormatError,
    index_btree::IndexBTree,
    record::CellValue,
    schema::SqliteSchema,
    sql::sql_engine::{BinOp, Condition, SelectStatement, SelectTarget},
};

static DIALECT: SQLiteDialect = SQLiteDialect {};

pub struct Connection {
    db: Database,
}

impl Connection {
    pub fn new(file_path: impl Into<String>) -> Result<Connection> {
        Ok(Connection {
            db: Database::new(file_path)?,
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn header(&self) -> &DatabaseHeader {
        &self.db.header
    }

    pub fn schema_entry_count(&self) -> u16 {
        self.db.schema_entry_count()
    }

    pub fn get_schema(&self) -> &[Rc<SqliteSchema>] {
        self.db.get_schemas()
    }

    /// Table names for `.tables`: every `table` entry except the
    /// `sqlite_sequence` bookkeeping table.
    pub fn user_table_names(&self) -> Vec<String> {
        self.db
            .get_schemas()
            .iter()
            .filter_map(|s| match s.as_ref() {
                SqliteSchema::Table(t) if t.table_name.as_ref() != "sqlite_sequence" => {
                    Some(t.table_name.to_string())
                }
                _ => None,
            })
            .collect()
    }

    /// Parse and run one restricted `SELECT`, returning the output lines.
    pub fn execute_query(&self, sql: impl AsRef<str>) -> Result<Vec<String>> {
        let mut ast = Parser::parse_sql(&DIALECT, sql.as_ref())?;
        let statement = match (ast.pop(), ast.pop()) {
            (Some(s), None) => s,
            _ => bail!("only a single statement is supported"),
        };
        let select = SelectStatement::try_from(&statement)?;

        if let [SelectTarget::CountRows] = select.targets.as_slice() {
            return self.run_count(&select);
        }
        let columns: Vec<String> = select
            .targets
            .iter()
            .map(|target| match target {
                SelectTarget::Column(name) => Ok(name.clone()),
                SelectTarget::CountRows => {
                    bail!("COUNT(*) cannot be mixed with column selections")
                }
            })
            .try_collect()?;

        if let Some((column, key)) = equality_test(&select.predicate) {
            if let Some(index_schema) = self.db.get_index_on(&select.table, column) {
                debug!(index = index_schema.name(), column, "using indexed plan");
                return self.run_indexed(&select.table, index_schema, key, &columns);
            }
        }
        debug!(table = %select.table, "using sequential scan");
        self.run_scan(&select, &columns)
    }

    fn run_count(&self, select: &SelectStatement) -> Result<Vec<String>> {
        let tree = self.get_tree(&select.table)?;
        let mut count: i64 = 0;
        for row in tree.row_reader(&self.db) {
            let row = row?;
            if evaluate_predicate(&row, &select.predicate)? {
                count += 1;
            }
        }
        Ok(vec![count.to_string()])
    }

    fn run_indexed(
        &self,
        table: &str,
        index_schema: Rc<SqliteSchema>,
        key: &CellValue,
        columns: &[String],
    ) -> Result<Vec<String>> {
        let index = IndexBTree::new(index_schema)?;
        let mut row_ids = index.find_row_ids(&self.db, key)?;
        row_ids.sort_unstable();
        row_ids.dedup();
        let tree = self.get_tree(table)?;
        tree.fetch_rows(&self.db, &row_ids)?
            .iter()
            .map(|row| project(row, columns))
            .try_collect()
    }

    fn run_scan(&self, select: &SelectStatement, columns: &[String]) -> Result<Vec<String>> {
        let tree = self.get_tree(&select.table)?;
        let mut lines = Vec::new();
        for row in tree.row_reader(&self.db) {
            let row = row?;
            if !evaluate_predicate(&row, &select.predicate)? {
                continue;
            }
            lines.push(project(&row, columns)?);
        }
        Ok(lines)
    }

    pub fn get_tree(&self, table_name: impl AsRef<str>) -> Result<TableBTree> {
        let schema = self.db.get_table_schema(table_name)?;
        TableBTree::new(schema)
    }
}

/// A `WHERE column = literal` predicate, the only shape the indexed plan
/// serves.
fn equality_test(predicate: &Option<Condition>) -> Option<(&str, &CellValue)> {
    match predicate {
        Some(Condition::Binary(left, BinOp::Eq, right)) => {
            match (left.as_ref(), right.as_ref()) {
                (Condition::Column(column), Condition::Value(key)) => Some((column, key)),
                _ => None,
            }
        }
        _ => None,
    }
}

fn project(row: &TableRow, columns: &[String]) -> Result<String> {
    let values: Vec<String> = columns
        .iter()
        .map(|column| row.read_column(column).and_then(format_value))
        .try_collect()?;
    Ok(values.join("|"))
}

fn format_value(value: CellValue) -> Result<String> {
    Ok(match value {
        CellValue::Null => String::new(),
        CellValue::Int(i) => i.to_string(),
        CellValue::Float(f) => f.to_string(),
        CellValue::String(s) => s,
        CellValue::Blob(_) => {
            return Err(FormatError::Unsupported("blob values in query output".into()).into())
        }
    })
}

#[derive(Debug)]
enum Object {
    Bool(bool),
    Value(CellValue),
}

fn evaluate_predicate(row: &TableRow, predicate: &Option<Condition>) -> Result<bool> {
    match predicate {
        None => Ok(true),
        Some(condition) => match evaluate(row, condition)? {
            Object::Bool(b) => Ok(b),
            Object::Value(v) => bail!("where clause must evaluate to a boolean, got {v:?}"),
        },
    }
}

fn evaluate(row: &TableRow, condition: &Condition) -> Result<Object> {
    Ok(match condition {
        Condition::Value(value) => Object::Value(value.clone()),
        Condition::Column(column) => Object::Value(row.read_column(column)?),
        Condition::Binary(left, op, right) => {
            let left = evaluate(row, left)?;
            let right = evaluate(row, right)?;
            let result = match (left, op, right) {
                (Object::Value(l), BinOp::Eq, Object::Value(r)) => l.loosely_equals(&r),
                (Object::Value(l), BinOp::NotEq, Object::Value(r)) => !l.loosely_equals(&r),
                (Object::Bool(l), BinOp::Eq, Object::Bool(r)) => l == r,
                (Object::Bool(l), BinOp::NotEq, Object::Bool(r)) => l != r,
                (Object::Bool(l), BinOp::And, Object::Bool(r)) => l && r,
                (Object::Bool(l), BinOp::Or, Object::Bool(r)) => l || r,
                (l, op, r) => bail!("cannot apply {op:?} to {l:?} and {r:?}"),
            };
            Object::Bool(result)
        }
    })
}
