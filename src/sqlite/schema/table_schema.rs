use std::rc::Rc;

use anyhow::{bail, Result};
use itertools::Itertools;
use sqlparser::{
    ast::{ColumnOption, Statement},
    dialect::SQLiteDialect,
    parser::{Parser, ParserError},
};
use tracing::warn;

use super::normalize_ddl;
use crate::sqlite::column::{Column, TypeAffinity};

static DIALECT: SQLiteDialect = SQLiteDialect {};

#[derive(Debug)]
pub struct TableSchema {
    pub row_id: i64,
    pub name: Rc<str>,
    pub table_name: Rc<str>,
    pub root_page: u32,
    pub sql: String,
    pub columns: Vec<Rc<Column>>,
    /// Index of the INTEGER PRIMARY KEY column, when the table has one. That
    /// column is stored as NULL on disk and reads back as the cell's row-id.
    pub rowid_alias: Option<usize>,
}

impl TableSchema {
    pub fn new(
        row_id: i64,
        name: Rc<str>,
        table_name: Rc<str>,
        root_page: u32,
        sql: String,
    ) -> Result<TableSchema> {
        let (columns, rowid_alias) = parse_columns(&sql)?;
        if columns.is_empty() {
            warn!(table = %table_name, "could not recover column list from stored DDL");
        }
        Ok(TableSchema {
            row_id,
            name,
            table_name,
            root_page,
            sql,
            columns,
            rowid_alias,
        })
    }

    pub fn column_index(&self, column_name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.as_ref() == column_name)
    }
}

/// Recover column order, affinities, and the rowid-alias column from the
/// stored `CREATE TABLE` text. A DDL that sqlparser still refuses after
/// normalization (e.g. sqlite_sequence's datatype-less columns) yields an
/// empty column list rather than failing the bootstrap.
fn parse_columns(sql: &str) -> Result<(Vec<Rc<Column>>, Option<usize>)> {
    let ast = match Parser::parse_sql(&DIALECT, &normalize_ddl(sql)) {
        Ok(ast) => ast,
        Err(ParserError::ParserError(message)) => {
            warn!(%message, "stored DDL did not re-parse");
            return Ok((Vec::new(), None));
        }
        Err(err) => return Err(err.into()),
    };
    if ast.len() != 1 {
        bail!("table schema sql must hold exactly one statement");
    }
    let Statement::CreateTable { columns, .. } = &ast[0] else {
        bail!("table schema sql must be a CREATE TABLE statement");
    };

    let mut rowid_alias = None;
    let columns: Vec<Rc<Column>> = columns
        .iter()
        .enumerate()
        .map(|(position, def)| {
            let type_affinity = TypeAffinity::from(&def.data_type);
            let is_primary = def.options.iter().any(|opt| {
                matches!(opt.option, ColumnOption::Unique { is_primary: true })
            });
            if is_primary && type_affinity == TypeAffinity::Integer && rowid_alias.is_none() {
                rowid_alias = Some(position);
            }
            Rc::new(Column {
                name: Rc::from(def.name.value.as_str()),
                type_affinity,
            })
        })
        .collect_vec();

    Ok((columns, rowid_alias))
}
