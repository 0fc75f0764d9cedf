use std::rc::Rc;

use anyhow::Result;
use sqlparser::{
    ast::{Expr, Statement},
    dialect::SQLiteDialect,
    parser::{Parser, ParserError},
};
use tracing::warn;

use super::normalize_ddl;

static DIALECT: SQLiteDialect = SQLiteDialect {};

#[derive(Debug)]
pub struct IndexSchema {
    pub row_id: i64,
    pub name: Rc<str>,
    pub table_name: Rc<str>,
    pub root_page: u32,
    pub sql: String,
    /// Indexed column names in declaration order.
    pub columns: Vec<Rc<str>>,
}

impl IndexSchema {
    pub fn new(
        row_id: i64,
        name: Rc<str>,
        table_name: Rc<str>,
        root_page: u32,
        sql: String,
    ) -> Result<IndexSchema> {
        let columns = parse_indexed_columns(&sql)?;
        if columns.is_empty() {
            warn!(index = %name, "could not recover indexed columns from stored DDL");
        }
        Ok(IndexSchema {
            row_id,
            name,
            table_name,
            root_page,
            sql,
            columns,
        })
    }
}

fn parse_indexed_columns(sql: &str) -> Result<Vec<Rc<str>>> {
    let ast = match Parser::parse_sql(&DIALECT, &normalize_ddl(sql)) {
        Ok(ast) => ast,
        Err(ParserError::ParserError(message)) => {
            warn!(%message, "stored index DDL did not re-parse");
            return Ok(Vec::new());
        }
        Err(err) => return Err(err.into()),
    };
    let Some(Statement::CreateIndex { columns, .. }) = ast.first() else {
        warn!("stored index DDL is not a CREATE INDEX statement");
        return Ok(Vec::new());
    };
    Ok(columns
        .iter()
        .filter_map(|ordered| match &ordered.expr {
            Expr::Identifier(ident) => Some(Rc::from(ident.value.as_str())),
            _ => None,
        })
        .collect())
}
