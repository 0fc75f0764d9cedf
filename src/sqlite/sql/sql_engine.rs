use anyhow::{bail, Context, Error, Result};
use itertools::Itertools;
use sqlparser::ast::{self, BinaryOperator, Expr, Select, SelectItem, Statement};

use crate::sqlite::record::CellValue;

/// The reduced statement shape the executor consumes: a single-table SELECT
/// whose targets are plain columns or one `COUNT(*)`, with an optional
/// predicate tree. Everything else the parser can produce is rejected here.
#[derive(Debug)]
pub struct SelectStatement {
    pub targets: Vec<SelectTarget>,
    pub table: String,
    pub predicate: Option<Condition>,
}

#[derive(Debug)]
pub enum SelectTarget {
    Column(String),
    CountRows,
}

/// WHERE-clause expression tree.
#[derive(Debug)]
pub enum Condition {
    Column(String),
    Value(CellValue),
    Binary(Box<Condition>, BinOp, Box<Condition>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Eq,
    NotEq,
    And,
    Or,
}

impl TryFrom<&Statement> for SelectStatement {
    type Error = Error;

    fn try_from(statement: &Statement) -> Result<SelectStatement> {
        let Statement::Query(query) = statement else {
            bail!("{statement} statements are not supported");
        };
        let ast::SetExpr::Select(select) = query.body.as_ref() else {
            bail!("compound queries are not supported");
        };
        SelectStatement::build(select.as_ref())
    }
}

impl SelectStatement {
    fn build(select: &Select) -> Result<SelectStatement> {
        let targets: Vec<SelectTarget> = select
            .projection
            .iter()
            .map(|item| item.try_into())
            .try_collect()?;

        let [from] = select.from.as_slice() else {
            bail!("exactly one source table is required");
        };
        if !from.joins.is_empty() {
            bail!("joins are not supported");
        }
        let ast::TableFactor::Table { name, .. } = &from.relation else {
            bail!("only plain table sources are supported");
        };
        let [table] = name.0.as_slice() else {
            bail!("qualified table names are not supported");
        };

        let predicate = select
            .selection
            .as_ref()
            .map(|expr| expr.try_into())
            .transpose()?;

        Ok(SelectStatement {
            targets,
            table: table.value.clone(),
            predicate,
        })
    }
}

impl TryFrom<&SelectItem> for SelectTarget {
    type Error = Error;

    fn try_from(item: &SelectItem) -> Result<SelectTarget> {
        Ok(match item {
            SelectItem::UnnamedExpr(Expr::Identifier(column)) => {
                SelectTarget::Column(column.value.clone())
            }
            SelectItem::UnnamedExpr(Expr::Function(function)) => {
                let [name] = function.name.0.as_slice() else {
                    bail!("qualified function names are not supported");
                };
                if !name.value.eq_ignore_ascii_case("count") {
                    bail!("{} is not a supported aggregate", name.value);
                }
                SelectTarget::CountRows
            }
            other => bail!("{other} is not a supported select target"),
        })
    }
}

impl TryFrom<&Expr> for Condition {
    type Error = Error;

    fn try_from(expr: &Expr) -> Result<Condition> {
        Ok(match expr {
            Expr::Identifier(column) => Condition::Column(column.value.clone()),
            Expr::Value(value) => Condition::Value(literal(value)?),
            Expr::BinaryOp { left, op, right } => Condition::Binary(
                Box::new(left.as_ref().try_into()?),
                op.try_into()?,
                Box::new(right.as_ref().try_into()?),
            ),
            other => bail!("{other} is not a supported where expression"),
        })
    }
}

fn literal(value: &ast::Value) -> Result<CellValue> {
    Ok(match value {
        ast::Value::Number(digits, _) => CellValue::Int(
            digits
                .parse()
                .with_context(|| format!("only integer literals are supported, got {digits}"))?,
        ),
        ast::Value::SingleQuotedString(text) | ast::Value::DoubleQuotedString(text) => {
            CellValue::String(text.clone())
        }
        ast::Value::Boolean(flag) => CellValue::Int(i64::from(*flag)),
        ast::Value::Null => CellValue::Null,
        other => bail!("{other} is not a supported literal"),
    })
}

impl TryFrom<&BinaryOperator> for BinOp {
    type Error = Error;

    fn try_from(op: &BinaryOperator) -> Result<BinOp> {
        Ok(match op {
            BinaryOperator::Eq => BinOp::Eq,
            BinaryOperator::NotEq => BinOp::NotEq,
            BinaryOperator::And => BinOp::And,
            BinaryOperator::Or => BinOp::Or,
            other => bail!("{other} is not a supported operator"),
        })
    }
}
