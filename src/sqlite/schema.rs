use itertools::Itertools;

use self::{index_schema::IndexSchema, table_schema::TableSchema};

pub mod index_schema;
pub mod table_schema;

#[derive(Debug)]
pub enum SqliteSchema {
    Table(TableSchema),
    Index(IndexSchema),
}

impl SqliteSchema {
    pub fn row_id(&self) -> i64 {
        match self {
            SqliteSchema::Table(t) => t.row_id,
            SqliteSchema::Index(i) => i.row_id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            SqliteSchema::Table(t) => &t.name,
            SqliteSchema::Index(i) => &i.name,
        }
    }

    pub fn table_name(&self) -> &str {
        match self {
            SqliteSchema::Table(t) => &t.table_name,
            SqliteSchema::Index(i) => &i.table_name,
        }
    }

    pub fn root_page(&self) -> u32 {
        match self {
            SqliteSchema::Table(t) => t.root_page,
            SqliteSchema::Index(i) => i.root_page,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SqliteSchema::Table(_) => "table",
            SqliteSchema::Index(_) => "index",
        }
    }

    pub fn column_summary(&self) -> String {
        match self {
            SqliteSchema::Table(t) => t
                .columns
                .iter()
                .map(|c| format!("{} ({})", c.name, c.type_affinity))
                .join(", "),
            SqliteSchema::Index(i) => i.columns.iter().map(|c| c.as_ref()).join(", "),
        }
    }
}

/// Prepare stored DDL for re-parsing: drop the tokens sqlparser chokes on
/// and the double-quote identifier quoting.
pub(crate) fn normalize_ddl(sql: &str) -> String {
    let unquoted = sql.replace('"', "");
    strip_keyword(&strip_keyword(&unquoted, "autoincrement"), "range")
}

/// Remove case-insensitive whole-word occurrences of an ASCII keyword.
fn strip_keyword(sql: &str, keyword: &str) -> String {
    let lower = sql.to_ascii_lowercase();
    let mut out = String::with_capacity(sql.len());
    let mut from = 0;
    while let Some(found) = lower[from..].find(keyword) {
        let start = from + found;
        let end = start + keyword.len();
        let word_char = |b: u8| b.is_ascii_alphanumeric() || b == b'_';
        let bounded_left = start == 0 || !word_char(lower.as_bytes()[start - 1]);
        let bounded_right = end == lower.len() || !word_char(lower.as_bytes()[end]);
        out.push_str(&sql[from..start]);
        if !(bounded_left && bounded_right) {
            out.push_str(&sql[start..end]);
        }
        from = end;
    }
    out.push_str(&sql[from..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_strips_quotes_and_keywords() {
        let sql = r#"CREATE TABLE "apples" (id integer primary key AUTOINCREMENT, name text)"#;
        let normalized = normalize_ddl(sql);
        assert!(!normalized.contains('"'));
        assert!(!normalized.to_lowercase().contains("autoincrement"));
        assert!(normalized.contains("primary key"));
    }

    #[test]
    fn keyword_stripping_respects_word_boundaries() {
        assert_eq!(strip_keyword("orange range", "range"), "orange ");
        assert_eq!(strip_keyword("ranger", "range"), "ranger");
    }
}
