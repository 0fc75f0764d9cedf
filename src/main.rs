use anyhow::{bail, Context, Result};
use prettytable::{row, Table};
use tracing_subscriber::EnvFilter;

use crate::sqlite::schema::SqliteSchema;

pub mod sqlite;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = std::env::args().collect::<Vec<_>>();
    match args.len() {
        0 | 1 => bail!("Missing <database path> and <command>"),
        2 => bail!("Missing <command>"),
        _ => {}
    }

    let command = &args[2];
    let conn = sqlite::open(&args[1])?;
    match command.as_str() {
        ".dbinfo" => {
            println!("database page size: {}", conn.header().page_size);
            println!("number of tables: {}", conn.schema_entry_count());
        }
        ".tables" => {
            println!("{}", conn.user_table_names().join(" "));
        }
        ".schema" => {
            let mut table = Table::new();
            table.add_row(row!["Id", "Kind", "Name", "Root Page", "Columns"]);
            for schema in conn.get_schema() {
                table.add_row(row![
                    schema.row_id(),
                    schema.kind(),
                    schema.name(),
                    schema.root_page(),
                    schema.column_summary(),
                ]);
            }
            table.printstd();
        }
        ".btree" => {
            let name = args.get(3).context("Missing <table or index name>")?;
            let schema = conn
                .get_schema()
                .iter()
                .find(|s| s.name() == name.as_str())
                .cloned()
                .with_context(|| format!("no table or index named {name}"))?;
            match schema.as_ref() {
                SqliteSchema::Table(t) => {
                    conn.get_tree(t.name.as_ref())?.pretty_print(conn.database())?
                }
                SqliteSchema::Index(_) => sqlite::index_btree::IndexBTree::new(schema.clone())?
                    .pretty_print(conn.database())?,
            }
        }
        query => {
            for line in conn.execute_query(query)? {
                println!("{line}");
            }
        }
    }

    Ok(())
}
