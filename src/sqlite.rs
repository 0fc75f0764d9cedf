use anyhow::Result;
use connection::Connection;

pub mod btree;
pub mod column;
pub mod connection;
pub mod database;
pub mod error;
pub mod index_btree;
pub mod page;
pub mod record;
pub mod schema;
pub mod sql;
pub mod varint;

#[cfg(test)]
mod tests;

/// Open a database file read-only and bootstrap its schema catalog.
pub fn open(file_path: impl Into<String>) -> Result<Connection> {
    Connection::new(file_path)
}
