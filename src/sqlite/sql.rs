pub mod sql_engine;
