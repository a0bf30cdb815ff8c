//! Kinds managed over a MySQL backend.

pub mod database;

pub use database::{Database, DatabaseSpec};
