//! SQLite backend for the payment reconciliation engine.
//!
//! The schema lives in `migrations/` and is embedded with `sqlx::migrate!`.
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
