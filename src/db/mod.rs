//! SQLite persistence for the lot ledger.
//!
//! This module provides:
//! - Database initialization, pragmas and versioned migrations
//! - `Repository`, the `LotRepository` implementation over sqlx

pub mod migrations;
pub mod repo;

pub use migrations::init_db;
pub use repo::Repository;
