//! Database layer for lifeledger
//!
//! This module provides the SQLite persistence backend:
//! - Schema migrations
//! - Key-value storage of collection snapshots

pub mod repo;
pub mod schema;

pub use repo::Database;
