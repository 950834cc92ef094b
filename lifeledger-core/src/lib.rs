//! # lifeledger-core
//!
//! Core library for lifeledger - a personal tracker for tasks, moods and
//! spending, with streaks, trends and achievements computed on top.
//!
//! This library provides:
//! - Domain types for tasks, mood entries and transactions
//! - An event store with pluggable persistence (SQLite or in-memory)
//! - Pure analytics: streaks, time buckets, trends, achievements
//! - Dashboard view-models, optionally kept live via store subscriptions
//! - JSON snapshot export and import
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! Data flows in one direction:
//! - **Records:** mutated only through [`EventStore`], persisted through a [`Backend`]
//! - **Analytics:** pure functions over record snapshots ([`analytics`])
//! - **Views:** plain data ([`analytics::Dashboard`]) for the presentation layer
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lifeledger_core::{Config, Database, EventStore, StaticIdentity};
//!
//! let config = Config::load().expect("failed to load config");
//!
//! let db = Database::open(&config.resolved_database_path()).expect("failed to open database");
//! db.migrate().expect("failed to run migrations");
//!
//! let store = EventStore::open(Arc::new(db), Arc::new(StaticIdentity::guest()));
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
pub use store::{Backend, EventStore, IdentityProvider, MemoryBackend, StaticIdentity};
pub use types::*;

// Public modules
pub mod analytics;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod snapshot;
pub mod store;
pub mod types;
