//! SQLite persistence for the cache store.
//!
//! This module provides:
//! - Database initialization and migrations
//! - SQLite pragma configuration
//! - Repository for reading and writing persisted cache entries

pub mod migrations;
pub mod repo;

pub use migrations::init_db;
pub use repo::{PersistedEntry, Repository, StoreError};
