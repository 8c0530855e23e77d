//! Taskwell Common - Shared types, storage, and the update lifecycle.
//!
//! Everything the daemon needs that is not HTTP: domain models, the SQLite
//! store, the update state machine, audit logging, token handling, config.

pub mod audit;
pub mod auth;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod store;

pub use error::{Error, Result};
pub use models::*;
pub use store::Store;
