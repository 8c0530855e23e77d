//! Taskwell daemon library - exposes modules for testing.

pub mod error;
pub mod extract;
pub mod routes;
pub mod server;
