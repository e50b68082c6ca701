//! Database module for pgtrail.
//!
//! Provides SQLite storage for the server roster, the connection timeline
//! and operator settings.

mod models;
mod store;

pub use models::*;
pub use store::*;
