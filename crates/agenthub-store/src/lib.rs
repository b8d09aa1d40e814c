//! Embedded store for the agenthub backbone.
//!
//! One SQLite database holds the whole entity graph; access goes through a
//! bounded connection pool ([`Database`]) and per-entity query modules
//! ([`queries`]). The store also owns the wake channel ([`Notifier`]): the
//! API publishes one envelope per committed mutation and the notification
//! bridge consumes them.

mod blob;
mod db;
mod error;
pub mod records;
pub mod schema;
mod wake;

pub mod queries;

pub use blob::{compress, decompress};
pub use db::Database;
pub use error::{Error, Result};
pub use wake::Notifier;
