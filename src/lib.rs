//! Physiodesk — practice-management core for a multi-clinic
//! physiotherapy network.
//!
//! The interesting part is the synchronization engine under [`engine`]:
//! a case state machine, a course session ledger, and an appointment
//! bridge that keep three independently-editable records consistent
//! through one-transaction units of work. The rest is registry CRUD
//! over SQLite.

pub mod config;
pub mod db;
pub mod engine;
pub mod models;

use tracing_subscriber::EnvFilter;

pub use db::DatabaseError;
pub use engine::EngineError;

/// Initialize tracing for embedding binaries. Honors RUST_LOG, falling
/// back to the crate-level default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();
}
