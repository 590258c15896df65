//! Repository layer — entity-scoped database operations.
//!
//! Free functions over `&Connection`, one sub-module per entity. Engine
//! modules call these inside their own transactions; nothing here opens
//! a transaction of its own.

mod appointment;
mod case;
mod clinic;
mod clinician;
mod course;
mod course_usage;
mod patient;

pub use appointment::*;
pub use case::*;
pub use clinic::*;
pub use clinician::*;
pub use course::*;
pub use course_usage::*;
pub use patient::*;

use chrono::{NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use super::DatabaseError;

/// Timestamp format used for all created_at/updated_at columns.
pub(crate) fn now_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

pub(crate) fn parse_opt_uuid(s: Option<String>) -> Result<Option<Uuid>, DatabaseError> {
    s.as_deref().map(parse_uuid).transpose()
}

pub(crate) fn parse_date(s: &str) -> Result<NaiveDate, DatabaseError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

/// Times are stored as fixed-width "HH:MM" so lexicographic SQL
/// comparison matches chronological order.
pub(crate) fn parse_time(s: &str) -> Result<NaiveTime, DatabaseError> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

pub(crate) fn time_str(t: NaiveTime) -> String {
    t.format("%H:%M").to_string()
}
