//! Synchronization engine: case state machine, course session ledger,
//! appointment bridge, and status-history audit trail.
//!
//! Every public entry point here executes as one SQLite transaction:
//! status update, ledger entries, audit entry, and cross-entity
//! propagation commit or roll back together.

pub mod audit;
pub mod bridge;
pub mod ledger;
pub mod state_machine;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::{AppointmentStatus, CaseStatus};

// ─── Actor ────────────────────────────────────────────────────────────────────

/// Role of the acting user, as resolved by the caller. The engine trusts
/// this resolution; reversals and manual ledger adjustments require
/// `Privileged`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActorRole {
    Ordinary,
    Privileged,
}

impl ActorRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ordinary => "ordinary",
            Self::Privileged => "privileged",
        }
    }
}

/// The authenticated user behind a mutating call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub name: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(id: Uuid, name: impl Into<String>, role: ActorRole) -> Self {
        Self {
            id,
            name: name.into(),
            role,
        }
    }

    pub fn is_privileged(&self) -> bool {
        self.role == ActorRole::Privileged
    }
}

// ─── System reasons ───────────────────────────────────────────────────────────

/// History reasons written for automatic propagations, so every hop in a
/// bridge-driven flow is still explained in the audit trail.
pub const REASON_CANCELLED_FROM_APPOINTMENT: &str = "Cancelled from appointment";
pub const REASON_CANCELLED_FROM_CASE: &str = "Cancelled from case";
pub const REASON_ACCEPTED_FROM_APPOINTMENT: &str = "Accepted from appointment completion";
pub const REASON_COMPLETED_FROM_APPOINTMENT: &str = "Completed from appointment";

// ─── Errors ───────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid case transition: {from} -> {to}")]
    InvalidTransition { from: CaseStatus, to: CaseStatus },

    #[error("Invalid appointment transition: {from} -> {to}")]
    InvalidAppointmentTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Assessment incomplete: missing {missing}")]
    IncompleteAssessment { missing: String },

    #[error("SOAP note incomplete: missing {missing}")]
    IncompleteSoap { missing: String },

    #[error("A reason is required for this transition")]
    MissingReason,

    #[error("Privileged role required for {action}")]
    Forbidden { action: String },

    #[error("Course {course_id} has insufficient sessions: {remaining} remaining")]
    InsufficientSessions { course_id: Uuid, remaining: u32 },

    #[error("Return would drive used sessions below zero for course {course_id}")]
    OverReturn { course_id: Uuid },

    #[error("Invalid schedule: {0}")]
    ScheduleInvalid(String),

    #[error("Linkage inconsistency: {0}")]
    LinkageInconsistency(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(DatabaseError::Sqlite(e))
    }
}
