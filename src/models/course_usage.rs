use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::UsageKind;

/// An immutable session-ledger row. Entries are append-only: corrections
/// are new `Adjust` rows, never edits. The running sum of `session_delta`
/// per course equals the course's `used_sessions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseUsageEntry {
    pub id: Uuid,
    pub course_id: Uuid,
    pub case_id: Option<Uuid>,
    pub bill_id: Option<Uuid>,
    pub kind: UsageKind,
    /// Signed delta applied to `used_sessions`: +1 for a use, -1 for a
    /// return, explicit sign for adjustments.
    pub session_delta: i64,
    pub usage_date: NaiveDate,
    pub note: Option<String>,
    pub created_by: Uuid,
    pub created_at: String,
}
