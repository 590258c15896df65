use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::CourseStatus;

/// A pre-paid bundle of treatment sessions owned by one patient at one
/// clinic. Counters obey `total = used + remaining` at all times; the
/// counters move only through the session ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub clinic: String,
    pub name: String,
    pub total_sessions: u32,
    pub used_sessions: u32,
    pub remaining_sessions: u32,
    pub price: f64,
    pub paid_amount: f64,
    pub purchase_date: NaiveDate,
    pub expiry_date: Option<NaiveDate>,
    pub status: CourseStatus,
    pub created_by: Uuid,
    pub created_at: String,
}

/// Input for a course purchase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCourse {
    pub patient_id: Uuid,
    pub clinic: String,
    pub name: String,
    pub total_sessions: u32,
    pub price: f64,
    pub paid_amount: f64,
    pub purchase_date: NaiveDate,
    pub expiry_date: Option<NaiveDate>,
}
