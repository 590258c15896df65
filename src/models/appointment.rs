use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::AppointmentStatus;

/// A scheduled slot for a patient (or anonymous walk-in) with a clinician
/// at a clinic. Optionally linked to a case and a course; the case link is
/// bidirectional by reference, not containment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    /// None for anonymous walk-ins (see `walk_in_name`).
    pub patient_id: Option<Uuid>,
    pub walk_in_name: Option<String>,
    pub clinician_id: Uuid,
    pub clinic: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub status: AppointmentStatus,
    pub case_id: Option<Uuid>,
    pub course_id: Option<Uuid>,
    /// True when the bridge auto-created the linked PN case at booking.
    pub auto_created_pn: bool,
    pub note: Option<String>,
    pub cancel_reason: Option<String>,
    pub cancelled_by: Option<Uuid>,
    pub cancelled_at: Option<String>,
    pub created_by: Uuid,
    pub created_at: String,
    pub updated_at: String,
}
