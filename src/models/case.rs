use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::CaseStatus;

/// A referral/treatment episode ("PN case"), tracked from intake to
/// discharge independently of any single appointment.
///
/// A case is never physically deleted: cancellation is a terminal status.
/// `appointment_id` is a soft link; deleting the appointment nulls it
/// rather than cascading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    pub id: Uuid,
    /// Human-readable code, e.g. `PN202608-0012`.
    pub code: String,
    pub patient_id: Uuid,
    pub purpose: String,
    pub status: CaseStatus,
    /// Clinic code the referral originates from.
    pub source_clinic: String,
    /// Clinic code treating the case.
    pub target_clinic: String,
    pub course_id: Option<Uuid>,
    pub appointment_id: Option<Uuid>,
    pub assessment: Option<Assessment>,
    pub soap_note: Option<SoapNote>,
    /// True only while the case sits in ACCEPTED after a completion
    /// was reversed.
    pub is_reversed: bool,
    pub last_reversal_reason: Option<String>,
    pub last_reversal_at: Option<String>,
    pub created_by: Uuid,
    pub created_at: String,
    pub updated_at: String,
}

/// Clinical assessment captured at acceptance for cross-clinic referrals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assessment {
    pub diagnosis: String,
    pub chief_complaint: String,
    pub present_history: String,
    /// 0–10 numeric rating scale.
    pub pain_score: u8,
}

/// Structured completion note (Subjective/Objective/Assessment/Plan).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoapNote {
    pub subjective: String,
    pub objective: String,
    pub assessment: String,
    pub plan: String,
}

/// Input for creating a case (manual referral or bridge auto-creation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCase {
    pub patient_id: Uuid,
    pub purpose: String,
    pub source_clinic: String,
    pub target_clinic: String,
    pub course_id: Option<Uuid>,
}
