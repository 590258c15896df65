use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::CaseStatus;

/// Audit record for one case status change. Written on every transition,
/// never mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub id: Uuid,
    pub case_id: Uuid,
    pub old_status: CaseStatus,
    pub new_status: CaseStatus,
    pub actor_id: Uuid,
    pub reason: String,
    pub is_reversal: bool,
    pub created_at: String,
}
