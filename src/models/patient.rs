use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    /// Hospital-number style code, e.g. `HN000042`.
    pub code: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub home_clinic: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPatient {
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub home_clinic: Option<String>,
}
