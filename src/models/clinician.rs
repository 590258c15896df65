use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clinician {
    pub id: Uuid,
    pub name: String,
    pub clinic: String,
    pub specialty: Option<String>,
    pub created_at: String,
}
