use serde::{Deserialize, Serialize};

/// A branch clinic, keyed by its short code (`CL001`, `CL002`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clinic {
    pub code: String,
    pub name: String,
    pub created_at: String,
}
