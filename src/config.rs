use serde::{Deserialize, Serialize};

/// Application-level constants
pub const APP_NAME: &str = "Physiodesk";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default tracing filter when RUST_LOG is unset
pub fn default_log_filter() -> String {
    "physiodesk=info".to_string()
}

/// Clinic whose incoming referrals skip the assessment requirement.
pub const DEFAULT_NO_ASSESSMENT_CLINIC: &str = "CL001";

/// Tunables for the synchronization engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Cross-clinic referrals into this clinic are accepted without a
    /// clinical assessment payload.
    pub no_assessment_clinic: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            no_assessment_clinic: DEFAULT_NO_ASSESSMENT_CLINIC.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.4.0");
    }

    #[test]
    fn default_config_names_hq() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.no_assessment_clinic, "CL001");
    }
}
