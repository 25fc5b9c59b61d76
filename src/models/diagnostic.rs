use serde::{Deserialize, Serialize};

/// Signals confirmed by a full enrichment of one business.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerifiedSignals {
    pub has_website: bool,
    pub ssl: bool,
    pub has_contact_form: bool,
    pub has_phone: bool,
    pub has_viewport: bool,
    pub has_schema: bool,
    pub rating: Option<f64>,
    pub user_ratings_total: u32,
    /// Services checked for which no dedicated page was found.
    #[serde(default)]
    pub missing_services: Vec<String>,
}

/// Caller-facing result of the diagnostic builder for one business.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub place_id: Option<String>,
    pub business_name: String,
    pub city: String,
    pub state: Option<String>,
    pub website: Option<String>,
    pub constraint: String,
    pub primary_leverage: String,
    pub opportunity_profile: String,
    pub signals: VerifiedSignals,
    /// Opaque brief payload produced by the builder.
    #[serde(default)]
    pub brief: serde_json::Value,
}

/// Business to diagnose, as known to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticTarget {
    pub place_id: Option<String>,
    pub business_name: String,
    pub city: String,
    pub state: Option<String>,
    pub website: Option<String>,
    /// Services whose dedicated pages should be verified.
    #[serde(default)]
    pub services: Vec<String>,
}
