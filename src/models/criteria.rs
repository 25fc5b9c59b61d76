use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// A caller-supplied predicate over scored candidates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Criterion {
    BelowReviewAvg,
    HasWebsite,
    NoWebsite,
    HighLeverageProxy,
    /// Needs a live homepage check: matches when no dedicated page for the
    /// service is detected.
    MissingServicePageLight { service: String },
}

impl Criterion {
    pub fn needs_lightweight_check(&self) -> bool {
        matches!(self, Criterion::MissingServicePageLight { .. })
    }

    /// Stable key used for the lightweight-check cache.
    pub fn cache_key(&self) -> String {
        match self {
            Criterion::BelowReviewAvg => "below_review_avg".to_string(),
            Criterion::HasWebsite => "has_website".to_string(),
            Criterion::NoWebsite => "no_website".to_string(),
            Criterion::HighLeverageProxy => "high_leverage_proxy".to_string(),
            Criterion::MissingServicePageLight { service } => format!(
                "missing_service_page_light:{}",
                service.trim().to_lowercase().replace(' ', "_")
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AccuracyMode {
    Fast,
    #[default]
    Verified,
}

/// Structured form of a natural-language prospect query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchIntent {
    pub query: String,
    pub city: String,
    pub state: Option<String>,
    pub vertical: String,
    pub limit: u32,
    #[serde(default)]
    pub criteria: Vec<Criterion>,
    #[serde(default)]
    pub requires_lightweight: bool,
}

/// Outcome of one lightweight homepage check for one criterion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightweightCheck {
    pub criterion_key: String,
    pub service: String,
    /// For "missing service page" criteria, `true` means the page is likely missing.
    pub matches: bool,
    pub reason: String,
    pub service_mentioned: bool,
    pub dedicated_page_detected: bool,
}
