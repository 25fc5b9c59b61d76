use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use crate::models::candidate::PlaceDetails;
use crate::models::diagnostic::{Diagnostic, DiagnosticTarget, VerifiedSignals};
use crate::services::fetcher::{FetchError, RateLimitedFetcher};
use crate::services::places::{SearchQuery, MAX_SEARCH_RADIUS_M};
use crate::services::website::{self, WebsiteProbe};

/// Review count under which reputation is treated as the bottleneck.
const REVIEW_FLOOR: u32 = 50;

#[derive(Debug, thiserror::Error)]
pub enum DiagnosticError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("could not resolve business '{0}'")]
    NotResolved(String),
}

/// Turns one business into a caller-facing diagnostic.
#[async_trait]
pub trait DiagnosticBuilder: Send + Sync {
    async fn build(&self, target: &DiagnosticTarget) -> Result<Diagnostic, DiagnosticError>;
}

/// Builds diagnostics from fresh detail data and homepage signals.
pub struct SignalDiagnosticBuilder {
    fetcher: Arc<RateLimitedFetcher>,
    probe: Arc<dyn WebsiteProbe>,
}

impl SignalDiagnosticBuilder {
    pub fn new(fetcher: Arc<RateLimitedFetcher>, probe: Arc<dyn WebsiteProbe>) -> Self {
        Self { fetcher, probe }
    }

    async fn resolve(&self, target: &DiagnosticTarget) -> Result<Option<PlaceDetails>, DiagnosticError> {
        if let Some(place_id) = target.place_id.as_deref().filter(|p| !p.is_empty()) {
            return Ok(Some(self.fetcher.place_details(place_id).await?));
        }

        let Some(center) = self
            .fetcher
            .geocode(&target.city, target.state.as_deref())
            .await?
        else {
            return Ok(None);
        };
        let query = SearchQuery {
            location: center,
            radius_m: MAX_SEARCH_RADIUS_M,
            keyword: target.business_name.trim().to_string(),
        };
        let page = self.fetcher.fetch_page(&query, None).await?;
        match page.results.first() {
            Some(hit) => Ok(Some(self.fetcher.place_details(&hit.place_id).await?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl DiagnosticBuilder for SignalDiagnosticBuilder {
    async fn build(&self, target: &DiagnosticTarget) -> Result<Diagnostic, DiagnosticError> {
        let details = self.resolve(target).await?;
        if details.is_none() && target.website.is_none() {
            return Err(DiagnosticError::NotResolved(target.business_name.clone()));
        }

        let website = details
            .as_ref()
            .and_then(|d| d.website.as_deref())
            .or(target.website.as_deref())
            .and_then(website::normalize_url);

        let mut signals = VerifiedSignals {
            has_website: website.is_some(),
            has_phone: details.as_ref().is_some_and(|d| d.phone.is_some()),
            rating: details.as_ref().and_then(|d| d.rating),
            user_ratings_total: details
                .as_ref()
                .and_then(|d| d.user_ratings_total)
                .unwrap_or(0),
            ..Default::default()
        };

        if let Some(url) = website.as_deref() {
            match self.probe.fetch_homepage(url).await {
                Ok(page) => {
                    let s = website::analyze_html(&page);
                    signals.ssl = s.ssl;
                    signals.has_contact_form = s.has_contact_form;
                    signals.has_phone = signals.has_phone || s.has_phone;
                    signals.has_viewport = s.has_viewport;
                    signals.has_schema = s.has_schema;

                    for service in &target.services {
                        let check = website::check_service_page(&page, service, service);
                        if !check.dedicated_page_detected {
                            signals.missing_services.push(check.service);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(business = %target.business_name, url, error = %e, "Homepage probe failed");
                }
            }
        }

        let (city, state) = match &details {
            Some(d) => d.city_state(&target.city, target.state.as_deref()),
            None => (target.city.clone(), target.state.clone()),
        };
        let business_name = details
            .as_ref()
            .and_then(|d| d.name.clone())
            .unwrap_or_else(|| target.business_name.clone());

        let constraint = constraint_label(&signals);
        let primary_leverage = leverage_label(&signals);
        let gaps = gap_list(&signals);
        let opportunity_profile = profile_label(gaps.len());

        Ok(Diagnostic {
            place_id: details.as_ref().map(|d| d.place_id.clone()).or(target.place_id.clone()),
            business_name,
            city,
            state,
            website,
            constraint: constraint.to_string(),
            primary_leverage: primary_leverage.to_string(),
            opportunity_profile: opportunity_profile.to_string(),
            brief: json!({
                "executive_diagnosis": {
                    "constraint": constraint,
                    "primary_leverage": primary_leverage,
                    "modeled_revenue_upside": opportunity_profile,
                },
                "gaps": gaps,
            }),
            signals,
        })
    }
}

fn constraint_label(s: &VerifiedSignals) -> &'static str {
    if !s.has_website {
        "visibility"
    } else if s.user_ratings_total < REVIEW_FLOOR {
        "reputation"
    } else if !s.has_contact_form || !s.has_phone {
        "conversion"
    } else if !s.ssl || !s.has_schema {
        "trust"
    } else {
        "capacity"
    }
}

fn leverage_label(s: &VerifiedSignals) -> &'static str {
    if !s.has_website {
        "launch_website"
    } else if !s.missing_services.is_empty() {
        "service_pages"
    } else if s.user_ratings_total < REVIEW_FLOOR {
        "review_generation"
    } else if !s.has_contact_form {
        "contact_path"
    } else if !s.has_schema {
        "structured_data"
    } else {
        "paid_acquisition"
    }
}

fn gap_list(s: &VerifiedSignals) -> Vec<&'static str> {
    let mut gaps = Vec::new();
    if !s.has_website {
        gaps.push("no_website");
    } else {
        if !s.ssl {
            gaps.push("no_ssl");
        }
        if !s.has_contact_form {
            gaps.push("no_contact_path");
        }
        if !s.has_viewport {
            gaps.push("not_mobile_ready");
        }
        if !s.has_schema {
            gaps.push("no_structured_data");
        }
        if !s.missing_services.is_empty() {
            gaps.push("missing_service_pages");
        }
    }
    if !s.has_phone {
        gaps.push("no_phone");
    }
    if s.user_ratings_total < REVIEW_FLOOR {
        gaps.push("low_review_volume");
    }
    gaps
}

fn profile_label(gap_count: usize) -> &'static str {
    match gap_count {
        0..=1 => "optimized",
        2..=3 => "moderate",
        _ => "high_leverage",
    }
}
