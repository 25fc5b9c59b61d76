use serde::{Deserialize, Serialize};

use crate::models::criteria::LightweightCheck;

/// A WGS84 coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// One probe location of the coverage grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridPoint {
    pub lat: f64,
    pub lng: f64,
    pub radius_m: u32,
}

/// A nearby-search hit, before any detail lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceSummary {
    pub place_id: String,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub location: Option<LatLng>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub user_ratings_total: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddressComponent {
    pub long_name: String,
    #[serde(default)]
    pub short_name: String,
    #[serde(default)]
    pub types: Vec<String>,
}

/// Detail lookup payload for one place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaceDetails {
    pub place_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub formatted_address: Option<String>,
    #[serde(default)]
    pub address_components: Vec<AddressComponent>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub user_ratings_total: Option<u32>,
}

impl PlaceDetails {
    /// City (locality) and state (admin level 1 short name) from the address
    /// components, falling back to the searched area.
    pub fn city_state(&self, fallback_city: &str, fallback_state: Option<&str>) -> (String, Option<String>) {
        let mut city = fallback_city.to_string();
        let mut state = fallback_state.map(str::to_string);

        for comp in &self.address_components {
            if comp.types.iter().any(|t| t == "locality") && !comp.long_name.is_empty() {
                city = comp.long_name.clone();
            } else if comp.types.iter().any(|t| t == "administrative_area_level_1") {
                let name = if comp.short_name.is_empty() {
                    &comp.long_name
                } else {
                    &comp.short_name
                };
                if !name.is_empty() {
                    state = Some(name.clone());
                }
            }
        }

        (city, state)
    }
}

/// Signals derived from a lightweight homepage fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebsiteSignals {
    pub ssl: bool,
    pub has_contact_form: bool,
    pub has_phone: bool,
    pub has_viewport: bool,
    pub has_schema: bool,
    #[serde(default)]
    pub email: Option<String>,
}

/// A scored prospect surfaced by a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub place_id: String,
    pub business_name: String,
    pub city: String,
    pub state: Option<String>,
    pub website: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub rating: Option<f64>,
    pub user_ratings_total: u32,
    pub has_website: bool,
    pub ssl: bool,
    pub has_contact_form: bool,
    pub has_phone: bool,
    pub has_viewport: bool,
    pub has_schema: bool,
    pub below_review_avg: bool,
    pub below_rating_avg: bool,
    pub rank_key: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lightweight_checks: Vec<LightweightCheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<serde_json::Value>,
}

impl Candidate {
    /// Build an unscored candidate from detail data. Search-hit values fill in
    /// for fields the detail lookup did not return.
    pub fn from_details(
        summary: &PlaceSummary,
        details: &PlaceDetails,
        fallback_city: &str,
        fallback_state: Option<&str>,
    ) -> Self {
        let (city, state) = details.city_state(fallback_city, fallback_state);
        let website = details
            .website
            .as_deref()
            .and_then(crate::services::website::normalize_url);
        let phone = details
            .phone
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string);

        Self {
            place_id: summary.place_id.clone(),
            business_name: details
                .name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| summary.name.clone()),
            city,
            state,
            has_website: website.is_some(),
            has_phone: phone.is_some(),
            website,
            phone,
            email: None,
            rating: details.rating.or(summary.rating),
            user_ratings_total: details
                .user_ratings_total
                .or(summary.user_ratings_total)
                .unwrap_or(0),
            ssl: false,
            has_contact_form: false,
            has_viewport: false,
            has_schema: false,
            below_review_avg: false,
            below_rating_avg: false,
            rank_key: 0.0,
            rank: None,
            lightweight_checks: Vec::new(),
            diagnostic: None,
        }
    }

    /// Merge homepage signals. A phone already known from the detail lookup
    /// is kept.
    pub fn apply_signals(&mut self, signals: &WebsiteSignals) {
        self.ssl = signals.ssl;
        self.has_contact_form = signals.has_contact_form;
        self.has_phone = self.has_phone || signals.has_phone;
        self.has_viewport = signals.has_viewport;
        self.has_schema = signals.has_schema;
        self.email = signals.email.clone();
    }
}

/// Market-level averages over the scored candidates of one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketStats {
    pub avg_reviews: f64,
    pub avg_rating: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(long: &str, short: &str, kind: &str) -> AddressComponent {
        AddressComponent {
            long_name: long.to_string(),
            short_name: short.to_string(),
            types: vec![kind.to_string(), "political".to_string()],
        }
    }

    #[test]
    fn test_city_state_from_components() {
        let details = PlaceDetails {
            place_id: "p1".to_string(),
            address_components: vec![
                component("Saint Paul", "Saint Paul", "locality"),
                component("Minnesota", "MN", "administrative_area_level_1"),
            ],
            ..Default::default()
        };

        let (city, state) = details.city_state("Minneapolis", None);
        assert_eq!(city, "Saint Paul");
        assert_eq!(state.as_deref(), Some("MN"));
    }

    #[test]
    fn test_city_state_fallback() {
        let details = PlaceDetails::default();
        let (city, state) = details.city_state("Minneapolis", Some("MN"));
        assert_eq!(city, "Minneapolis");
        assert_eq!(state.as_deref(), Some("MN"));
    }

    #[test]
    fn test_from_details_prefers_detail_values() {
        let summary = PlaceSummary {
            place_id: "p1".to_string(),
            name: "Search Name".to_string(),
            address: None,
            location: None,
            rating: Some(3.9),
            user_ratings_total: Some(12),
        };
        let details = PlaceDetails {
            place_id: "p1".to_string(),
            name: Some("Detail Name".to_string()),
            website: Some("Example.com/path/?utm_source=x".to_string()),
            phone: Some("  ".to_string()),
            user_ratings_total: Some(40),
            ..Default::default()
        };

        let c = Candidate::from_details(&summary, &details, "Austin", Some("TX"));
        assert_eq!(c.business_name, "Detail Name");
        assert_eq!(c.website.as_deref(), Some("https://example.com/path"));
        assert!(c.has_website);
        assert!(!c.has_phone);
        assert_eq!(c.rating, Some(3.9));
        assert_eq!(c.user_ratings_total, 40);
    }
}
