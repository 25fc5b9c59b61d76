//! Search provider seam and the Google Places client behind it.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use crate::models::candidate::{AddressComponent, LatLng, PlaceDetails, PlaceSummary};

/// Largest radius the Nearby Search API accepts.
pub const MAX_SEARCH_RADIUS_M: u32 = 50_000;

const DETAIL_FIELDS: &str = "place_id,name,formatted_address,address_components,website,\
international_phone_number,formatted_phone_number,rating,user_ratings_total";

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider throttled the request")]
    Throttled,

    #[error("provider request timed out")]
    Timeout,

    #[error("provider transport error: {0}")]
    Transport(String),

    #[error("provider denied the request: {0}")]
    Denied(String),

    #[error("malformed provider request: {0}")]
    Malformed(String),

    #[error("place not found")]
    NotFound,

    #[error("unexpected provider response: {0}")]
    Unexpected(String),
}

impl ProviderError {
    pub fn is_throttle(&self) -> bool {
        matches!(self, ProviderError::Throttled)
    }

    /// Errors worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Throttled | ProviderError::Timeout | ProviderError::Transport(_)
        )
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else if e.is_decode() {
            ProviderError::Unexpected(e.to_string())
        } else {
            ProviderError::Transport(e.to_string())
        }
    }
}

/// One area + keyword search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub location: LatLng,
    pub radius_m: u32,
    pub keyword: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    pub results: Vec<PlaceSummary>,
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// One page of results. With a cursor, the query's location is ignored
    /// by the provider.
    async fn nearby_search(
        &self,
        query: &SearchQuery,
        cursor: Option<&str>,
    ) -> Result<SearchPage, ProviderError>;

    async fn place_details(&self, place_id: &str) -> Result<PlaceDetails, ProviderError>;

    /// Coordinates for a city. `Ok(None)` when the provider has no match.
    async fn geocode(&self, city: &str, state: Option<&str>) -> Result<Option<LatLng>, ProviderError>;
}

/// Search keyword variants for a vertical.
pub fn keywords_for_vertical(vertical: &str) -> Vec<String> {
    let v = vertical.trim().to_lowercase();
    let list: &[&str] = match v.as_str() {
        "hvac" => &[
            "HVAC",
            "heating and cooling",
            "air conditioning contractor",
            "furnace repair",
            "AC repair",
            "HVAC contractor",
        ],
        "plumber" => &[
            "plumber",
            "plumbing contractor",
            "plumbing service",
            "emergency plumber",
            "drain cleaning",
        ],
        "electrician" => &[
            "electrician",
            "electrical contractor",
            "electrical service",
            "electrical repair",
        ],
        "roofing" => &["roofing contractor", "roof repair", "roofing company", "roofer"],
        "landscaping" => &[
            "landscaping",
            "lawn care",
            "landscaper",
            "lawn service",
            "garden maintenance",
        ],
        "cleaning" => &[
            "cleaning service",
            "house cleaning",
            "janitorial service",
            "commercial cleaning",
            "maid service",
        ],
        _ => return vec![vertical.trim().to_string()],
    };
    list.iter().map(|k| k.to_string()).collect()
}

/// Map a Places API `status` string onto the error taxonomy.
pub fn check_status(status: &str, message: Option<&str>) -> Result<(), ProviderError> {
    let msg = || message.unwrap_or("no error message").to_string();
    match status {
        "OK" | "ZERO_RESULTS" => Ok(()),
        "OVER_QUERY_LIMIT" => Err(ProviderError::Throttled),
        "REQUEST_DENIED" => Err(ProviderError::Denied(msg())),
        "INVALID_REQUEST" => Err(ProviderError::Malformed(msg())),
        "NOT_FOUND" => Err(ProviderError::NotFound),
        other => Err(ProviderError::Unexpected(format!("status {other}: {}", msg()))),
    }
}

// ── Wire types ───────────────────────────────────────────────────────

#[derive(Deserialize)]
struct WireLatLng {
    lat: f64,
    lng: f64,
}

#[derive(Deserialize)]
struct WireGeometry {
    location: WireLatLng,
}

#[derive(Deserialize)]
struct WirePlace {
    place_id: Option<String>,
    name: Option<String>,
    vicinity: Option<String>,
    formatted_address: Option<String>,
    geometry: Option<WireGeometry>,
    rating: Option<f64>,
    user_ratings_total: Option<u32>,
}

#[derive(Deserialize)]
struct NearbyResponse {
    status: String,
    error_message: Option<String>,
    #[serde(default)]
    results: Vec<WirePlace>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct WireDetails {
    place_id: Option<String>,
    name: Option<String>,
    formatted_address: Option<String>,
    #[serde(default)]
    address_components: Vec<AddressComponent>,
    website: Option<String>,
    international_phone_number: Option<String>,
    formatted_phone_number: Option<String>,
    rating: Option<f64>,
    user_ratings_total: Option<u32>,
}

#[derive(Deserialize)]
struct DetailsResponse {
    status: String,
    error_message: Option<String>,
    result: Option<WireDetails>,
}

#[derive(Deserialize)]
struct GeocodeResult {
    geometry: WireGeometry,
}

#[derive(Deserialize)]
struct GeocodeResponse {
    status: String,
    error_message: Option<String>,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

/// Google Places / Geocoding JSON API client.
pub struct GooglePlacesClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl GooglePlacesClient {
    pub fn new(api_key: &str, base_url: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("territory-scan/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .query(params)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => return Err(ProviderError::Throttled),
            s if s.is_server_error() => {
                return Err(ProviderError::Transport(format!("HTTP {s}")));
            }
            s if !s.is_success() => {
                return Err(ProviderError::Unexpected(format!("HTTP {s}")));
            }
            _ => {}
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl SearchProvider for GooglePlacesClient {
    async fn nearby_search(
        &self,
        query: &SearchQuery,
        cursor: Option<&str>,
    ) -> Result<SearchPage, ProviderError> {
        let params = match cursor {
            Some(token) => vec![("pagetoken", token.to_string())],
            None => vec![
                (
                    "location",
                    format!("{},{}", query.location.lat, query.location.lng),
                ),
                (
                    "radius",
                    query.radius_m.min(MAX_SEARCH_RADIUS_M).to_string(),
                ),
                ("keyword", query.keyword.clone()),
            ],
        };

        let resp: NearbyResponse = self.get_json("/place/nearbysearch/json", &params).await?;
        check_status(&resp.status, resp.error_message.as_deref())?;

        let results = resp
            .results
            .into_iter()
            .filter_map(|p| {
                let place_id = p.place_id.filter(|id| !id.trim().is_empty())?;
                Some(PlaceSummary {
                    place_id,
                    name: p.name.unwrap_or_default(),
                    address: p.vicinity.or(p.formatted_address),
                    location: p.geometry.map(|g| LatLng::new(g.location.lat, g.location.lng)),
                    rating: p.rating,
                    user_ratings_total: p.user_ratings_total,
                })
            })
            .collect();

        Ok(SearchPage {
            results,
            next_cursor: resp.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    async fn place_details(&self, place_id: &str) -> Result<PlaceDetails, ProviderError> {
        let params = [
            ("place_id", place_id.to_string()),
            ("fields", DETAIL_FIELDS.to_string()),
        ];
        let resp: DetailsResponse = self.get_json("/place/details/json", &params).await?;
        check_status(&resp.status, resp.error_message.as_deref())?;

        let d = resp.result.ok_or(ProviderError::NotFound)?;
        Ok(PlaceDetails {
            place_id: d.place_id.unwrap_or_else(|| place_id.to_string()),
            name: d.name,
            formatted_address: d.formatted_address,
            address_components: d.address_components,
            website: d.website,
            phone: d.international_phone_number.or(d.formatted_phone_number),
            rating: d.rating,
            user_ratings_total: d.user_ratings_total,
        })
    }

    async fn geocode(&self, city: &str, state: Option<&str>) -> Result<Option<LatLng>, ProviderError> {
        let address = match state {
            Some(st) if !st.trim().is_empty() => format!("{city}, {st}, USA"),
            _ if !city.contains(',') => format!("{city}, USA"),
            _ => city.to_string(),
        };
        let resp: GeocodeResponse = self.get_json("/geocode/json", &[("address", address)]).await?;
        check_status(&resp.status, resp.error_message.as_deref())?;

        Ok(resp
            .results
            .first()
            .map(|r| LatLng::new(r.geometry.location.lat, r.geometry.location.lng)))
    }
}
