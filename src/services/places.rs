// src/services/places.rs

//! Directory record source.
//!
//! [`PlaceDirectory`] is the seam the orchestrator works against; the
//! production implementation talks to the Google Places API (New). Retry
//! policy deliberately lives in the orchestrator, so this client maps
//! throttling and unknown-id responses onto the error taxonomy and
//! otherwise stays thin.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::{Coordinates, DetailRecord, PlaceCandidate, PlacesConfig};
use crate::utils::url::extract_postcode;

const SEARCH_URL: &str = "https://places.googleapis.com/v1/places:searchText";
const DETAILS_URL: &str = "https://places.googleapis.com/v1/places";

const SEARCH_FIELD_MASK: &str = "places.id,places.displayName,places.location,nextPageToken";
const DETAILS_FIELD_MASK: &str =
    "id,displayName,formattedAddress,location,websiteUri,types,nationalPhoneNumber";

/// Supplies place records and detail records for a search query.
#[async_trait]
pub trait PlaceDirectory: Send + Sync {
    /// All candidates for the query, across result pages. Duplicates
    /// across pages are possible; callers must tolerate them.
    async fn search(&self, query: &str) -> Result<Vec<PlaceCandidate>>;

    /// The detail record for one place id.
    ///
    /// Fails with [`AppError::NotFound`] for an unknown id and
    /// [`AppError::RateLimited`] when throttled; both are retryable.
    async fn details(&self, place_id: &str) -> Result<DetailRecord>;
}

/// Google Places API (New) client.
pub struct GooglePlacesClient {
    client: reqwest::Client,
    api_key: String,
    config: PlacesConfig,
}

impl GooglePlacesClient {
    pub fn new(api_key: String, config: PlacesConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            api_key,
            config,
        })
    }

    fn search_body(&self, query: &str, page_token: Option<&str>) -> serde_json::Value {
        let mut body = serde_json::json!({
            "textQuery": query,
            "locationBias": {
                "circle": {
                    "center": {
                        "latitude": self.config.latitude,
                        "longitude": self.config.longitude,
                    },
                    "radius": self.config.radius_m,
                }
            }
        });
        if let Some(token) = page_token {
            body["pageToken"] = serde_json::Value::String(token.to_string());
        }
        body
    }

    /// Map throttling onto the retryable error variant before surfacing
    /// other non-success statuses.
    fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(AppError::RateLimited { retry_after });
        }
        Ok(response.error_for_status()?)
    }
}

#[async_trait]
impl PlaceDirectory for GooglePlacesClient {
    async fn search(&self, query: &str) -> Result<Vec<PlaceCandidate>> {
        let mut candidates = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let response = self
                .client
                .post(SEARCH_URL)
                .header(CONTENT_TYPE, "application/json")
                .header("X-Goog-Api-Key", &self.api_key)
                .header("X-Goog-FieldMask", SEARCH_FIELD_MASK)
                .json(&self.search_body(query, page_token.as_deref()))
                .send()
                .await?;
            let page: SearchResponse = Self::check_status(response)?.json().await?;

            for place in page.places {
                candidates.push(place.into_candidate(candidates.len()));
            }

            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
            // Pagination gap; page tokens need a moment to become valid
            tokio::time::sleep(Duration::from_millis(self.config.page_gap_ms)).await;
        }

        log::info!("Directory search returned {} candidates", candidates.len());
        Ok(candidates)
    }

    async fn details(&self, place_id: &str) -> Result<DetailRecord> {
        let response = self
            .client
            .get(format!("{DETAILS_URL}/{place_id}"))
            .header("X-Goog-Api-Key", &self.api_key)
            .header("X-Goog-FieldMask", DETAILS_FIELD_MASK)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(place_id.to_string()));
        }
        let place: ApiPlace = Self::check_status(response)?.json().await?;
        Ok(place.into_detail(place_id))
    }
}

/// Derive a best-fit cuisine label from directory place types.
pub fn derive_cuisine(types: &[String]) -> Option<&'static str> {
    const CUISINE_MAPPING: &[(&str, &str)] = &[
        ("italian_restaurant", "Italian"),
        ("chinese_restaurant", "Chinese"),
        ("indian_restaurant", "Indian"),
        ("japanese_restaurant", "Japanese"),
        ("thai_restaurant", "Thai"),
        ("french_restaurant", "French"),
        ("spanish_restaurant", "Spanish"),
        ("mexican_restaurant", "Mexican"),
        ("middle_eastern_restaurant", "Middle Eastern"),
        ("american_restaurant", "American"),
        ("mediterranean_restaurant", "Mediterranean"),
        ("seafood_restaurant", "Seafood"),
        ("steak_house", "Steakhouse"),
        ("sushi_restaurant", "Sushi"),
        ("vietnamese_restaurant", "Vietnamese"),
        ("korean_restaurant", "Korean"),
        ("greek_restaurant", "Greek"),
        ("turkish_restaurant", "Turkish"),
        ("lebanese_restaurant", "Lebanese"),
        ("pizza_restaurant", "Pizza"),
        ("hamburger_restaurant", "Burgers"),
        ("bakery", "Bakery"),
        ("cafe", "Cafe"),
        ("wine_bar", "Wine Bar"),
        ("pub", "Gastropub"),
        ("brasserie", "Brasserie"),
    ];

    types.iter().find_map(|t| {
        CUISINE_MAPPING
            .iter()
            .find(|(key, _)| key == t)
            .map(|(_, label)| *label)
    })
}

// --- Wire types ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    places: Vec<ApiPlace>,
    next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ApiPlace {
    id: String,
    display_name: Option<LocalizedText>,
    location: Option<ApiLatLng>,
    formatted_address: String,
    website_uri: Option<String>,
    types: Vec<String>,
    national_phone_number: String,
}

#[derive(Debug, Default, Deserialize)]
struct LocalizedText {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiLatLng {
    latitude: f64,
    longitude: f64,
}

impl ApiPlace {
    fn into_candidate(self, search_rank: usize) -> PlaceCandidate {
        PlaceCandidate {
            place_id: self.id,
            name: self.display_name.map(|d| d.text).unwrap_or_default(),
            coordinates: self.location.map(|l| Coordinates {
                latitude: l.latitude,
                longitude: l.longitude,
            }),
            search_rank,
        }
    }

    fn into_detail(self, place_id: &str) -> DetailRecord {
        let postcode = extract_postcode(&self.formatted_address).unwrap_or_default();
        let cuisine_guess = derive_cuisine(&self.types).map(str::to_string);
        DetailRecord {
            place_id: place_id.to_string(),
            postcode,
            website: self.website_uri.filter(|w| !w.trim().is_empty()),
            cuisine_guess,
            phone: self.national_phone_number,
            address: self.formatted_address,
            coordinates: self.location.map(|l| Coordinates {
                latitude: l.latitude,
                longitude: l.longitude,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search_response() {
        let json = r#"{
            "places": [
                {
                    "id": "p1",
                    "displayName": {"text": "Quo Vadis", "languageCode": "en"},
                    "location": {"latitude": 51.5136, "longitude": -0.1331}
                },
                {"id": "p2"}
            ],
            "nextPageToken": "tok"
        }"#;
        let page: SearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(page.places.len(), 2);
        assert_eq!(page.next_page_token.as_deref(), Some("tok"));

        let candidate = page.places.into_iter().next().unwrap().into_candidate(0);
        assert_eq!(candidate.place_id, "p1");
        assert_eq!(candidate.name, "Quo Vadis");
        assert!(candidate.coordinates.is_some());
    }

    #[test]
    fn test_detail_conversion() {
        let json = r#"{
            "id": "p1",
            "displayName": {"text": "Quo Vadis"},
            "formattedAddress": "26-29 Dean St, London W1D 3LL, UK",
            "websiteUri": "https://www.quovadissoho.co.uk/",
            "types": ["restaurant", "french_restaurant"],
            "nationalPhoneNumber": "020 7437 9585"
        }"#;
        let place: ApiPlace = serde_json::from_str(json).unwrap();
        let detail = place.into_detail("p1");

        assert_eq!(detail.postcode, "W1D 3LL");
        assert_eq!(detail.cuisine_guess.as_deref(), Some("French"));
        assert_eq!(
            detail.website.as_deref(),
            Some("https://www.quovadissoho.co.uk/")
        );
    }

    #[test]
    fn test_detail_without_website() {
        let place: ApiPlace = serde_json::from_str(r#"{"id": "p9", "websiteUri": ""}"#).unwrap();
        assert!(place.into_detail("p9").website.is_none());
    }

    #[test]
    fn test_derive_cuisine() {
        let types = vec!["restaurant".to_string(), "thai_restaurant".to_string()];
        assert_eq!(derive_cuisine(&types), Some("Thai"));
        assert_eq!(derive_cuisine(&["restaurant".to_string()]), None);
        assert_eq!(derive_cuisine(&[]), None);
    }
}
