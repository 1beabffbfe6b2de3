//! Place-name resolution through the Nominatim search API.
//!
//! Lookups are cached by normalized query and throttled to respect the
//! public endpoint's one-request-per-second policy. Network and parse
//! failures degrade to "not found" rather than surfacing as errors.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde::Deserialize;
use tokio::time::Instant;

use bouwbot_core::models::{LayerDescriptor, MapPayload, ToolResult};

const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/search";
const USER_AGENT: &str = concat!("bouwbot/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Minimum spacing between upstream requests
const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(1100);

#[derive(Debug, Deserialize)]
struct NominatimHit {
    // Nominatim returns coordinates as JSON strings
    lat: String,
    lon: String,
}

pub struct Geocoder {
    client: reqwest::Client,
    base_url: String,
    cache: Mutex<HashMap<String, (f64, f64)>>,
    last_request: tokio::sync::Mutex<Option<Instant>>,
}

impl Default for Geocoder {
    fn default() -> Self {
        Self::new(NOMINATIM_URL)
    }
}

impl Geocoder {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
            cache: Mutex::new(HashMap::new()),
            last_request: tokio::sync::Mutex::new(None),
        }
    }

    /// Resolve a free-text place name to (lat, lon). Returns `None` when the
    /// place is unknown or the upstream service is unreachable.
    pub async fn geocode(&self, place: &str) -> Option<(f64, f64)> {
        let key = normalize(place);
        if key.is_empty() {
            return None;
        }

        if let Some(hit) = self.cache.lock().unwrap_or_else(|e| e.into_inner()).get(&key) {
            return Some(*hit);
        }

        self.throttle().await;

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("q", place),
                ("format", "json"),
                ("limit", "1"),
                ("countrycodes", "nl"),
            ])
            .send()
            .await;

        let hits: Vec<NominatimHit> = match response {
            Ok(resp) => match resp.json().await {
                Ok(hits) => hits,
                Err(e) => {
                    tracing::warn!(place, error = %e, "geocoder response was not parseable");
                    return None;
                }
            },
            Err(e) => {
                tracing::warn!(place, error = %e, "geocoder request failed");
                return None;
            }
        };

        let hit = hits.first()?;
        let lat: f64 = hit.lat.parse().ok()?;
        let lon: f64 = hit.lon.parse().ok()?;

        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, (lat, lon));
        Some((lat, lon))
    }

    /// Tool entry point: resolve a place and center the map on it.
    pub async fn geocode_location(&self, place: &str) -> ToolResult {
        match self.geocode(place).await {
            Some((lat, lon)) => ToolResult {
                ok: true,
                summary: Some(format!("Resolved '{}' to ({:.5}, {:.5}).", place, lat, lon)),
                map: Some(MapPayload {
                    center: Some([lat, lon]),
                    zoom: Some(13),
                    layers: Some(vec![LayerDescriptor::Marker {
                        lat,
                        lon,
                        label: place.to_string(),
                    }]),
                }),
                ..ToolResult::default()
            },
            None => ToolResult::failure(format!("Could not resolve place: {}", place)),
        }
    }

    /// Hold the caller until the minimum request interval has elapsed.
    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < MIN_REQUEST_INTERVAL {
                tokio::time::sleep(MIN_REQUEST_INTERVAL - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

fn normalize(place: &str) -> String {
    place.trim().to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_whitespace_and_case() {
        assert_eq!(normalize("  Dom   Tower\tUtrecht "), "dom tower utrecht");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   "), "");
    }

    #[tokio::test]
    async fn cached_hit_skips_the_network() {
        let geocoder = Geocoder::new("http://127.0.0.1:1/search");
        geocoder
            .cache
            .lock()
            .unwrap()
            .insert("utrecht".to_string(), (52.0907, 5.1214));

        let hit = geocoder.geocode("  Utrecht ").await;
        assert_eq!(hit, Some((52.0907, 5.1214)));
    }

    #[tokio::test]
    async fn unreachable_endpoint_degrades_to_none() {
        let geocoder = Geocoder::new("http://127.0.0.1:1/search");
        assert_eq!(geocoder.geocode("utrecht").await, None);

        let result = geocoder.geocode_location("utrecht").await;
        assert!(!result.ok);
        assert!(result.error.unwrap().contains("utrecht"));
    }

    #[tokio::test]
    async fn empty_place_is_rejected_without_a_request() {
        let geocoder = Geocoder::new("http://127.0.0.1:1/search");
        assert_eq!(geocoder.geocode("   ").await, None);
    }
}
