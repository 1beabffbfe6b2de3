//! Tool registry: the catalog advertised to the language model and the
//! router that dispatches its tool calls into the engine.
//!
//! The catalog is generated from [`ToolName`] so the advertised surface and
//! the dispatchable surface cannot drift apart.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use bouwbot_core::models::ToolResult;

use crate::geocode::Geocoder;
use crate::query::BufferQueryEngine;

const DEFAULT_RADIUS_M: f64 = 400.0;
const DEFAULT_MIN_HEIGHT_M: f64 = 30.0;

/// Every operation the assistant can invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolName {
    GeocodeLocation,
    BufferPoint,
    BuildingsWithinBuffer,
    BuildingsHigherThanWithinBuffer,
    HeightStatsWithinBuffer,
    TallestBuildingWithinBuffer,
    FootprintStatsWithinBuffer,
    TotalVolumeWithinBuffer,
}

impl ToolName {
    pub const ALL: [ToolName; 8] = [
        ToolName::GeocodeLocation,
        ToolName::BufferPoint,
        ToolName::BuildingsWithinBuffer,
        ToolName::BuildingsHigherThanWithinBuffer,
        ToolName::HeightStatsWithinBuffer,
        ToolName::TallestBuildingWithinBuffer,
        ToolName::FootprintStatsWithinBuffer,
        ToolName::TotalVolumeWithinBuffer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::GeocodeLocation => "geocode_location",
            ToolName::BufferPoint => "buffer_point",
            ToolName::BuildingsWithinBuffer => "buildings_within_buffer",
            ToolName::BuildingsHigherThanWithinBuffer => "buildings_higher_than_within_buffer",
            ToolName::HeightStatsWithinBuffer => "height_stats_within_buffer",
            ToolName::TallestBuildingWithinBuffer => "tallest_building_within_buffer",
            ToolName::FootprintStatsWithinBuffer => "footprint_stats_within_buffer",
            ToolName::TotalVolumeWithinBuffer => "total_volume_within_buffer",
        }
    }

    pub fn parse(name: &str) -> Option<ToolName> {
        Self::ALL.into_iter().find(|tool| tool.as_str() == name)
    }

    fn description(&self) -> &'static str {
        match self {
            ToolName::GeocodeLocation => {
                "Resolve a Dutch place name or address to coordinates and center the map on it."
            }
            ToolName::BufferPoint => {
                "Draw a circular buffer around a point on the map without querying the dataset."
            }
            ToolName::BuildingsWithinBuffer => {
                "Count all buildings within a radius around a point and show them on the map."
            }
            ToolName::BuildingsHigherThanWithinBuffer => {
                "Count buildings taller than a minimum height within a radius around a point."
            }
            ToolName::HeightStatsWithinBuffer => {
                "Compute min/avg/max building height within a radius around a point."
            }
            ToolName::TallestBuildingWithinBuffer => {
                "Find the single tallest building within a radius around a point."
            }
            ToolName::FootprintStatsWithinBuffer => {
                "Compute min/avg/max building footprint area within a radius around a point."
            }
            ToolName::TotalVolumeWithinBuffer => {
                "Compute the total building volume within a radius around a point."
            }
        }
    }

    fn parameters(&self) -> Value {
        match self {
            ToolName::GeocodeLocation => json!({
                "type": "object",
                "properties": {
                    "place": {
                        "type": "string",
                        "description": "Place name or address, e.g. 'Domtoren, Utrecht'"
                    }
                },
                "required": ["place"]
            }),
            ToolName::BuildingsHigherThanWithinBuffer => json!({
                "type": "object",
                "properties": {
                    "lat": { "type": "number", "description": "Latitude (WGS84)" },
                    "lon": { "type": "number", "description": "Longitude (WGS84)" },
                    "radius_m": {
                        "type": "number",
                        "description": "Buffer radius in meters",
                        "default": DEFAULT_RADIUS_M
                    },
                    "min_height_m": {
                        "type": "number",
                        "description": "Minimum building height in meters",
                        "default": DEFAULT_MIN_HEIGHT_M
                    }
                },
                "required": ["lat", "lon"]
            }),
            _ => json!({
                "type": "object",
                "properties": {
                    "lat": { "type": "number", "description": "Latitude (WGS84)" },
                    "lon": { "type": "number", "description": "Longitude (WGS84)" },
                    "radius_m": {
                        "type": "number",
                        "description": "Buffer radius in meters",
                        "default": DEFAULT_RADIUS_M
                    }
                },
                "required": ["lat", "lon"]
            }),
        }
    }
}

/// Tool catalog in the JSON-schema function-calling shape chat providers expect.
pub fn tool_catalog() -> Vec<Value> {
    ToolName::ALL
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.as_str(),
                    "description": tool.description(),
                    "parameters": tool.parameters()
                }
            })
        })
        .collect()
}

fn default_radius() -> f64 {
    DEFAULT_RADIUS_M
}

fn default_min_height() -> f64 {
    DEFAULT_MIN_HEIGHT_M
}

#[derive(Debug, Deserialize)]
struct PlaceArgs {
    place: String,
}

#[derive(Debug, Deserialize)]
struct BufferArgs {
    lat: f64,
    lon: f64,
    #[serde(default = "default_radius")]
    radius_m: f64,
}

#[derive(Debug, Deserialize)]
struct HigherThanArgs {
    lat: f64,
    lon: f64,
    #[serde(default = "default_radius")]
    radius_m: f64,
    #[serde(default = "default_min_height")]
    min_height_m: f64,
}

/// Dispatches tool calls by name. Unknown tools and malformed arguments come
/// back as inline failures so the model can correct itself on the next turn.
pub struct ToolRouter {
    engine: Arc<BufferQueryEngine>,
    geocoder: Arc<Geocoder>,
}

impl ToolRouter {
    pub fn new(engine: Arc<BufferQueryEngine>, geocoder: Arc<Geocoder>) -> Self {
        Self { engine, geocoder }
    }

    pub async fn call_tool(&self, name: &str, args: Value) -> ToolResult {
        let Some(tool) = ToolName::parse(name) else {
            return ToolResult::failure(format!("Unknown tool: {}", name));
        };

        tracing::info!(tool = name, "dispatching tool call");

        match tool {
            ToolName::GeocodeLocation => match parse_args::<PlaceArgs>(name, args) {
                Ok(a) => self.geocoder.geocode_location(&a.place).await,
                Err(failure) => failure,
            },
            ToolName::BufferPoint => match parse_args::<BufferArgs>(name, args) {
                Ok(a) => self.engine.buffer_point(a.lat, a.lon, a.radius_m),
                Err(failure) => failure,
            },
            ToolName::BuildingsWithinBuffer => match parse_args::<BufferArgs>(name, args) {
                Ok(a) => self.engine.buildings_within_buffer(a.lat, a.lon, a.radius_m),
                Err(failure) => failure,
            },
            ToolName::BuildingsHigherThanWithinBuffer => {
                match parse_args::<HigherThanArgs>(name, args) {
                    Ok(a) => self.engine.buildings_higher_than_within_buffer(
                        a.lat,
                        a.lon,
                        a.radius_m,
                        a.min_height_m,
                    ),
                    Err(failure) => failure,
                }
            }
            ToolName::HeightStatsWithinBuffer => match parse_args::<BufferArgs>(name, args) {
                Ok(a) => self.engine.height_stats_within_buffer(a.lat, a.lon, a.radius_m),
                Err(failure) => failure,
            },
            ToolName::TallestBuildingWithinBuffer => match parse_args::<BufferArgs>(name, args) {
                Ok(a) => self.engine.tallest_building_within_buffer(a.lat, a.lon, a.radius_m),
                Err(failure) => failure,
            },
            ToolName::FootprintStatsWithinBuffer => match parse_args::<BufferArgs>(name, args) {
                Ok(a) => self.engine.footprint_stats_within_buffer(a.lat, a.lon, a.radius_m),
                Err(failure) => failure,
            },
            ToolName::TotalVolumeWithinBuffer => match parse_args::<BufferArgs>(name, args) {
                Ok(a) => self.engine.total_volume_within_buffer(a.lat, a.lon, a.radius_m),
                Err(failure) => failure,
            },
        }
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(
    name: &str,
    args: Value,
) -> std::result::Result<T, ToolResult> {
    serde_json::from_value(args).map_err(|e| {
        ToolResult::failure(format!("Invalid arguments for {}: {}", name, e))
    })
}
