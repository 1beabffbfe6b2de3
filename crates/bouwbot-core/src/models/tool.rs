//! The `ToolResult` contract every registered operation returns, and the map
//! overlay instructions the renderer consumes.

use serde::{Deserialize, Serialize};

/// Instruction telling the map renderer what to draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerDescriptor {
    Marker { lat: f64, lon: f64, label: String },
    Circle { lat: f64, lon: f64, radius_m: f64 },
    GeojsonUrl { name: String, url: String },
}

/// Map view update carried by a tool result. Every field is optional:
/// a tool may move the center without touching zoom or layers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub center: Option<[f64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoom: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layers: Option<Vec<LayerDescriptor>>,
}

/// Aggregate statistics, labeled with the strategy that produced the values.
///
/// `Empty` is deliberately last: untagged deserialization tries variants in
/// declaration order and `{}` would otherwise shadow the populated shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Stats {
    Height { min_m: f64, avg_m: f64, max_m: f64, source: String },
    Footprint { min_m2: f64, avg_m2: f64, max_m2: f64, source: String },
    Volume { total_m3: f64, avg_m3: f64, max_m3: f64, source: String },
    Empty {},
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TallestBuilding {
    pub id: Option<String>,
    pub height_m: f64,
}

/// Contract every registered tool operation returns.
///
/// Expected conditions (bad input, point outside the boundary, empty result
/// sets) are reported inline through `ok`/`error`, never as a Rust error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_in_buffer: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_height_m: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<Stats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tallest: Option<TallestBuilding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map: Option<MapPayload>,
}

impl ToolResult {
    /// Successful result with a human-readable summary.
    pub fn success(summary: impl Into<String>) -> Self {
        Self {
            ok: true,
            summary: Some(summary.into()),
            ..Self::default()
        }
    }

    /// Inline failure, the only shape expected-condition errors take.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    pub fn with_stats(mut self, stats: Stats) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn with_map(mut self, map: MapPayload) -> Self {
        self.map = Some(map);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_omits_success_fields_on_the_wire() {
        let result = ToolResult::failure("radius_m must be between 1 and 15000 meters.");
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["ok"], false);
        assert_eq!(json["error"], "radius_m must be between 1 and 15000 meters.");
        assert!(json.get("summary").is_none());
        assert!(json.get("map").is_none());
    }

    #[test]
    fn layer_descriptors_are_tagged_by_type() {
        let layers = vec![
            LayerDescriptor::Marker { lat: 52.09, lon: 5.12, label: "Query point".into() },
            LayerDescriptor::Circle { lat: 52.09, lon: 5.12, radius_m: 400.0 },
            LayerDescriptor::GeojsonUrl {
                name: "Filtered buildings".into(),
                url: "/output/filtered_buildings.geojson".into(),
            },
        ];
        let json = serde_json::to_value(&layers).unwrap();

        assert_eq!(json[0]["type"], "marker");
        assert_eq!(json[1]["type"], "circle");
        assert_eq!(json[1]["radius_m"], 400.0);
        assert_eq!(json[2]["type"], "geojson_url");

        let back: Vec<LayerDescriptor> = serde_json::from_value(json).unwrap();
        assert_eq!(back, layers);
    }

    #[test]
    fn stats_variants_serialize_flat() {
        let stats = Stats::Volume {
            total_m3: 120_000.0,
            avg_m3: 400.0,
            max_m3: 9_000.0,
            source: "volume_lod22".into(),
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["total_m3"], 120_000.0);
        assert_eq!(json["source"], "volume_lod22");

        let empty = serde_json::to_value(Stats::Empty {}).unwrap();
        assert_eq!(empty, serde_json::json!({}));
    }
}
