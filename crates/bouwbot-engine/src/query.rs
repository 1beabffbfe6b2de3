//! Buffer-query engine: point + radius in, `ToolResult` out.
//!
//! Every operation shares the same preamble (radius range check, boundary
//! check, projection, disc construction) and the same two-stage filter:
//! R-tree bounding-box pre-filter first, exact intersection test on the
//! survivors. Whatever the outcome of a valid query, the buffer polygon
//! itself is exported so the user always sees the area that was searched.

use std::sync::Arc;

use geo::{Geometry, InteriorPoint};
use serde_json::Value;

use bouwbot_core::config::EngineConfig;
use bouwbot_core::error::BouwbotError;
use bouwbot_core::models::{
    BuildingRecord, LayerDescriptor, MapPayload, Stats, TallestBuilding, ToolResult,
};
use bouwbot_geo::{CrsTransformer, QueryBuffer};

use crate::export::{ExportFeature, GeoJsonExporter};
use crate::store::{BuildingStore, HEIGHT_TOP_COL, VOLUME_COLS};

/// Route the API serves generated files under
const OUTPUT_ROUTE: &str = "/output";

const BUFFER_PREFIX: &str = "buffer_geom";
const FILTERED_PREFIX: &str = "filtered_buildings";
const TALLEST_PREFIX: &str = "tallest_building";

const EXTENT_ERROR: &str =
    "This assistant currently supports only Utrecht. Please choose a location within Utrecht.";

pub struct BufferQueryEngine {
    store: Arc<BuildingStore>,
    exporter: GeoJsonExporter,
    max_export_features: usize,
    max_radius_m: f64,
}

/// Validated query context: the disc buffer plus the already-exported
/// buffer layer every response includes.
struct PreparedQuery {
    lat: f64,
    lon: f64,
    radius_m: f64,
    buffer: QueryBuffer,
    buffer_layer: LayerDescriptor,
}

impl PreparedQuery {
    /// Baseline map payload: query-point marker and the buffer extent.
    fn base_map(&self, zoom: u32) -> MapPayload {
        MapPayload {
            center: Some([self.lat, self.lon]),
            zoom: Some(zoom),
            layers: Some(vec![
                LayerDescriptor::Marker {
                    lat: self.lat,
                    lon: self.lon,
                    label: "Query point".to_string(),
                },
                self.buffer_layer.clone(),
            ]),
        }
    }
}

impl BufferQueryEngine {
    pub fn new(store: Arc<BuildingStore>, config: &EngineConfig) -> Self {
        let exporter =
            GeoJsonExporter::new(config.output_dir.value.clone(), store.metric_epsg());
        Self {
            store,
            exporter,
            max_export_features: config.max_export_features.value,
            max_radius_m: config.max_radius_m.value,
        }
    }

    pub fn store(&self) -> &Arc<BuildingStore> {
        &self.store
    }

    fn radius_error(&self) -> String {
        format!("radius_m must be between 1 and {} meters.", self.max_radius_m as i64)
    }

    /// A column the whole dataset lacks is a data problem, not an empty
    /// query result. Reported before any validation or export happens, so it
    /// is distinct from "no valid values in this area".
    fn missing_column(column: &str) -> ToolResult {
        ToolResult::failure(
            BouwbotError::MissingColumn { column: column.to_string() }.to_string(),
        )
    }

    /// Shared validation preamble. Radius range is checked before the
    /// boundary so an out-of-range radius reports the same error no matter
    /// where the point lies. Validation failures export nothing.
    fn preflight(
        &self,
        lat: f64,
        lon: f64,
        radius_m: f64,
    ) -> std::result::Result<PreparedQuery, Box<ToolResult>> {
        if !radius_m.is_finite() || radius_m <= 0.0 || radius_m > self.max_radius_m {
            return Err(Box::new(ToolResult::failure(self.radius_error())));
        }
        if !lat.is_finite() || !lon.is_finite() {
            return Err(Box::new(ToolResult::failure(
                "Invalid coordinates: lat and lon must be finite numbers.",
            )));
        }
        if !self.store.is_point_in_boundary(lat, lon) {
            return Err(Box::new(ToolResult::failure(EXTENT_ERROR)));
        }

        let transformer = match CrsTransformer::new(self.store.metric_epsg()) {
            Ok(t) => t,
            Err(e) => return Err(Box::new(ToolResult::failure(e.to_string()))),
        };
        let center = match transformer.metric_point(lat, lon) {
            Ok(p) => p,
            Err(e) => return Err(Box::new(ToolResult::failure(e.to_string()))),
        };

        let buffer = QueryBuffer::new(center, radius_m);
        let buffer_layer = match self.export_buffer(&buffer) {
            Ok(layer) => layer,
            Err(e) => return Err(Box::new(ToolResult::failure(e.to_string()))),
        };

        Ok(PreparedQuery { lat, lon, radius_m, buffer, buffer_layer })
    }

    fn export_buffer(&self, buffer: &QueryBuffer) -> bouwbot_core::Result<LayerDescriptor> {
        let mut properties = serde_json::Map::new();
        properties.insert("name".into(), Value::String("buffer".into()));
        properties.insert("radius_m".into(), Value::from(buffer.radius_m()));

        let filename = self.exporter.export(
            vec![ExportFeature {
                geometry: Geometry::Polygon(buffer.polygon().clone()),
                properties,
            }],
            BUFFER_PREFIX,
        )?;

        Ok(LayerDescriptor::GeojsonUrl {
            name: "Buffer".to_string(),
            url: format!("{}/{}", OUTPUT_ROUTE, filename),
        })
    }

    /// Two-stage filter: bbox pre-filter via the R-tree, then the exact
    /// intersection test. Candidate ids are sorted back into dataset order
    /// so truncation and tie-breaks stay deterministic.
    fn hits(&self, buffer: &QueryBuffer) -> Vec<&BuildingRecord> {
        let (min, max) = buffer.envelope();
        let mut ids = self.store.index().candidates(min, max);
        ids.sort_unstable();
        ids.into_iter()
            .map(|i| &self.store.records()[i])
            .filter(|record| buffer.intersects(&record.geometry))
            .collect()
    }

    fn export_records(
        &self,
        records: &[(&BuildingRecord, Option<f64>)],
        derived_key: Option<&str>,
        prefix: &str,
    ) -> bouwbot_core::Result<String> {
        let features = records
            .iter()
            .map(|(record, derived)| {
                let mut properties = record.properties.clone();
                properties.insert("id".into(), Value::String(record.id.clone()));
                if let (Some(key), Some(value)) = (derived_key, derived) {
                    properties.insert(key.to_string(), Value::from(*value));
                }
                ExportFeature { geometry: record.geometry.clone(), properties }
            })
            .collect();
        self.exporter.export(features, prefix)
    }

    fn no_buildings(&self, prepared: &PreparedQuery) -> ToolResult {
        ToolResult {
            ok: true,
            count: Some(0),
            summary: Some(format!(
                "No buildings found within {}m.",
                prepared.radius_m as i64
            )),
            map: Some(prepared.base_map(14)),
            ..ToolResult::default()
        }
    }

    /// Count and export every building intersecting the buffer.
    pub fn buildings_within_buffer(&self, lat: f64, lon: f64, radius_m: f64) -> ToolResult {
        let prepared = match self.preflight(lat, lon, radius_m) {
            Ok(p) => p,
            Err(result) => return *result,
        };

        let hits = self.hits(&prepared.buffer);
        let count = hits.len();
        if count == 0 {
            return self.no_buildings(&prepared);
        }

        let truncated = count > self.max_export_features;
        let export_slice: Vec<(&BuildingRecord, Option<f64>)> = hits
            .iter()
            .take(self.max_export_features)
            .map(|r| (*r, None))
            .collect();

        let filename = match self.export_records(&export_slice, None, FILTERED_PREFIX) {
            Ok(f) => f,
            Err(e) => return ToolResult::failure(e.to_string()),
        };

        let summary = format!(
            "Found {} buildings within {}m.{}",
            count,
            radius_m as i64,
            if truncated {
                format!(" Exported first {} buildings to GeoJSON.", self.max_export_features)
            } else {
                " Exported results to GeoJSON.".to_string()
            }
        );

        let mut map = prepared.base_map(14);
        if let Some(layers) = map.layers.as_mut() {
            layers.push(LayerDescriptor::GeojsonUrl {
                name: "Filtered buildings".to_string(),
                url: format!("{}/{}", OUTPUT_ROUTE, filename),
            });
        }

        ToolResult {
            ok: true,
            count: Some(count),
            summary: Some(summary),
            map: Some(map),
            ..ToolResult::default()
        }
    }

    /// Filter buffered buildings by a minimum derived height and report both
    /// the matching count and the total valid-height population.
    pub fn buildings_higher_than_within_buffer(
        &self,
        lat: f64,
        lon: f64,
        radius_m: f64,
        min_height_m: f64,
    ) -> ToolResult {
        if !min_height_m.is_finite() {
            return ToolResult::failure("min_height_m must be a finite number.");
        }
        if !self.store.has_height_column() {
            return Self::missing_column(HEIGHT_TOP_COL);
        }

        let prepared = match self.preflight(lat, lon, radius_m) {
            Ok(p) => p,
            Err(result) => return *result,
        };

        let hits = self.hits(&prepared.buffer);
        if hits.is_empty() {
            return self.no_buildings(&prepared);
        }

        let with_heights: Vec<(&BuildingRecord, f64, &'static str)> = hits
            .iter()
            .filter_map(|r| r.height_m().map(|(h, s)| (*r, h, s.as_str())))
            .collect();
        let total_in_buffer = with_heights.len();

        let filtered: Vec<&(&BuildingRecord, f64, &'static str)> =
            with_heights.iter().filter(|(_, h, _)| *h >= min_height_m).collect();
        let count = filtered.len();

        let stats = match min_avg_max(filtered.iter().map(|(_, h, _)| *h)) {
            Some((min_m, avg_m, max_m)) => Stats::Height {
                min_m,
                avg_m,
                max_m,
                source: strategy_label(filtered.iter().map(|(_, _, s)| *s)),
            },
            None => Stats::Empty {},
        };

        let mut summary = format!(
            "Within {}m: {} / {} buildings are >= {}m.",
            radius_m as i64, count, total_in_buffer, min_height_m
        );
        if let Stats::Height { min_m, avg_m, max_m, .. } = &stats {
            summary.push_str(&format!(
                " (min={:.1}, avg={:.1}, max={:.1})",
                min_m, avg_m, max_m
            ));
        }

        let mut result = ToolResult {
            ok: true,
            count: Some(count),
            total_in_buffer: Some(total_in_buffer),
            min_height_m: Some(min_height_m),
            stats: Some(stats),
            summary: Some(summary),
            map: Some(prepared.base_map(14)),
            ..ToolResult::default()
        };

        if count == 0 {
            return result;
        }

        // Too many to render: keep the numbers, skip the geometry payload
        if count > self.max_export_features {
            if let Some(s) = result.summary.as_mut() {
                s.push_str(&format!(
                    " Too many buildings to render (>{}). Showing summary only.",
                    self.max_export_features
                ));
            }
            return result;
        }

        let export_slice: Vec<(&BuildingRecord, Option<f64>)> =
            filtered.iter().map(|(r, h, _)| (*r, Some(*h))).collect();
        match self.export_records(&export_slice, Some("height_m"), FILTERED_PREFIX) {
            Ok(filename) => {
                if let Some(layers) = result.map.as_mut().and_then(|m| m.layers.as_mut()) {
                    layers.push(LayerDescriptor::GeojsonUrl {
                        name: "Height filtered buildings".to_string(),
                        url: format!("{}/{}", OUTPUT_ROUTE, filename),
                    });
                }
                result
            }
            Err(e) => ToolResult::failure(e.to_string()),
        }
    }

    /// Min/avg/max derived height over every valid-height building in the buffer.
    pub fn height_stats_within_buffer(&self, lat: f64, lon: f64, radius_m: f64) -> ToolResult {
        if !self.store.has_height_column() {
            return Self::missing_column(HEIGHT_TOP_COL);
        }

        let prepared = match self.preflight(lat, lon, radius_m) {
            Ok(p) => p,
            Err(result) => return *result,
        };

        let hits = self.hits(&prepared.buffer);
        if hits.is_empty() {
            let mut result = self.no_buildings(&prepared);
            result.stats = Some(Stats::Empty {});
            return result;
        }

        let heights: Vec<(f64, &'static str)> =
            hits.iter().filter_map(|r| r.height_m().map(|(h, s)| (h, s.as_str()))).collect();

        let Some((min_m, avg_m, max_m)) = min_avg_max(heights.iter().map(|(h, _)| *h)) else {
            return ToolResult {
                ok: true,
                count: Some(0),
                stats: Some(Stats::Empty {}),
                summary: Some("No valid height values in this area.".to_string()),
                map: Some(prepared.base_map(14)),
                ..ToolResult::default()
            };
        };

        let count = heights.len();
        ToolResult {
            ok: true,
            count: Some(count),
            stats: Some(Stats::Height {
                min_m,
                avg_m,
                max_m,
                source: strategy_label(heights.iter().map(|(_, s)| *s)),
            }),
            summary: Some(format!(
                "Within {}m: min={:.1}m, avg={:.1}m, max={:.1}m (n={}).",
                radius_m as i64, min_m, avg_m, max_m, count
            )),
            map: Some(prepared.base_map(14)),
            ..ToolResult::default()
        }
    }

    /// Single maximum-height building. Ties are broken by the smallest
    /// record identifier so the answer does not depend on dataset order.
    pub fn tallest_building_within_buffer(&self, lat: f64, lon: f64, radius_m: f64) -> ToolResult {
        if !self.store.has_height_column() {
            return Self::missing_column(HEIGHT_TOP_COL);
        }

        let prepared = match self.preflight(lat, lon, radius_m) {
            Ok(p) => p,
            Err(result) => return *result,
        };

        let hits = self.hits(&prepared.buffer);
        if hits.is_empty() {
            return self.no_buildings(&prepared);
        }

        let with_heights: Vec<(&BuildingRecord, f64)> =
            hits.iter().filter_map(|r| r.height_m().map(|(h, _)| (*r, h))).collect();

        let Some((tallest, height)) = with_heights.iter().fold(None, |best, &(record, height)| {
            match best {
                None => Some((record, height)),
                Some((best_record, best_height)) => {
                    if height > best_height
                        || (height == best_height && record.id < best_record.id)
                    {
                        Some((record, height))
                    } else {
                        Some((best_record, best_height))
                    }
                }
            }
        }) else {
            return ToolResult {
                ok: true,
                count: Some(0),
                summary: Some("No valid height values in this area.".to_string()),
                map: Some(prepared.base_map(14)),
                ..ToolResult::default()
            };
        };

        // Interior point, not centroid: the marker must land inside the
        // footprint even for concave shapes.
        let marker = tallest
            .geometry
            .interior_point()
            .and_then(|p| {
                CrsTransformer::new(self.store.metric_epsg())
                    .and_then(|t| t.geographic_point(p))
                    .ok()
            });

        let filename = match self.export_records(
            &[(tallest, Some(height))],
            Some("height_m"),
            TALLEST_PREFIX,
        ) {
            Ok(f) => f,
            Err(e) => return ToolResult::failure(e.to_string()),
        };

        let mut map = prepared.base_map(15);
        if let Some(layers) = map.layers.as_mut() {
            if let Some((t_lat, t_lon)) = marker {
                layers.push(LayerDescriptor::Marker {
                    lat: t_lat,
                    lon: t_lon,
                    label: format!("Tallest: {:.1}m", height),
                });
            }
            layers.push(LayerDescriptor::GeojsonUrl {
                name: "Tallest building".to_string(),
                url: format!("{}/{}", OUTPUT_ROUTE, filename),
            });
        }

        ToolResult {
            ok: true,
            count: Some(with_heights.len()),
            tallest: Some(TallestBuilding {
                id: Some(tallest.id.clone()),
                height_m: height,
            }),
            summary: Some(format!(
                "Tallest building within {}m is {:.1}m (id={}).",
                radius_m as i64, height, tallest.id
            )),
            map: Some(map),
            ..ToolResult::default()
        }
    }

    /// Min/avg/max footprint area over the buffer population.
    pub fn footprint_stats_within_buffer(&self, lat: f64, lon: f64, radius_m: f64) -> ToolResult {
        let prepared = match self.preflight(lat, lon, radius_m) {
            Ok(p) => p,
            Err(result) => return *result,
        };

        let hits = self.hits(&prepared.buffer);
        if hits.is_empty() {
            let mut result = self.no_buildings(&prepared);
            result.stats = Some(Stats::Empty {});
            return result;
        }

        let areas: Vec<(f64, &'static str)> =
            hits.iter().filter_map(|r| r.footprint_m2().map(|(a, s)| (a, s.as_str()))).collect();

        let Some((min_m2, avg_m2, max_m2)) = min_avg_max(areas.iter().map(|(a, _)| *a)) else {
            return ToolResult {
                ok: true,
                count: Some(0),
                stats: Some(Stats::Empty {}),
                summary: Some("No valid footprint areas in this area.".to_string()),
                map: Some(prepared.base_map(14)),
                ..ToolResult::default()
            };
        };

        let count = areas.len();
        ToolResult {
            ok: true,
            count: Some(count),
            stats: Some(Stats::Footprint {
                min_m2,
                avg_m2,
                max_m2,
                source: strategy_label(areas.iter().map(|(_, s)| *s)),
            }),
            summary: Some(format!(
                "Within {}m: footprint min={:.1} m2, avg={:.1} m2, max={:.1} m2 (n={}).",
                radius_m as i64, min_m2, avg_m2, max_m2, count
            )),
            map: Some(prepared.base_map(14)),
            ..ToolResult::default()
        }
    }

    /// Total derived volume over the buffer population, plus avg and max.
    pub fn total_volume_within_buffer(&self, lat: f64, lon: f64, radius_m: f64) -> ToolResult {
        // Volume falls back to footprint x height, so only the absence of
        // both column families makes the query unanswerable.
        if !self.store.has_volume_column() && !self.store.has_height_column() {
            return Self::missing_column(VOLUME_COLS[0]);
        }

        let prepared = match self.preflight(lat, lon, radius_m) {
            Ok(p) => p,
            Err(result) => return *result,
        };

        let hits = self.hits(&prepared.buffer);
        if hits.is_empty() {
            let mut result = self.no_buildings(&prepared);
            result.stats = Some(Stats::Empty {});
            return result;
        }

        let volumes: Vec<(f64, &'static str)> =
            hits.iter().filter_map(|r| r.volume_m3().map(|(v, s)| (v, s.as_str()))).collect();

        if volumes.is_empty() {
            return ToolResult {
                ok: true,
                count: Some(0),
                summary: Some("No valid volume values in this area.".to_string()),
                map: Some(prepared.base_map(14)),
                ..ToolResult::default()
            };
        }

        let count = volumes.len();
        let total_m3: f64 = volumes.iter().map(|(v, _)| v).sum();
        let avg_m3 = total_m3 / count as f64;
        let max_m3 = volumes.iter().map(|(v, _)| *v).fold(f64::MIN, f64::max);

        ToolResult {
            ok: true,
            count: Some(count),
            stats: Some(Stats::Volume {
                total_m3,
                avg_m3,
                max_m3,
                source: strategy_label(volumes.iter().map(|(_, s)| *s)),
            }),
            summary: Some(format!(
                "Within {}m: total volume = {:.0} m3 (avg={:.0} m3, max={:.0} m3, n={}).",
                radius_m as i64, total_m3, avg_m3, max_m3, count
            )),
            map: Some(prepared.base_map(14)),
            ..ToolResult::default()
        }
    }

    /// Pure visualization: draw a circle around a point without touching the
    /// dataset. No boundary restriction, only the radius range applies.
    pub fn buffer_point(&self, lat: f64, lon: f64, radius_m: f64) -> ToolResult {
        if !radius_m.is_finite() || radius_m <= 0.0 || radius_m > self.max_radius_m {
            return ToolResult::failure(self.radius_error());
        }
        if !lat.is_finite() || !lon.is_finite() {
            return ToolResult::failure("Invalid coordinates: lat and lon must be finite numbers.");
        }

        ToolResult {
            ok: true,
            summary: Some(format!(
                "Drew a {}m buffer around the selected point.",
                radius_m as i64
            )),
            map: Some(MapPayload {
                center: Some([lat, lon]),
                zoom: Some(15),
                layers: Some(vec![
                    LayerDescriptor::Marker {
                        lat,
                        lon,
                        label: "Selected point".to_string(),
                    },
                    LayerDescriptor::Circle { lat, lon, radius_m },
                ]),
            }),
            ..ToolResult::default()
        }
    }
}

fn min_avg_max(values: impl Iterator<Item = f64>) -> Option<(f64, f64, f64)> {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    let mut count = 0usize;
    for v in values {
        min = min.min(v);
        max = max.max(v);
        sum += v;
        count += 1;
    }
    (count > 0).then(|| (min, sum / count as f64, max))
}

/// Collapse per-record strategy labels into one: the shared label when the
/// population agrees, "mixed" otherwise.
fn strategy_label(sources: impl Iterator<Item = &'static str>) -> String {
    let mut label: Option<&'static str> = None;
    for source in sources {
        match label {
            None => label = Some(source),
            Some(current) if current == source => {}
            Some(_) => return "mixed".to_string(),
        }
    }
    label.unwrap_or("none").to_string()
}
