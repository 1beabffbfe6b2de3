//! Spatial dataset store: loads the building layer and the city boundary
//! once per process, normalizes everything to the projected metric CRS, and
//! keeps an R-tree over record envelopes for the buffer-query pre-filter.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use geo::{BooleanOps, Geometry, Intersects, MultiPolygon, Point, Polygon};
use serde_json::{Map, Value};

use bouwbot_core::config::EngineConfig;
use bouwbot_core::error::{BouwbotError, Result};
use bouwbot_core::models::BuildingRecord;
use bouwbot_geo::transform::reproject_geometry;
use bouwbot_geo::{SpatialIndex, GEOGRAPHIC_EPSG};

/// Top-of-roof elevation (highest ridge line)
pub const HEIGHT_TOP_COL: &str = "b3_h_nok";
/// Ground elevation (NAP) at the building
pub const HEIGHT_GROUND_COL: &str = "b3_h_maaiveld";
/// Explicit ground-floor area in m²
pub const FOOTPRINT_COL: &str = "b3_opp_grond";
/// Volume columns, most detailed level of detail first
pub const VOLUME_COLS: [&str; 3] = ["b3_volume_lod22", "b3_volume_lod13", "b3_volume_lod12"];
/// BAG building identifier
pub const ID_COL: &str = "identificatie";

/// Generic height column names, used only for the best-effort hint
const HEIGHT_HINT_CANDIDATES: [&str; 6] =
    ["height", "hoogte", "h", "max_height", "building_height", "hoogte_m"];

/// The immutable, process-wide spatial dataset: building records in the
/// metric CRS, their spatial index, and the boundary polygon in geographic
/// coordinates for the edge-inclusive coverage check.
#[derive(Debug)]
pub struct BuildingStore {
    records: Vec<BuildingRecord>,
    index: SpatialIndex,
    boundary: MultiPolygon<f64>,
    height_hint: Option<String>,
    has_height_column: bool,
    has_volume_column: bool,
    metric_epsg: u32,
}

impl BuildingStore {
    /// Load both layers from disk. Expensive; call through [`StoreCache`].
    pub fn load(config: &EngineConfig) -> Result<Self> {
        let metric_epsg = config.metric_epsg.value;
        let records = load_buildings(&config.buildings_path.value, metric_epsg)?;
        let boundary = load_boundary_union(&config.boundary_path.value)?;

        tracing::info!(
            records = records.len(),
            metric_epsg,
            height_hint = ?find_height_hint(&records),
            "building dataset loaded"
        );

        Ok(Self::assemble(records, boundary, metric_epsg))
    }

    /// Build a store from already-parsed parts. Used by tests to run the
    /// query pipeline against synthetic datasets.
    pub fn from_parts(
        records: Vec<BuildingRecord>,
        boundary: MultiPolygon<f64>,
        metric_epsg: u32,
    ) -> Self {
        Self::assemble(records, boundary, metric_epsg)
    }

    fn assemble(
        records: Vec<BuildingRecord>,
        boundary: MultiPolygon<f64>,
        metric_epsg: u32,
    ) -> Self {
        let index =
            SpatialIndex::bulk_load(records.iter().enumerate().map(|(i, r)| (i, &r.geometry)));
        let height_hint = find_height_hint(&records);
        // Dataset-level presence: a column that exists with null values for
        // some records is still present; a column no record carries is not.
        let has_height_column = records.iter().any(|r| {
            r.roof_elevation_m.is_some() || r.properties.contains_key(HEIGHT_TOP_COL)
        });
        let has_volume_column = records.iter().any(|r| {
            r.volume_lod_m3.iter().any(Option::is_some)
                || VOLUME_COLS.iter().any(|col| r.properties.contains_key(*col))
        });
        Self {
            records,
            index,
            boundary,
            height_hint,
            has_height_column,
            has_volume_column,
            metric_epsg,
        }
    }

    pub fn records(&self) -> &[BuildingRecord] {
        &self.records
    }

    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    pub fn metric_epsg(&self) -> u32 {
        self.metric_epsg
    }

    /// Best-effort guess of a generic height column, if the dataset carries one.
    pub fn height_hint(&self) -> Option<&str> {
        self.height_hint.as_deref()
    }

    /// Whether any record carries the roof elevation column.
    pub fn has_height_column(&self) -> bool {
        self.has_height_column
    }

    /// Whether any record carries one of the volume columns.
    pub fn has_volume_column(&self) -> bool {
        self.has_volume_column
    }

    /// Edge-inclusive test whether a geographic point lies within the
    /// supported city boundary.
    pub fn is_point_in_boundary(&self, lat: f64, lon: f64) -> bool {
        // geo is (x, y) = (lon, lat); Intersects covers the boundary edge
        self.boundary.intersects(&Point::new(lon, lat))
    }
}

/// One-time-initialization cache for the building store. The mutex
/// serializes the first populating access; afterwards every caller gets a
/// clone of the same `Arc`.
#[derive(Default)]
pub struct StoreCache {
    slot: Mutex<Option<Arc<BuildingStore>>>,
}

impl StoreCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached store, loading it on first access.
    pub fn get_or_load(&self, config: &EngineConfig) -> Result<Arc<BuildingStore>> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(store) = slot.as_ref() {
            return Ok(Arc::clone(store));
        }
        let store = Arc::new(BuildingStore::load(config)?);
        *slot = Some(Arc::clone(&store));
        Ok(store)
    }
}

fn load_buildings(path: &Path, metric_epsg: u32) -> Result<Vec<BuildingRecord>> {
    if !path.exists() {
        return Err(BouwbotError::DataNotFound { path: path.to_path_buf() });
    }

    let content = fs::read_to_string(path)?;
    let geojson: geojson::GeoJson =
        content.parse().map_err(|e| BouwbotError::Serialization(format!(
            "failed to parse building layer {}: {}",
            path.display(),
            e
        )))?;

    let geojson::GeoJson::FeatureCollection(collection) = geojson else {
        return Err(BouwbotError::Serialization(format!(
            "building layer {} is not a feature collection",
            path.display()
        )));
    };

    // Meter-based buffering is meaningless without a declared CRS
    let source_epsg = declared_epsg(&collection)
        .ok_or_else(|| BouwbotError::MissingCrs { path: path.to_path_buf() })?;

    let mut records = Vec::with_capacity(collection.features.len());
    for (idx, feature) in collection.features.into_iter().enumerate() {
        // Null geometries are dropped, not errors
        let Some(geometry) = feature.geometry else {
            continue;
        };
        let geometry = Geometry::<f64>::try_from(&geometry.value).map_err(|e| {
            BouwbotError::InvalidGeometry {
                feature_id: idx.to_string(),
                reason: e.to_string(),
            }
        })?;
        let geometry = reproject_geometry(&geometry, source_epsg, metric_epsg)?;

        let properties = feature.properties.unwrap_or_default();
        records.push(record_from_properties(idx, geometry, properties));
    }

    if records.is_empty() {
        return Err(BouwbotError::DataEmpty {
            layer: path.display().to_string(),
        });
    }

    Ok(records)
}

fn record_from_properties(
    idx: usize,
    geometry: Geometry<f64>,
    properties: Map<String, Value>,
) -> BuildingRecord {
    let id = properties
        .get(ID_COL)
        .and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| idx.to_string());

    let number = |key: &str| properties.get(key).and_then(Value::as_f64);

    BuildingRecord {
        id,
        geometry,
        roof_elevation_m: number(HEIGHT_TOP_COL),
        ground_elevation_m: number(HEIGHT_GROUND_COL),
        footprint_area_m2: number(FOOTPRINT_COL),
        volume_lod_m3: [number(VOLUME_COLS[0]), number(VOLUME_COLS[1]), number(VOLUME_COLS[2])],
        properties,
    }
}

/// Load the city boundary layer and fold all its features into a single
/// (multi)polygon. The boundary stays in geographic coordinates.
fn load_boundary_union(path: &Path) -> Result<MultiPolygon<f64>> {
    if !path.exists() {
        return Err(BouwbotError::DataNotFound { path: path.to_path_buf() });
    }

    let content = fs::read_to_string(path)?;
    let geojson: geojson::GeoJson =
        content.parse().map_err(|e| BouwbotError::Serialization(format!(
            "failed to parse boundary layer {}: {}",
            path.display(),
            e
        )))?;

    let features: Vec<geojson::Feature> = match geojson {
        geojson::GeoJson::FeatureCollection(fc) => fc.features,
        geojson::GeoJson::Feature(f) => vec![f],
        geojson::GeoJson::Geometry(g) => vec![geojson::Feature {
            bbox: None,
            geometry: Some(g),
            id: None,
            properties: None,
            foreign_members: None,
        }],
    };

    let mut polygons: Vec<Polygon<f64>> = Vec::new();
    for (idx, feature) in features.into_iter().enumerate() {
        let Some(geometry) = feature.geometry else {
            continue;
        };
        let geometry = Geometry::<f64>::try_from(&geometry.value).map_err(|e| {
            BouwbotError::InvalidGeometry {
                feature_id: idx.to_string(),
                reason: e.to_string(),
            }
        })?;
        match geometry {
            Geometry::Polygon(p) => polygons.push(p),
            Geometry::MultiPolygon(mp) => polygons.extend(mp.0),
            other => {
                return Err(BouwbotError::InvalidGeometry {
                    feature_id: idx.to_string(),
                    reason: format!("boundary features must be polygonal, got {:?}", kind(&other)),
                })
            }
        }
    }

    let mut iter = polygons.into_iter();
    let first = iter.next().ok_or_else(|| BouwbotError::DataEmpty {
        layer: path.display().to_string(),
    })?;
    let mut boundary = MultiPolygon::new(vec![first]);
    for polygon in iter {
        boundary = boundary.union(&MultiPolygon::new(vec![polygon]));
    }
    Ok(boundary)
}

fn kind(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

/// Pull an EPSG code from the legacy `crs` foreign member, e.g.
/// `urn:ogc:def:crs:EPSG::28992` or `EPSG:28992`. RFC 7946 dropped the
/// member, so its absence means the source declares no CRS.
fn declared_epsg(collection: &geojson::FeatureCollection) -> Option<u32> {
    let name = collection
        .foreign_members
        .as_ref()?
        .get("crs")?
        .get("properties")?
        .get("name")?
        .as_str()?;

    if name.eq_ignore_ascii_case("urn:ogc:def:crs:OGC:1.3:CRS84") {
        return Some(GEOGRAPHIC_EPSG);
    }
    name.rsplit(':').next()?.parse().ok()
}

fn find_height_hint(records: &[BuildingRecord]) -> Option<String> {
    let first = records.first()?;
    for candidate in HEIGHT_HINT_CANDIDATES {
        if let Some(key) = first.properties.keys().find(|k| k.eq_ignore_ascii_case(candidate)) {
            return Some(key.clone());
        }
    }
    None
}
