//! Dataset loading tests: CRS handling, skip rules, cache identity.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use bouwbot_core::config::EngineConfig;
use bouwbot_core::error::BouwbotError;
use bouwbot_engine::{BuildingStore, StoreCache};

const BUILDINGS_RD: &str = r#"{
  "type": "FeatureCollection",
  "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::28992" } },
  "features": [
    {
      "type": "Feature",
      "properties": {
        "identificatie": "0344100000000001",
        "b3_h_nok": 34.0,
        "b3_h_maaiveld": 4.0
      },
      "geometry": {
        "type": "Polygon",
        "coordinates": [[[136600, 455800], [136620, 455800], [136620, 455820], [136600, 455820], [136600, 455800]]]
      }
    },
    {
      "type": "Feature",
      "properties": { "identificatie": "0344100000000002", "b3_h_nok": 12.5 },
      "geometry": null
    },
    {
      "type": "Feature",
      "properties": { "b3_volume_lod22": 9000.0 },
      "geometry": {
        "type": "Polygon",
        "coordinates": [[[136700, 455800], [136720, 455800], [136720, 455820], [136700, 455820], [136700, 455800]]]
      }
    }
  ]
}"#;

const BOUNDARY_WGS84: &str = r#"{
  "type": "FeatureCollection",
  "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:OGC:1.3:CRS84" } },
  "features": [
    {
      "type": "Feature",
      "properties": { "name": "Utrecht" },
      "geometry": {
        "type": "Polygon",
        "coordinates": [[[5.0, 52.0], [5.25, 52.0], [5.25, 52.18], [5.0, 52.18], [5.0, 52.0]]]
      }
    }
  ]
}"#;

fn config_with(dir: &Path, buildings: &str, boundary: &str) -> EngineConfig {
    let buildings_path = dir.join("pand.geojson");
    let boundary_path = dir.join("boundary.geojson");
    fs::write(&buildings_path, buildings).unwrap();
    fs::write(&boundary_path, boundary).unwrap();

    let mut config = EngineConfig::with_defaults();
    config.buildings_path.value = buildings_path;
    config.boundary_path.value = boundary_path;
    config
}

#[test]
fn loads_records_and_drops_null_geometries() {
    let dir = TempDir::new().unwrap();
    let config = config_with(dir.path(), BUILDINGS_RD, BOUNDARY_WGS84);

    let store = BuildingStore::load(&config).unwrap();

    // Three features, one with null geometry
    assert_eq!(store.records().len(), 2);
    assert_eq!(store.records()[0].id, "0344100000000001");
    assert_eq!(store.records()[0].roof_elevation_m, Some(34.0));
    // Missing id column falls back to the feature index
    assert_eq!(store.records()[1].id, "2");
    assert_eq!(store.records()[1].volume_lod_m3[0], Some(9000.0));

    // Dataset is RD New already; coordinates stay in metric range
    let geo::Geometry::Polygon(p) = &store.records()[0].geometry else {
        panic!("expected polygon");
    };
    let first = p.exterior().coords().next().unwrap();
    assert!((first.x - 136_600.0).abs() < 0.01);

    assert!(store.is_point_in_boundary(52.09, 5.12));
    assert!(!store.is_point_in_boundary(51.0, 4.0));
}

#[test]
fn missing_building_file_is_data_not_found() {
    let dir = TempDir::new().unwrap();
    let mut config = config_with(dir.path(), BUILDINGS_RD, BOUNDARY_WGS84);
    config.buildings_path.value = dir.path().join("nope.geojson");

    let err = BuildingStore::load(&config).unwrap_err();
    assert!(matches!(err, BouwbotError::DataNotFound { .. }));
}

#[test]
fn dataset_without_crs_is_rejected() {
    let no_crs = BUILDINGS_RD.replacen(
        r#""crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::28992" } },"#,
        "",
        1,
    );
    let dir = TempDir::new().unwrap();
    let config = config_with(dir.path(), &no_crs, BOUNDARY_WGS84);

    let err = BuildingStore::load(&config).unwrap_err();
    assert!(matches!(err, BouwbotError::MissingCrs { .. }));
}

#[test]
fn dataset_with_no_usable_features_is_data_empty() {
    let empty = r#"{
      "type": "FeatureCollection",
      "crs": { "type": "name", "properties": { "name": "EPSG:28992" } },
      "features": []
    }"#;
    let dir = TempDir::new().unwrap();
    let config = config_with(dir.path(), empty, BOUNDARY_WGS84);

    let err = BuildingStore::load(&config).unwrap_err();
    assert!(matches!(err, BouwbotError::DataEmpty { .. }));
}

#[test]
fn non_polygonal_boundary_is_rejected() {
    let bad_boundary = r#"{
      "type": "FeatureCollection",
      "features": [
        { "type": "Feature", "properties": {}, "geometry": { "type": "Point", "coordinates": [5.1, 52.1] } }
      ]
    }"#;
    let dir = TempDir::new().unwrap();
    let config = config_with(dir.path(), BUILDINGS_RD, bad_boundary);

    let err = BuildingStore::load(&config).unwrap_err();
    assert!(matches!(err, BouwbotError::InvalidGeometry { .. }));
}

#[test]
fn cache_hands_out_the_same_store() {
    let dir = TempDir::new().unwrap();
    let config = config_with(dir.path(), BUILDINGS_RD, BOUNDARY_WGS84);

    let cache = StoreCache::new();
    let first = cache.get_or_load(&config).unwrap();
    let second = cache.get_or_load(&config).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}
