//! GeoJSON export for map rendering.
//!
//! The analysis pipeline works in projected meters, the renderer expects
//! geographic coordinates, so every feature is reprojected on the way out.
//! Filenames are stable per prefix: repeat queries overwrite rather than
//! accumulate.

use std::fs;
use std::path::{Path, PathBuf};

use geo::Geometry;
use serde_json::{Map, Value};

use bouwbot_core::error::Result;
use bouwbot_geo::CrsTransformer;

/// A geometry plus the non-geometry attributes it should carry into the file.
pub struct ExportFeature {
    pub geometry: Geometry<f64>,
    pub properties: Map<String, Value>,
}

/// Writes feature collections under a fixed output directory.
pub struct GeoJsonExporter {
    output_dir: PathBuf,
    metric_epsg: u32,
}

impl GeoJsonExporter {
    pub fn new(output_dir: impl Into<PathBuf>, metric_epsg: u32) -> Self {
        Self { output_dir: output_dir.into(), metric_epsg }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Reproject features to geographic coordinates and write them as a
    /// feature collection named `{prefix}.geojson`. Returns the filename.
    pub fn export(&self, features: Vec<ExportFeature>, prefix: &str) -> Result<String> {
        let transformer = CrsTransformer::new(self.metric_epsg)?;

        let features = features
            .into_iter()
            .map(|feature| {
                let geographic = transformer.geographic_geometry(&feature.geometry)?;
                Ok(geojson::Feature {
                    bbox: None,
                    geometry: Some(geojson::Geometry::new(geojson::Value::from(&geographic))),
                    id: None,
                    properties: Some(feature.properties),
                    foreign_members: None,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let collection = geojson::FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        };

        fs::create_dir_all(&self.output_dir)?;
        let filename = format!("{}.geojson", prefix);
        let path = self.output_dir.join(&filename);
        fs::write(&path, geojson::GeoJson::from(collection).to_string())?;

        tracing::debug!(file = %path.display(), "wrote geojson export");
        Ok(filename)
    }
}
