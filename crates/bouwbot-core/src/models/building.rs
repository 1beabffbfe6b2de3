//! Building records and their derived metrics.
//!
//! Height, footprint and volume are never stored directly; each is derived
//! through an ordered list of named strategies, first-applicable-wins. The
//! strategy that produced a value is reported alongside it so aggregate
//! results stay debuggable.

use geo::Area;
use serde_json::{Map, Value};

/// One row of the building dataset, geometry in the projected metric CRS.
#[derive(Debug, Clone)]
pub struct BuildingRecord {
    /// Stable identifier (BAG `identificatie` where available)
    pub id: String,
    /// Footprint geometry in the metric CRS (meters)
    pub geometry: geo::Geometry<f64>,
    /// Top-of-roof elevation (b3_h_nok)
    pub roof_elevation_m: Option<f64>,
    /// Ground elevation at the building (b3_h_maaiveld)
    pub ground_elevation_m: Option<f64>,
    /// Explicit ground-floor area column (b3_opp_grond)
    pub footprint_area_m2: Option<f64>,
    /// Volume columns, most detailed level first (LoD2.2, LoD1.3, LoD1.2)
    pub volume_lod_m3: [Option<f64>; 3],
    /// Remaining non-geometry attributes, carried through to exports
    pub properties: Map<String, Value>,
}

/// Which strategy produced `height_m`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeightSource {
    /// roof elevation minus ground elevation
    RoofMinusGround,
    /// roof elevation alone (ground elevation absent)
    RoofOnly,
}

impl HeightSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            HeightSource::RoofMinusGround => "roof_minus_ground",
            HeightSource::RoofOnly => "roof_only",
        }
    }
}

/// Which strategy produced `footprint_m2`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FootprintSource {
    /// Explicit area column
    Column,
    /// Polygon area computed in the metric CRS
    GeometryArea,
}

impl FootprintSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FootprintSource::Column => "area_column",
            FootprintSource::GeometryArea => "geometry_area",
        }
    }
}

/// Which strategy produced `volume_m3`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeSource {
    Lod22,
    Lod13,
    Lod12,
    /// footprint × height fallback when no volume column is present
    FootprintTimesHeight,
}

impl VolumeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            VolumeSource::Lod22 => "volume_lod22",
            VolumeSource::Lod13 => "volume_lod13",
            VolumeSource::Lod12 => "volume_lod12",
            VolumeSource::FootprintTimesHeight => "footprint_times_height",
        }
    }
}

/// Accept only finite, non-negative metric values
fn valid(v: f64) -> Option<f64> {
    (v.is_finite() && v >= 0.0).then_some(v)
}

impl BuildingRecord {
    /// Derived height in meters: roof − ground, else roof alone.
    /// Negative or missing results exclude the record from height aggregates.
    pub fn height_m(&self) -> Option<(f64, HeightSource)> {
        let roof = self.roof_elevation_m?;
        match self.ground_elevation_m {
            Some(ground) => valid(roof - ground).map(|h| (h, HeightSource::RoofMinusGround)),
            None => valid(roof).map(|h| (h, HeightSource::RoofOnly)),
        }
    }

    /// Derived footprint in m²: explicit column, else geometry area.
    pub fn footprint_m2(&self) -> Option<(f64, FootprintSource)> {
        if let Some(area) = self.footprint_area_m2 {
            return valid(area).map(|a| (a, FootprintSource::Column));
        }
        valid(self.geometry.unsigned_area()).map(|a| (a, FootprintSource::GeometryArea))
    }

    /// Derived volume in m³: best available LoD column, else footprint × height.
    pub fn volume_m3(&self) -> Option<(f64, VolumeSource)> {
        const LOD_SOURCES: [VolumeSource; 3] =
            [VolumeSource::Lod22, VolumeSource::Lod13, VolumeSource::Lod12];

        for (value, source) in self.volume_lod_m3.iter().zip(LOD_SOURCES) {
            if let Some(v) = value.and_then(valid) {
                return Some((v, source));
            }
        }

        let (footprint, _) = self.footprint_m2()?;
        let (height, _) = self.height_m()?;
        valid(footprint * height).map(|v| (v, VolumeSource::FootprintTimesHeight))
    }
}
