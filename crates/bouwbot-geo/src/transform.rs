//! CRS transformation between geographic WGS84 and the projected metric CRS.
//!
//! The query pipeline works in projected meters (RD New for the Utrecht
//! dataset) while the renderer and all tool inputs speak WGS84 lat/lon, so
//! every query point goes in through [`CrsTransformer::metric_point`] and
//! every exported geometry comes back out through
//! [`CrsTransformer::geographic_geometry`].

use bouwbot_core::error::{BouwbotError, Result};
use geo::algorithm::map_coords::MapCoords;
use geo::{Coord, Geometry, Point};
use proj::Proj;

/// EPSG code of the geographic CRS used by tool inputs and map output.
pub const GEOGRAPHIC_EPSG: u32 = 4326;

/// Bidirectional transformer between WGS84 and one projected metric CRS.
///
/// `Proj::new_known_crs` normalizes axis order for visualization, so both
/// directions take and return (x, y) = (lon, lat) for the geographic side.
pub struct CrsTransformer {
    to_metric: Proj,
    to_geographic: Proj,
    metric_epsg: u32,
}

impl CrsTransformer {
    pub fn new(metric_epsg: u32) -> Result<Self> {
        let geographic = format!("EPSG:{}", GEOGRAPHIC_EPSG);
        let metric = format!("EPSG:{}", metric_epsg);

        let to_metric = Proj::new_known_crs(&geographic, &metric, None).map_err(|e| {
            BouwbotError::Projection {
                reason: format!("cannot build {} -> {} transform: {}", geographic, metric, e),
            }
        })?;
        let to_geographic = Proj::new_known_crs(&metric, &geographic, None).map_err(|e| {
            BouwbotError::Projection {
                reason: format!("cannot build {} -> {} transform: {}", metric, geographic, e),
            }
        })?;

        Ok(Self { to_metric, to_geographic, metric_epsg })
    }

    pub fn metric_epsg(&self) -> u32 {
        self.metric_epsg
    }

    /// Project a geographic point into the metric CRS.
    pub fn metric_point(&self, lat: f64, lon: f64) -> Result<Point<f64>> {
        let (x, y) = self.to_metric.convert((lon, lat)).map_err(|e| BouwbotError::Projection {
            reason: format!("cannot project ({}, {}) to EPSG:{}: {}", lat, lon, self.metric_epsg, e),
        })?;
        Ok(Point::new(x, y))
    }

    /// Unproject a metric point back to geographic (lat, lon).
    pub fn geographic_point(&self, point: Point<f64>) -> Result<(f64, f64)> {
        let (lon, lat) =
            self.to_geographic.convert((point.x(), point.y())).map_err(|e| {
                BouwbotError::Projection {
                    reason: format!("cannot unproject ({}, {}): {}", point.x(), point.y(), e),
                }
            })?;
        Ok((lat, lon))
    }

    /// Reproject a whole geometry from geographic into metric coordinates.
    pub fn metric_geometry(&self, geometry: &Geometry<f64>) -> Result<Geometry<f64>> {
        map_geometry(geometry, &self.to_metric)
    }

    /// Reproject a whole geometry from metric back into geographic coordinates.
    pub fn geographic_geometry(&self, geometry: &Geometry<f64>) -> Result<Geometry<f64>> {
        map_geometry(geometry, &self.to_geographic)
    }
}

/// Reproject a geometry between two arbitrary EPSG codes. Used at dataset
/// load time when the source layer is not already in the canonical metric CRS.
pub fn reproject_geometry(
    geometry: &Geometry<f64>,
    from_epsg: u32,
    to_epsg: u32,
) -> Result<Geometry<f64>> {
    if from_epsg == to_epsg {
        return Ok(geometry.clone());
    }

    let from = format!("EPSG:{}", from_epsg);
    let to = format!("EPSG:{}", to_epsg);
    let proj = Proj::new_known_crs(&from, &to, None).map_err(|e| BouwbotError::Projection {
        reason: format!("cannot build {} -> {} transform: {}", from, to, e),
    })?;
    map_geometry(geometry, &proj)
}

fn map_geometry(geometry: &Geometry<f64>, proj: &Proj) -> Result<Geometry<f64>> {
    geometry.try_map_coords(|Coord { x, y }| {
        proj.convert((x, y))
            .map(|(x, y)| Coord { x, y })
            .map_err(|e| BouwbotError::Projection { reason: format!("projection failed: {}", e) })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    const RD_NEW: u32 = 28992;

    // Utrecht Dom tower, a well-surveyed RD New reference point
    const DOM_LAT: f64 = 52.0907;
    const DOM_LON: f64 = 5.1214;

    #[test]
    fn utrecht_projects_into_rd_new_bounds() {
        let transformer = CrsTransformer::new(RD_NEW).unwrap();
        let p = transformer.metric_point(DOM_LAT, DOM_LON).unwrap();

        // RD New coordinates for Utrecht sit near (136600, 455800)
        assert!((p.x() - 136_600.0).abs() < 500.0, "x = {}", p.x());
        assert!((p.y() - 455_800.0).abs() < 500.0, "y = {}", p.y());
    }

    #[test]
    fn round_trip_is_stable_within_a_centimeter() {
        let transformer = CrsTransformer::new(RD_NEW).unwrap();
        let p = transformer.metric_point(DOM_LAT, DOM_LON).unwrap();
        let (lat, lon) = transformer.geographic_point(p).unwrap();

        assert!((lat - DOM_LAT).abs() < 1e-7);
        assert!((lon - DOM_LON).abs() < 1e-7);
    }

    #[test]
    fn geometry_reprojection_preserves_shape() {
        let transformer = CrsTransformer::new(RD_NEW).unwrap();

        let square = Geometry::Polygon(polygon![
            (x: 136_600.0, y: 455_800.0),
            (x: 136_700.0, y: 455_800.0),
            (x: 136_700.0, y: 455_900.0),
            (x: 136_600.0, y: 455_900.0),
            (x: 136_600.0, y: 455_800.0),
        ]);

        let geographic = transformer.geographic_geometry(&square).unwrap();
        let Geometry::Polygon(poly) = &geographic else {
            panic!("geometry type must survive reprojection");
        };
        // All corners end up in the Netherlands
        for coord in poly.exterior().coords() {
            assert!(coord.x > 3.0 && coord.x < 8.0, "lon {}", coord.x);
            assert!(coord.y > 50.0 && coord.y < 54.0, "lat {}", coord.y);
        }
    }
}
