//! Disc-shaped query buffers in the projected metric CRS.

use geo::{Coord, Geometry, Intersects, LineString, Point, Polygon};

/// Number of segments used to approximate the disc. At 64 segments the
/// chord error stays below 0.13% of the radius.
const BUFFER_SEGMENTS: usize = 64;

/// A disc of `radius_m` meters around a projected point, used as the
/// intersection predicate for buffer queries. Constructed fresh per query
/// call, never persisted.
#[derive(Debug, Clone)]
pub struct QueryBuffer {
    center: Point<f64>,
    radius_m: f64,
    polygon: Polygon<f64>,
}

impl QueryBuffer {
    /// Build the disc around a point already expressed in the metric CRS.
    pub fn new(center: Point<f64>, radius_m: f64) -> Self {
        let ring: Vec<Coord<f64>> = (0..=BUFFER_SEGMENTS)
            .map(|i| {
                let angle = std::f64::consts::TAU * (i as f64) / (BUFFER_SEGMENTS as f64);
                Coord {
                    x: center.x() + radius_m * angle.cos(),
                    y: center.y() + radius_m * angle.sin(),
                }
            })
            .collect();

        Self {
            center,
            radius_m,
            polygon: Polygon::new(LineString::from(ring), vec![]),
        }
    }

    pub fn center(&self) -> Point<f64> {
        self.center
    }

    pub fn radius_m(&self) -> f64 {
        self.radius_m
    }

    pub fn polygon(&self) -> &Polygon<f64> {
        &self.polygon
    }

    /// Tight bounding box of the disc (not of the polygon approximation),
    /// used for the spatial-index pre-filter.
    pub fn envelope(&self) -> ([f64; 2], [f64; 2]) {
        (
            [self.center.x() - self.radius_m, self.center.y() - self.radius_m],
            [self.center.x() + self.radius_m, self.center.y() + self.radius_m],
        )
    }

    /// Exact intersection test against a candidate geometry.
    pub fn intersects(&self, geometry: &Geometry<f64>) -> bool {
        self.polygon.intersects(geometry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;
    use proptest::prelude::*;

    fn square_at(x: f64, y: f64, size: f64) -> Geometry<f64> {
        Geometry::Polygon(polygon![
            (x: x, y: y),
            (x: x + size, y: y),
            (x: x + size, y: y + size),
            (x: x, y: y + size),
            (x: x, y: y),
        ])
    }

    #[test]
    fn ring_is_closed_and_on_the_circle() {
        let buffer = QueryBuffer::new(Point::new(1000.0, 2000.0), 250.0);
        let ring = buffer.polygon().exterior();

        assert_eq!(ring.0.first(), ring.0.last());
        for coord in ring.coords() {
            let d = ((coord.x - 1000.0).powi(2) + (coord.y - 2000.0).powi(2)).sqrt();
            assert!((d - 250.0).abs() < 1e-6);
        }
    }

    #[test]
    fn intersects_nearby_square_but_not_distant_one() {
        let buffer = QueryBuffer::new(Point::new(0.0, 0.0), 250.0);

        // Overlapping the disc edge
        assert!(buffer.intersects(&square_at(200.0, -10.0, 20.0)));
        // Well outside
        assert!(!buffer.intersects(&square_at(1000.0, 1000.0, 20.0)));
    }

    #[test]
    fn envelope_is_center_plus_minus_radius() {
        let buffer = QueryBuffer::new(Point::new(100.0, -50.0), 30.0);
        let (min, max) = buffer.envelope();
        assert_eq!(min, [70.0, -80.0]);
        assert_eq!(max, [130.0, -20.0]);
    }

    proptest! {
        #[test]
        fn polygon_stays_inside_envelope(radius in 1.0f64..15_000.0, cx in -1e5f64..1e5, cy in -1e5f64..1e5) {
            let buffer = QueryBuffer::new(Point::new(cx, cy), radius);
            let (min, max) = buffer.envelope();
            for coord in buffer.polygon().exterior().coords() {
                prop_assert!(coord.x >= min[0] - 1e-6 && coord.x <= max[0] + 1e-6);
                prop_assert!(coord.y >= min[1] - 1e-6 && coord.y <= max[1] + 1e-6);
            }
        }
    }
}
