//! Geometry support for the buffer-query engine: coordinate transforms
//! between geographic and projected metric space, disc buffers, and the
//! bounding-box spatial index used for candidate pre-filtering.

pub mod buffer;
pub mod index;
pub mod transform;

pub use buffer::QueryBuffer;
pub use index::SpatialIndex;
pub use transform::{CrsTransformer, GEOGRAPHIC_EPSG};
