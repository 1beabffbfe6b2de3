//! The BouwBot query engine: dataset store, buffer queries with derived
//! building metrics, GeoJSON export, geocoding, and the tool registry the
//! chat orchestrator dispatches into.

pub mod export;
pub mod geocode;
pub mod query;
pub mod store;
pub mod tools;

pub use export::GeoJsonExporter;
pub use geocode::Geocoder;
pub use query::BufferQueryEngine;
pub use store::{BuildingStore, StoreCache};
pub use tools::{tool_catalog, ToolName, ToolRouter};
