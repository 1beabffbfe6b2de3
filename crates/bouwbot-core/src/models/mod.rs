pub mod building;
pub mod chat;
pub mod tool;

pub use building::{BuildingRecord, FootprintSource, HeightSource, VolumeSource};
pub use chat::{ChatMessage, ConversationState, Role};
pub use tool::{LayerDescriptor, MapPayload, Stats, TallestBuilding, ToolResult};
