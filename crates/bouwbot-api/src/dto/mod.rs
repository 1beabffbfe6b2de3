mod request;
mod response;

pub use request::{ChatRequestBody, SessionQuery};
pub use response::{ChatResponseBody, HealthResponse, HistoryResponse, MapView, ResetResponse};
