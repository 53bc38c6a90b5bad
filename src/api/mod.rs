pub mod client;
pub mod extract;
pub mod logging;
pub mod sse;

pub use client::{ChatRequest, RelayClient};
pub use extract::{ExtractorEvent, JsonFieldExtractor};
pub use sse::{SseEvent, SseParser};
