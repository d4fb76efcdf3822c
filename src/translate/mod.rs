//! API translation between the Anthropic Messages format and Azure OpenAI Chat Completions.
//!
//! The core of the proxy: converts requests, responses, and streaming events
//! between the two API formats. All translation functions are pure (no I/O).

pub mod anthropic_types;
pub mod messages;
pub mod openai_types;
pub mod request;
pub mod response;
pub mod streaming;
pub mod tools;

pub use request::build_destination_request;
pub use response::convert_response;
pub use streaming::{reframe_stream, Reframer};
