pub mod handler;

pub use handler::{consume_response_stream, map_llm_error, PassOutcome};
