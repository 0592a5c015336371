//! Backend HTTP API clients
//!
//! These cover the sessionless paths: chat completions when no realtime
//! session is active, and image analysis. Both stream their replies and
//! report progress back to the runtime as [`ApiUpdate`] messages keyed by
//! the transcript entry they belong to.

pub mod chat;
pub mod sse;
pub mod vision;

use crate::cost::CostRecord;

/// Progress of one streamed API exchange
#[derive(Debug)]
pub enum ApiUpdate {
    /// A streamed content chunk to append
    Chunk(String),
    /// The exchange finished; `final_text` replaces the streamed content
    /// when the server sent an authoritative result
    Done {
        final_text: Option<String>,
        cost: Option<CostRecord>,
    },
    /// The exchange failed with no usable content
    Failed(String),
}
