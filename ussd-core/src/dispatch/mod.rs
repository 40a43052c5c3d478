//! Inbound read loop and the per-event responder it fans out to.

mod dispatcher;
mod responder;

pub use dispatcher::{DispatchTiming, Dispatcher};
pub use responder::{DialogOutcome, Responder};
