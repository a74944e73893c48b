//! Card generation and prefetching for the spot-the-difference game.

pub mod assembler;
pub mod backend;
pub mod config;
pub mod dryrun;
pub mod gemini;
pub mod generators;
pub mod native;
pub mod prefetch;
pub mod retry;

#[cfg(test)]
mod test_support;

pub use assembler::MultiSetAssembler;
pub use backend::{
    decode_data_url, is_retry_worthy, GenerationBackend, GenerationError, GenerationErrorKind,
    ImagePayload, ImageRequest, Scenario,
};
pub use config::EngineConfig;
pub use generators::CardGenerator;
pub use native::{BackendPlan, NativeBackend};
pub use prefetch::{BufferMode, PrefetchBuffer, SlotStatus};
pub use retry::{with_retry, RetryPolicy};
