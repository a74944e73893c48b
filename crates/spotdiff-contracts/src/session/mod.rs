mod summary;
mod tally;

pub use summary::{write_summary, SessionSummary};
pub use tally::{RoundTally, MISSES_BEFORE_REVEAL};
