//! Query-time machinery: candidate compilation, exact verification, and the
//! online executor.

pub mod compile;
pub mod executor;
pub mod verify;

pub use compile::compile;
pub use executor::{highlight, ConcordanceLine, Executor};
pub use verify::{verify_at, MatchResult};
