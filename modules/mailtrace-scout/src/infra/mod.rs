pub mod politeness;
pub mod run_log;

pub use politeness::PolitenessDelay;
pub use run_log::{EventKind, RunLog};
