pub mod extractor;
pub mod features;
pub mod fetcher;
pub mod infra;
pub mod io;
pub mod judge;
pub mod memory;
pub mod oracle;
pub mod planner;
pub mod reflector;
pub mod resolver;
pub mod runner;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;
