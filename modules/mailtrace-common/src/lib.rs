pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, ScoutSettings};
pub use error::MailtraceError;
pub use types::*;
