use thiserror::Error;

#[derive(Error, Debug)]
pub enum MailtraceError {
    #[error("Configuration error: {0}")]
    Config(String),
}
