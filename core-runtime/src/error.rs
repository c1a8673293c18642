use thiserror::Error;

/// Failures while assembling the runtime a sync engine runs in.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid sync configuration: {0}")]
    Config(String),

    /// A service's credentials are present but cannot be used.
    #[error("Unusable {service} credentials: {reason}")]
    Credentials { service: String, reason: String },

    /// The host did not provide a bridge the engine needs.
    #[error("Missing host bridge {capability}: {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("HTTP client unavailable: {0}")]
    HttpClient(String),
}

pub type Result<T> = std::result::Result<T, Error>;
