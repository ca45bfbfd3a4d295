//! Error types for the attribution pipeline

use std::time::Duration;

use thiserror::Error;

use crate::provider::{Capability, ProviderKind};

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing credential for {provider}: set {env_var}")]
    MissingCredential {
        provider: ProviderKind,
        env_var: String,
    },

    #[error("Unknown chain: {0} (supported: ethereum, polygon, bsc, arbitrum, optimism)")]
    UnknownChain(String),

    #[error("Unknown provider: {0} (expected auto, covalent, ethplorer or explorer)")]
    UnknownProvider(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    // Input file errors
    #[error("Input error: {0}")]
    Input(String),

    // Data provider errors
    #[error(transparent)]
    Provider(#[from] ProviderError),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// Check if this error comes from bad user input or configuration
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::MissingCredential { .. }
                | Error::UnknownChain(_)
                | Error::UnknownProvider(_)
                | Error::InvalidAddress(_)
        )
    }
}

/// Failure of a single provider call, or of a whole capability after fallback
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("{provider} request failed: {message}")]
    Network {
        provider: ProviderKind,
        message: String,
    },

    #[error("{provider} request timed out")]
    Timeout { provider: ProviderKind },

    #[error("{provider} rate limit reached")]
    RateLimited {
        provider: ProviderKind,
        retry_after: Option<Duration>,
    },

    #[error("{provider} server error {status}: {body}")]
    Server {
        provider: ProviderKind,
        status: u16,
        body: String,
    },

    #[error("{provider} rejected request ({status}): {body}")]
    Client {
        provider: ProviderKind,
        status: u16,
        body: String,
    },

    #[error("{provider} returned a malformed response: {message}")]
    Malformed {
        provider: ProviderKind,
        message: String,
    },

    #[error("{provider} value for {field} cannot be represented exactly: {value}")]
    PrecisionLoss {
        provider: ProviderKind,
        field: String,
        value: String,
    },

    #[error("{provider} does not support {capability} on {chain}")]
    Unsupported {
        provider: ProviderKind,
        capability: Capability,
        chain: String,
    },

    #[error("no configured provider supports {capability} on {chain}")]
    NoEligibleProvider { capability: Capability, chain: String },

    #[error("all providers failed for {capability}: {}", .failures.join("; "))]
    AllProvidersFailed {
        capability: Capability,
        failures: Vec<String>,
    },
}

impl ProviderError {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Network { .. }
                | ProviderError::Timeout { .. }
                | ProviderError::RateLimited { .. }
                | ProviderError::Server { .. }
        )
    }

    /// Provider-suggested delay before the next attempt
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn malformed(provider: ProviderKind, message: impl Into<String>) -> Self {
        ProviderError::Malformed {
            provider,
            message: message.into(),
        }
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from csv errors
impl From<csv::Error> for Error {
    fn from(e: csv::Error) -> Self {
        Error::Input(e.to_string())
    }
}

// Conversion from config errors
impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::Config(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
