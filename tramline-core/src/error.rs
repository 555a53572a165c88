//! Core error types for Tramline.

use thiserror::Error;

/// Core error type for Tramline configuration and models.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A certificate pin could not be parsed.
    #[error("Invalid certificate pin for {host}: {pin}")]
    InvalidPin {
        /// Host the pin was configured for.
        host: String,
        /// The offending pin string.
        pin: String,
    },

    /// A URL could not be parsed.
    #[error("Invalid URL {url}: {source}")]
    InvalidUrl {
        /// The URL as given.
        url: String,
        /// Parser error.
        #[source]
        source: url::ParseError,
    },

    /// Reading or writing a config file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
