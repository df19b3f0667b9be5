//! Error types and result handling for amqp-producer.
//!
//! This module defines the main error type [`Error`] and a convenience
//! [`Result`] type alias used throughout the crate.
//!
//! Errors fall into two families that callers usually want to tell apart:
//! validation failures, raised before anything touches the broker, and
//! transport failures, passed through from the broker collaborators.
//!
//! # Example
//!
//! ```rust
//! use amqp_producer::{Error, Result};
//!
//! fn check_payload() -> Result<()> {
//!     Err(Error::Validation("payload is empty".to_string()))
//! }
//!
//! match check_payload() {
//!     Ok(()) => println!("Valid"),
//!     Err(e) if e.is_validation() => eprintln!("Fix the payload: {}", e),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use thiserror::Error;

/// The main error type for amqp-producer operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error, from a config file or environment variables.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// The message was rejected by the installed schema validator.
    ///
    /// Raised before fabric setup or dispatch; nothing reached the broker.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A validator could not be built from the supplied schema.
    #[error("Schema error: {message}")]
    Schema {
        /// Why the schema was refused
        message: String,
    },

    /// AMQP client or channel error.
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    /// Broker-side failure not covered by the AMQP client error,
    /// e.g. a negative publisher confirm.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A message property cannot be represented on the wire.
    #[error("Invalid property '{property}': {message}")]
    Encoding {
        /// Name of the offending property
        property: String,
        /// Description of what was wrong with its value
        message: String,
    },

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error, typically from reading schema or body files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true if the publish was stopped by the validation gate.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    /// Returns true if the error came from the broker side: fabric setup,
    /// property encoding or the send itself.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Amqp(_) | Error::Transport(_) | Error::Encoding { .. }
        )
    }
}

/// A convenient Result type alias for amqp-producer operations.
///
/// This is equivalent to `std::result::Result<T, amqp_producer::Error>`.
pub type Result<T> = std::result::Result<T, Error>;
