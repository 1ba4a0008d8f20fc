//! Error types for the dose_core library.

use crate::DoseInstance;
use std::io;
use uuid::Uuid;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for dose_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// State management error
    #[error("State error: {0}")]
    State(String),

    /// The dose already carries a terminal log entry.
    ///
    /// `existing` is the instance as currently logged, so the caller can
    /// show what was recorded instead of retrying.
    #[error("Dose {instance_id} already logged as {}", existing.status)]
    AlreadyLogged {
        instance_id: Uuid,
        existing: Box<DoseInstance>,
    },

    /// A log request named a status that is not taken/missed/skipped
    #[error("Invalid dose status: {0}")]
    InvalidStatus(String),

    /// No dose instance with this id is known
    #[error("Unknown dose instance: {0}")]
    UnknownInstance(Uuid),

    /// No medication order with this id is known
    #[error("Unknown medication order: {0}")]
    UnknownOrder(String),

    /// An order was resubmitted with a different start date or frequency
    #[error("Order {0} changed after doses were scheduled; create a new order instead")]
    OrderConflict(String),
}
