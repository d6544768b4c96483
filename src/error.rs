//! Crate-wide error type.
//!
//! Every variant is fatal for the operation that raised it: serialization,
//! deserialization and argument flattening never return partial results.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    /// A value in a property graph has no wire mapping.
    #[error("type '{type_name}' is not a supported argument type\n\t{context}")]
    UnsupportedType { type_name: String, context: String },

    /// The engine sent a wire value of an unexpected shape (version skew).
    #[error("malformed wire value: {0}")]
    MalformedWire(String),

    /// A raw pending computation was placed directly in a property graph.
    #[error(
        "pending computations are not allowed inside resource arguments, wrap it in an Output\n\t{0}"
    )]
    LeakedPendingComputation(String),

    /// A required argument attribute resolved to an absent value.
    #[error("missing required attribute '{attribute}'\n\t{context}")]
    MissingRequiredAttribute { attribute: String, context: String },

    #[error("invalid format template: {0}")]
    InvalidTemplate(String),

    #[error("invalid URN '{0}'")]
    InvalidUrn(String),

    #[error("invoke of '{token}' failed: {reasons}")]
    InvokeFailed { token: String, reasons: String },

    /// The monitor transport failed.
    #[error("monitor error: {0}")]
    Monitor(String),

    /// The user program (or one of its registrations) failed.
    #[error("program error: {0}")]
    Program(String),

    #[error("JSON error: {0}")]
    Json(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}

impl Error {
    /// True for errors raised while walking a property graph.
    pub fn is_serialization(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedType { .. }
                | Self::LeakedPendingComputation(_)
                | Self::MissingRequiredAttribute { .. }
        )
    }
}
