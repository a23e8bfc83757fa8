//! Shared validation errors for hub schemas.

use thiserror::Error;

/// Result alias for schema validation.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Errors raised while validating wire payloads into typed schemas.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The payload could not be decoded into the target schema.
    #[error("invalid {schema} payload: {source}")]
    Decode {
        /// Schema the payload was validated against.
        schema: &'static str,
        /// Underlying serde failure.
        source: serde_json::Error,
    },

    /// A required field was present but unusable.
    #[error("invalid {schema} field `{field}`: {reason}")]
    Field {
        /// Schema the payload was validated against.
        schema: &'static str,
        /// Offending field name (wire casing).
        field: &'static str,
        /// Human-readable reason for rejection.
        reason: String,
    },
}

impl ValidationError {
    /// Convenience constructor for decode failures.
    #[must_use]
    pub fn decode(schema: &'static str, source: serde_json::Error) -> Self {
        Self::Decode { schema, source }
    }

    /// Convenience constructor for field-level failures.
    #[must_use]
    pub fn field(schema: &'static str, field: &'static str, reason: impl Into<String>) -> Self {
        Self::Field {
            schema,
            field,
            reason: reason.into(),
        }
    }
}
