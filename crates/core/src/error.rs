//! Errors raised by the evaluation context.
//!
//! Every variant here is fatal for the current evaluation pass: callers
//! propagate it instead of degrading to a soft failure.

/// An invariant violation inside the class or variable tables.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    #[error("cannot negate the reserved class '{class}'")]
    HardClassNegation { class: String },

    #[error("class '{class}' is hard and cannot be redefined as soft")]
    HardClassConflict { class: String },

    #[error("no active bundle frame to hold local class '{class}'")]
    NoActiveFrame { class: String },

    #[error("invalid variable reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },
}

impl ContextError {
    pub(crate) fn invalid_reference(reference: &str, reason: impl Into<String>) -> Self {
        ContextError::InvalidReference {
            reference: reference.to_string(),
            reason: reason.into(),
        }
    }
}
