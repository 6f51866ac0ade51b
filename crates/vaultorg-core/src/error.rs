// Error taxonomy for the membership core.
//
// Every variant carries the user-facing message verbatim; transport layers
// map variants to status codes without inspecting message text.

use std::fmt;

/// Outcome of the saga's compensation pass, carried inside
/// [`OrgError::Compensated`] so callers can tell "compensation ran clean"
/// apart from "compensation itself failed" without downcasting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompensationOutcome {
    Reverted,
    Failed(String),
}

impl fmt::Display for CompensationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reverted => write!(f, "compensation reverted"),
            Self::Failed(msg) => write!(f, "compensation failed: {msg}"),
        }
    }
}

/// Unified error type for all membership-core operations.
#[derive(Debug, thiserror::Error)]
pub enum OrgError {
    /// Bad input shape. Surfaced before any side effect is attempted.
    #[error("{0}")]
    Validation(String),

    /// The permission policy evaluator rejected the action.
    #[error("{0}")]
    AuthorizationDenied(String),

    /// The plan forbids the requested seat/service-account growth.
    #[error("{0}")]
    PlanLimitExceeded(String),

    /// Seats can only be added through the autoscaling path, never subtracted.
    #[error("{0}")]
    NegativeAdjustmentNotAllowed(String),

    /// Secrets Manager seats would exceed Password Manager seats.
    #[error("{0}")]
    SmSeatsExceedPasswordManagerSeats(String),

    /// A structural invariant (e.g. last confirmed owner) blocks this mutation.
    #[error("{0}")]
    InvariantViolation(String),

    #[error("{0} not found")]
    NotFound(String),

    /// Propagated from a repository collaborator, unchanged and unretried.
    #[error("storage error: {0}")]
    Storage(String),

    /// Propagated from a mail/event/payment collaborator.
    #[error("transport error: {0}")]
    Transport(String),

    /// A downstream step failed after seats were confirmed; the orchestrator
    /// ran compensation before raising this aggregate.
    #[error("{source} ({compensation})")]
    Compensated {
        source: Box<OrgError>,
        compensation: CompensationOutcome,
    },
}

impl OrgError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn denied(msg: impl Into<String>) -> Self {
        Self::AuthorizationDenied(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// The message shown to the end user for this error.
    pub fn user_message(&self) -> String {
        match self {
            Self::Compensated { source, .. } => source.user_message(),
            other => other.to_string(),
        }
    }
}

/// Unified result type for membership-core operations.
pub type Result<T> = std::result::Result<T, OrgError>;
