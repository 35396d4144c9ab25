use thiserror::Error;

/// Errors raised by state containers.
///
/// Validator rejection is not represented here: it is reported through
/// [`SetOutcome::Rejected`](crate::SetOutcome) and the optional rejection
/// callback, never as an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("state `{label}` was accessed before it was initialized")]
    UninitializedAccess { label: String },
}

pub type StateResult<T> = Result<T, StateError>;
