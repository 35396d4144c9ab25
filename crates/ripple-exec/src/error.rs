use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    /// A wrapped submission was made while no blocking guard was reachable.
    #[error("`{action}` was submitted wrapped, but no blocking guard is configured")]
    MissingGuard { action: &'static str },

    /// The engine was cleaned up while this entry was still queued.
    #[error("`{action}` was cleaned up while queued")]
    QueuedActionAborted { action: &'static str },

    /// The action's own logic returned an error.
    #[error("`{action}` failed: {cause:#}")]
    ActionFailed {
        action: &'static str,
        cause: anyhow::Error,
    },
}

impl ExecError {
    pub fn action(&self) -> &'static str {
        match self {
            ExecError::MissingGuard { action }
            | ExecError::QueuedActionAborted { action }
            | ExecError::ActionFailed { action, .. } => action,
        }
    }
}
