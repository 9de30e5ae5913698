use thiserror::Error;

/// Errors returned by [`SignalHandler`](crate::SignalHandler) operations.
///
/// Operations addressed to a subject or observer that has no registration are
/// silent no-ops, not errors.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// A main-thread-only operation was called from another thread. Nothing was changed.
    #[error("{operation} must be called on the main thread")]
    WrongThread { operation: &'static str },

    /// The observer was dropped before the message could be posted to it
    #[error("observer is gone")]
    ObserverGone,
}

impl DispatchError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            DispatchError::WrongThread { .. } => "wrong_thread",
            DispatchError::ObserverGone => "observer_gone",
        }
    }
}
