/// A guarded action failed.
///
/// The variant records what the failure did to the guard, according to its
/// [`FailurePolicy`](crate::FailurePolicy).
#[derive(Debug, thiserror::Error)]
pub enum GuardError<E> {
    /// The action is now done and won't run again.
    #[error("guarded action failed and has been consumed")]
    Consumed(#[source] E),
    /// The action is still pending; calling the guard again re-runs it.
    #[error("guarded action failed and may be retried")]
    Retryable(#[source] E),
}

impl<E> GuardError<E> {
    pub fn is_retryable(&self) -> bool {
        matches!(self, GuardError::Retryable(_))
    }

    /// The error returned by the action.
    pub fn inner(&self) -> &E {
        match self {
            GuardError::Consumed(e) | GuardError::Retryable(e) => e,
        }
    }

    pub fn into_inner(self) -> E {
        match self {
            GuardError::Consumed(e) | GuardError::Retryable(e) => e,
        }
    }
}
