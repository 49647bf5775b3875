//! Guards that run an action at most once.
//!
//! [`Once`] is bound to a single action when it's created; [`OnceSet`] is
//! handed an action (and a key identifying it) on every call and remembers
//! which keys it has already run. Both are plain `&mut self` state
//! machines. [`SyncOnce`] and [`SyncOnceSet`] are their thread-safe
//! counterparts.
//!
//! Every guarded action moves from [`State::Pending`] to [`State::Done`] the
//! first time it runs and never goes back. Calls made after that are silently
//! ignored. What happens when the action itself fails has no sensible
//! default, so every guard is created with an explicit [`FailurePolicy`].
//!
//! ```rust
//! # use eloquent_once::{FailurePolicy, Once};
//! let mut count = 0;
//! let mut increment = Once::new(|| count += 1, FailurePolicy::Retry);
//! for _ in 0..5 {
//!     increment.call();
//! }
//! drop(increment);
//! assert_eq!(count, 1);
//! ```

mod error;
pub mod set;
pub mod single;
pub mod sync;

pub use error::GuardError;
pub use set::{ActionId, OnceSet};
pub use single::Once;
pub use sync::{SyncOnce, SyncOnceSet};

/// Where a guarded action is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum State {
    /// The action hasn't run yet (or its last run failed and may be retried).
    Pending,
    /// The action has run. This is terminal.
    Done,
}

/// What a guard does with an action whose run fails (by returning `Err` from
/// one of the `try_*` methods, or by panicking).
///
/// Guards take the policy as a constructor argument; there is no default.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// The action is marked done before it starts, so it never runs again,
    /// even if this run failed.
    Consume,
    /// The action is only marked done once it succeeds. A failed run leaves it
    /// pending and the next call tries again.
    Retry,
}

impl FailurePolicy {
    /// The state an action is left in after a failed run.
    pub fn state_after_failure(self) -> State {
        match self {
            FailurePolicy::Consume => State::Done,
            FailurePolicy::Retry => State::Pending,
        }
    }

    /// Whether the action is marked done before running (rather than after
    /// succeeding).
    fn marks_before_run(self) -> bool {
        self == FailurePolicy::Consume
    }

    fn wrap_error<E>(self, error: E) -> GuardError<E> {
        match self {
            FailurePolicy::Consume => GuardError::Consumed(error),
            FailurePolicy::Retry => GuardError::Retryable(error),
        }
    }
}
