//! Thread-safe guards.
//!
//! These take `&self`, so they can be shared between threads (e.g. in an
//! `Arc` or a `static`). Deciding whether a call gets to run the action is a
//! single critical section, so at most one caller ever runs it. The action
//! itself runs outside that critical section: a call made while the action is
//! running (from another thread, or re-entrantly from the action) is ignored
//! rather than blocked.

use std::{
    collections::HashMap,
    hash::Hash,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::{FailurePolicy, GuardError, State, set::ActionId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Progress {
    Pending,
    /// Claimed by a caller under the "retry" policy; goes back to `Pending` if
    /// the run fails.
    Running,
    Done,
}

impl Progress {
    /// `Running` only happens under the "retry" policy, where the action
    /// isn't done until it succeeds.
    fn state(self) -> State {
        match self {
            Progress::Pending | Progress::Running => State::Pending,
            Progress::Done => State::Done,
        }
    }
}

// The guarded state is only ever written in one step, so a panic while holding
// the lock can't leave it inconsistent.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A thread-safe [`Once`](crate::Once).
///
/// # Examples
///
/// ```rust
/// # use std::sync::atomic::{AtomicUsize, Ordering};
/// # use eloquent_once::{FailurePolicy, SyncOnce};
/// static COUNT: AtomicUsize = AtomicUsize::new(0);
/// let init = SyncOnce::new(|| COUNT.fetch_add(1, Ordering::SeqCst), FailurePolicy::Consume);
///
/// std::thread::scope(|s| {
///     for _ in 0..8 {
///         s.spawn(|| init.call());
///     }
/// });
/// assert_eq!(COUNT.load(Ordering::SeqCst), 1);
/// ```
#[derive(Debug)]
pub struct SyncOnce<F> {
    progress: Mutex<Progress>,
    action: Mutex<F>,
    policy: FailurePolicy,
}

impl<F> SyncOnce<F> {
    /// Guards `action` under `policy`. This is a `const fn` so that
    /// process-wide guards can live in a `static`.
    pub const fn new(action: F, policy: FailurePolicy) -> Self {
        SyncOnce {
            progress: Mutex::new(Progress::Pending),
            action: Mutex::new(action),
            policy,
        }
    }

    /// Under [`FailurePolicy::Consume`] the action counts as done as soon as a
    /// caller claims it, so this reports [`State::Done`] while the action is
    /// still running. Under [`FailurePolicy::Retry`] it reports
    /// [`State::Pending`] until the action has succeeded.
    pub fn state(&self) -> State {
        lock(&self.progress).state()
    }

    /// See [`SyncOnce::state`] for what "done" means while the action runs.
    pub fn is_done(&self) -> bool {
        *lock(&self.progress) == Progress::Done
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    fn claim(&self) -> bool {
        let mut progress = lock(&self.progress);
        match *progress {
            Progress::Pending => {
                log::debug!("running guarded action ({:?})", self.policy);
                *progress = if self.policy.marks_before_run() {
                    Progress::Done
                } else {
                    Progress::Running
                };
                true
            }
            Progress::Running | Progress::Done => {
                log::trace!("guarded action already claimed, ignoring call");
                false
            }
        }
    }

    fn settle(&self, succeeded: bool) {
        let mut progress = lock(&self.progress);
        *progress = if succeeded || self.policy.marks_before_run() {
            Progress::Done
        } else {
            log::debug!("guarded action failed, it may be retried");
            Progress::Pending
        };
    }

    pub fn call<R>(&self) -> Option<R>
    where
        F: FnMut() -> R,
    {
        if !self.claim() {
            return None;
        }
        let mut succeeded = scopeguard::guard(false, |ok| self.settle(ok));
        let ret = (*lock(&self.action))();
        *succeeded = true;
        Some(ret)
    }

    pub fn invoke<A, R>(&self, args: A) -> Option<R>
    where
        F: FnMut(A) -> R,
    {
        if !self.claim() {
            return None;
        }
        let mut succeeded = scopeguard::guard(false, |ok| self.settle(ok));
        let ret = (*lock(&self.action))(args);
        *succeeded = true;
        Some(ret)
    }

    pub fn try_call<R, E>(&self) -> Result<Option<R>, GuardError<E>>
    where
        F: FnMut() -> Result<R, E>,
    {
        if !self.claim() {
            return Ok(None);
        }
        let mut succeeded = scopeguard::guard(false, |ok| self.settle(ok));
        let result = (*lock(&self.action))();
        *succeeded = result.is_ok();
        result.map(Some).map_err(|e| self.policy.wrap_error(e))
    }

    pub fn try_invoke<A, R, E>(&self, args: A) -> Result<Option<R>, GuardError<E>>
    where
        F: FnMut(A) -> Result<R, E>,
    {
        if !self.claim() {
            return Ok(None);
        }
        let mut succeeded = scopeguard::guard(false, |ok| self.settle(ok));
        let result = (*lock(&self.action))(args);
        *succeeded = result.is_ok();
        result.map(Some).map_err(|e| self.policy.wrap_error(e))
    }
}

/// A thread-safe [`OnceSet`](crate::OnceSet).
#[derive(Debug)]
pub struct SyncOnceSet<K> {
    progress: Mutex<HashMap<K, Progress>>,
    policy: FailurePolicy,
}

impl<K: Eq + Hash + Clone> SyncOnceSet<K> {
    pub fn new(policy: FailurePolicy) -> Self {
        SyncOnceSet {
            progress: Mutex::new(HashMap::new()),
            policy,
        }
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// As with [`SyncOnce::state`], a key claimed under
    /// [`FailurePolicy::Consume`] is reported done while its action runs.
    pub fn state(&self, key: &K) -> State {
        lock(&self.progress)
            .get(key)
            .map_or(State::Pending, |p| p.state())
    }

    pub fn is_done(&self, key: &K) -> bool {
        self.state(key) == State::Done
    }

    /// The number of actions that are done, counted the same way as
    /// [`SyncOnceSet::state`].
    pub fn len(&self) -> usize {
        lock(&self.progress)
            .values()
            .filter(|p| **p == Progress::Done)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn claim(&self, key: &K) -> bool {
        let mut progress = lock(&self.progress);
        if progress.contains_key(key) {
            log::trace!("action already claimed, ignoring call");
            return false;
        }
        log::debug!("running guarded action ({:?})", self.policy);
        let claimed = if self.policy.marks_before_run() {
            Progress::Done
        } else {
            Progress::Running
        };
        progress.insert(key.clone(), claimed);
        true
    }

    fn settle(&self, key: &K, succeeded: bool) {
        let mut progress = lock(&self.progress);
        if succeeded || self.policy.marks_before_run() {
            progress.insert(key.clone(), Progress::Done);
        } else {
            log::debug!("guarded action failed, it may be retried");
            progress.remove(key);
        }
    }

    pub fn invoke<A, R>(&self, key: K, action: impl FnOnce(A) -> R, args: A) -> Option<R> {
        if !self.claim(&key) {
            return None;
        }
        let mut succeeded = scopeguard::guard(false, |ok| self.settle(&key, ok));
        let ret = action(args);
        *succeeded = true;
        Some(ret)
    }

    pub fn try_invoke<A, R, E>(
        &self,
        key: K,
        action: impl FnOnce(A) -> Result<R, E>,
        args: A,
    ) -> Result<Option<R>, GuardError<E>> {
        if !self.claim(&key) {
            return Ok(None);
        }
        let mut succeeded = scopeguard::guard(false, |ok| self.settle(&key, ok));
        let result = action(args);
        *succeeded = result.is_ok();
        result.map(Some).map_err(|e| self.policy.wrap_error(e))
    }
}

impl SyncOnceSet<ActionId> {
    /// Runs `action` on `args` unless this same action already ran (or is
    /// running).
    pub fn invoke_action<F, A, R>(&self, action: &Arc<F>, args: A) -> Option<R>
    where
        F: Fn(A) -> R + ?Sized + Send + Sync + 'static,
    {
        let id = ActionId::of(action);
        log::trace!("guarding {id:?}");
        self.invoke(id, &**action, args)
    }

    pub fn try_invoke_action<F, A, R, E>(
        &self,
        action: &Arc<F>,
        args: A,
    ) -> Result<Option<R>, GuardError<E>>
    where
        F: Fn(A) -> Result<R, E> + ?Sized + Send + Sync + 'static,
    {
        let id = ActionId::of(action);
        log::trace!("guarding {id:?}");
        self.try_invoke(id, &**action, args)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        panic::{AssertUnwindSafe, catch_unwind},
        sync::atomic::{AtomicUsize, Ordering},
    };

    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;

    #[derive(Debug, PartialEq, thiserror::Error)]
    #[error("boom")]
    struct Boom;

    #[test]
    fn many_threads_one_run() {
        let _ = env_logger::builder().is_test(true).try_init();

        let runs = AtomicUsize::new(0);
        let guard = SyncOnce::new(|| runs.fetch_add(1, Ordering::SeqCst), FailurePolicy::Consume);

        std::thread::scope(|s| {
            for _ in 0..16 {
                s.spawn(|| {
                    for _ in 0..100 {
                        guard.call();
                    }
                });
            }
        });

        assert!(guard.is_done());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    static REENTRANT: SyncOnce<fn() -> bool> =
        SyncOnce::new(reenter as fn() -> bool, FailurePolicy::Consume);
    static REENTRANT_RETRY: SyncOnce<fn() -> bool> =
        SyncOnce::new(reenter_retry as fn() -> bool, FailurePolicy::Retry);

    // Both return whether the nested call ran the action.
    fn reenter() -> bool {
        REENTRANT.call().is_some()
    }

    fn reenter_retry() -> bool {
        REENTRANT_RETRY.call().is_some()
    }

    #[test]
    fn reentrant_call_is_ignored() {
        assert_eq!(REENTRANT.call(), Some(false));
        assert_eq!(REENTRANT.call(), None);

        assert_eq!(REENTRANT_RETRY.call(), Some(false));
        assert!(REENTRANT_RETRY.is_done());
        assert_eq!(REENTRANT_RETRY.call(), None);
    }

    #[test]
    fn retry_after_failure() {
        let attempts = AtomicUsize::new(0);
        let guard = SyncOnce::new(
            || {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(Boom)
                } else {
                    Ok(())
                }
            },
            FailurePolicy::Retry,
        );

        assert_matches!(guard.try_call(), Err(GuardError::Retryable(Boom)));
        assert_eq!(guard.state(), State::Pending);
        assert_matches!(guard.try_call(), Ok(Some(())));
        assert_matches!(guard.try_call(), Ok(None));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn consume_after_failure() {
        let guard = SyncOnce::new(
            |x: u32| if x > 0 { Ok(x) } else { Err(Boom) },
            FailurePolicy::Consume,
        );
        assert_matches!(guard.try_invoke(0), Err(GuardError::Consumed(Boom)));
        assert!(guard.is_done());
        assert_matches!(guard.try_invoke(1), Ok(None));
    }

    #[test]
    fn panic_under_retry_releases_claim() {
        let first = AtomicUsize::new(0);
        let guard = SyncOnce::new(
            || {
                if first.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("first run");
                }
                5
            },
            FailurePolicy::Retry,
        );

        assert!(catch_unwind(AssertUnwindSafe(|| guard.call())).is_err());
        assert_eq!(guard.state(), State::Pending);
        assert_eq!(guard.call(), Some(5));
        assert_eq!(guard.call(), None);
    }

    #[test]
    fn set_runs_each_key_once() {
        let runs = AtomicUsize::new(0);
        let guard = SyncOnceSet::new(FailurePolicy::Consume);

        std::thread::scope(|s| {
            for i in 0..8 {
                let guard = &guard;
                let runs = &runs;
                s.spawn(move || {
                    for key in 0..4 {
                        guard.invoke(key, |_| runs.fetch_add(1, Ordering::SeqCst), i);
                    }
                });
            }
        });

        assert_eq!(guard.len(), 4);
        assert_eq!(runs.load(Ordering::SeqCst), 4);
        assert!(guard.is_done(&3));
        assert_eq!(guard.state(&4), State::Pending);
    }

    #[test]
    fn set_retry_after_failure() {
        let guard = SyncOnceSet::new(FailurePolicy::Retry);
        assert_matches!(
            guard.try_invoke("load", |()| Err::<(), _>(Boom), ()),
            Err(GuardError::Retryable(Boom))
        );
        assert!(guard.is_empty());
        assert_matches!(guard.try_invoke("load", |()| Ok::<_, Boom>(1), ()), Ok(Some(1)));
        assert_matches!(guard.try_invoke("load", |()| Ok::<_, Boom>(2), ()), Ok(None));
    }

    static SEEN_DONE: SyncOnce<fn() -> bool> =
        SyncOnce::new(seen_done as fn() -> bool, FailurePolicy::Consume);
    static SEEN_DONE_RETRY: SyncOnce<fn() -> bool> =
        SyncOnce::new(seen_done_retry as fn() -> bool, FailurePolicy::Retry);

    // Both return what the guard reports about itself while the action runs.
    fn seen_done() -> bool {
        SEEN_DONE.is_done()
    }

    fn seen_done_retry() -> bool {
        SEEN_DONE_RETRY.is_done()
    }

    #[test]
    fn done_while_running_depends_on_policy() {
        assert_eq!(SEEN_DONE.call(), Some(true));
        assert_eq!(SEEN_DONE_RETRY.call(), Some(false));
        assert!(SEEN_DONE_RETRY.is_done());

        let consume = SyncOnceSet::new(FailurePolicy::Consume);
        assert_eq!(consume.invoke(1, |()| consume.is_done(&1), ()), Some(true));
        let retry = SyncOnceSet::new(FailurePolicy::Retry);
        assert_eq!(retry.invoke(1, |()| retry.is_done(&1), ()), Some(false));
        assert!(retry.is_done(&1));
    }

    #[test]
    fn threads_retry_until_one_succeeds() {
        let attempts = AtomicUsize::new(0);
        let successes = AtomicUsize::new(0);
        let guard = SyncOnce::new(
            || {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(Boom)
                } else {
                    Ok(())
                }
            },
            FailurePolicy::Retry,
        );

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    while !guard.is_done() {
                        if let Ok(Some(())) = guard.try_call() {
                            successes.fetch_add(1, Ordering::SeqCst);
                        }
                        std::thread::yield_now();
                    }
                });
            }
        });

        assert_eq!(successes.load(Ordering::SeqCst), 1);
        assert_eq!(guard.state(), State::Done);
        assert!(attempts.load(Ordering::SeqCst) >= 2);
        assert_matches!(guard.try_call(), Ok(None));
    }

    #[test]
    fn set_threads_retry_until_one_succeeds() {
        let attempts = AtomicUsize::new(0);
        let successes = AtomicUsize::new(0);
        let guard = SyncOnceSet::new(FailurePolicy::Retry);
        let load = |()| {
            if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(Boom)
            } else {
                Ok(())
            }
        };

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    while !guard.is_done(&"load") {
                        if let Ok(Some(())) = guard.try_invoke("load", load, ()) {
                            successes.fetch_add(1, Ordering::SeqCst);
                        }
                        std::thread::yield_now();
                    }
                });
            }
        });

        assert_eq!(successes.load(Ordering::SeqCst), 1);
        assert_eq!(guard.state(&"load"), State::Done);
        assert_eq!(guard.len(), 1);
        assert!(attempts.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn set_by_action_identity() {
        type Action = Arc<dyn Fn(&AtomicUsize) + Send + Sync>;
        let add = |n: usize| -> Action {
            Arc::new(move |count: &AtomicUsize| {
                count.fetch_add(n, Ordering::SeqCst);
            })
        };
        let (a, b) = (add(1), add(10));

        let count = AtomicUsize::new(0);
        let guard = SyncOnceSet::<ActionId>::new(FailurePolicy::Consume);
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    guard.invoke_action(&a, &count);
                    guard.invoke_action(&b, &count);
                });
            }
        });
        assert_eq!(count.load(Ordering::SeqCst), 11);
        assert_eq!(guard.len(), 2);

        let check = Arc::new(|()| Ok::<_, Boom>(()));
        assert_matches!(guard.try_invoke_action(&check, ()), Ok(Some(())));
        assert_matches!(guard.try_invoke_action(&check, ()), Ok(None));
    }
}
