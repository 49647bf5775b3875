use std::{
    any::Any,
    collections::HashSet,
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use crate::{FailurePolicy, GuardError, State};

/// The identity of a shared action: the address of its `Arc` allocation.
///
/// Two handles are the same action exactly when they point at the same
/// allocation, so clones of one `Arc` share an identity while two closures
/// built by the same expression (or two function pointers of the same type)
/// do not. The id keeps the allocation alive, so an address is never reused
/// while the id exists.
///
/// Plain function pointers don't need an `Arc`; key an [`OnceSet<usize>`] on
/// `f as usize` instead.
#[derive(Clone)]
pub struct ActionId {
    addr: usize,
    _alive: Arc<dyn Any + Send + Sync>,
}

impl ActionId {
    pub fn of<F: ?Sized + Send + Sync + 'static>(action: &Arc<F>) -> Self {
        ActionId {
            addr: Arc::as_ptr(action) as *const () as usize,
            _alive: Arc::new(Arc::clone(action)),
        }
    }
}

impl PartialEq for ActionId {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl Eq for ActionId {}

impl Hash for ActionId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr.hash(state);
    }
}

impl fmt::Debug for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActionId({:#x})", self.addr)
    }
}

/// A guard over many actions, each of which runs at most once.
///
/// Unlike [`Once`](crate::Once), the action is supplied on every call along
/// with a key identifying it. The first call with a given key runs the
/// action; later calls with the same key are ignored, whatever action and
/// arguments they carry.
///
/// # Examples
///
/// ```rust
/// # use eloquent_once::{FailurePolicy, OnceSet};
/// let mut log = Vec::new();
/// let mut guard = OnceSet::new(FailurePolicy::Consume);
/// guard.invoke("a", |x| log.push(x), 1);
/// guard.invoke("a", |x| log.push(x), 2);
/// guard.invoke("b", |x| log.push(x), 3);
/// assert_eq!(log, vec![1, 3]);
/// ```
#[derive(Debug, Clone)]
pub struct OnceSet<K> {
    done: HashSet<K>,
    policy: FailurePolicy,
}

impl<K: Eq + Hash> OnceSet<K> {
    pub fn new(policy: FailurePolicy) -> Self {
        OnceSet {
            done: HashSet::new(),
            policy,
        }
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn state(&self, key: &K) -> State {
        if self.done.contains(key) {
            State::Done
        } else {
            State::Pending
        }
    }

    pub fn is_done(&self, key: &K) -> bool {
        self.done.contains(key)
    }

    /// The number of actions that are done.
    pub fn len(&self) -> usize {
        self.done.len()
    }

    pub fn is_empty(&self) -> bool {
        self.done.is_empty()
    }

    /// Claims `key` for a run.
    ///
    /// Returns `None` if the action is already done. Otherwise returns the key
    /// back if it still needs to be recorded after a successful run (the
    /// "retry" policy), or `Some(None)` if it was recorded up front.
    fn begin(&mut self, key: K) -> Option<Option<K>> {
        if self.done.contains(&key) {
            log::trace!("action already ran, ignoring call");
            return None;
        }
        log::debug!("running guarded action ({:?})", self.policy);
        if self.policy.marks_before_run() {
            self.done.insert(key);
            Some(None)
        } else {
            Some(Some(key))
        }
    }

    fn record(&mut self, pending: Option<K>) {
        if let Some(key) = pending {
            self.done.insert(key);
        }
    }

    /// Runs `action` on `args` unless the action identified by `key` already
    /// ran.
    pub fn invoke<A, R>(&mut self, key: K, action: impl FnOnce(A) -> R, args: A) -> Option<R> {
        let pending = self.begin(key)?;
        let ret = action(args);
        self.record(pending);
        Some(ret)
    }

    /// Runs a fallible `action` on `args` unless the action identified by `key`
    /// already ran.
    ///
    /// With the "retry" policy, a failed action stays pending and the next
    /// call with the same key runs again.
    pub fn try_invoke<A, R, E>(
        &mut self,
        key: K,
        action: impl FnOnce(A) -> Result<R, E>,
        args: A,
    ) -> Result<Option<R>, GuardError<E>> {
        let Some(pending) = self.begin(key) else {
            return Ok(None);
        };
        match action(args) {
            Ok(ret) => {
                self.record(pending);
                Ok(Some(ret))
            }
            Err(e) => {
                log::debug!("guarded action failed ({:?})", self.policy);
                Err(self.policy.wrap_error(e))
            }
        }
    }
}

impl OnceSet<ActionId> {
    /// Runs `action` on `args` unless this same action already ran.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use std::sync::Arc;
    /// # use eloquent_once::{ActionId, FailurePolicy, OnceSet};
    /// type Action = Arc<dyn Fn(&mut Vec<char>) + Send + Sync>;
    /// let push = |c: char| -> Action { Arc::new(move |log: &mut Vec<char>| log.push(c)) };
    /// let (a, b) = (push('a'), push('b'));
    ///
    /// let mut log = Vec::new();
    /// let mut guard = OnceSet::<ActionId>::new(FailurePolicy::Consume);
    /// guard.invoke_action(&a, &mut log);
    /// guard.invoke_action(&a, &mut log);
    /// guard.invoke_action(&b, &mut log);
    /// guard.invoke_action(&a, &mut log);
    /// assert_eq!(log, vec!['a', 'b']);
    /// ```
    pub fn invoke_action<F, A, R>(&mut self, action: &Arc<F>, args: A) -> Option<R>
    where
        F: Fn(A) -> R + ?Sized + Send + Sync + 'static,
    {
        let id = ActionId::of(action);
        log::trace!("guarding {id:?}");
        self.invoke(id, &**action, args)
    }

    pub fn try_invoke_action<F, A, R, E>(
        &mut self,
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

    /// Whether `action` already ran through this guard.
    pub fn has_run<F: ?Sized + Send + Sync + 'static>(&self, action: &Arc<F>) -> bool {
        self.is_done(&ActionId::of(action))
    }
}
