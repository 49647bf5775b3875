use crate::{FailurePolicy, GuardError, State};

/// A guard bound to one action, which it runs at most once.
///
/// The action can take no arguments ([`Once::call`]) or one ([`Once::invoke`];
/// use a tuple to pass several). The arguments of calls made after the first
/// successful run are dropped without being looked at.
///
/// # Examples
///
/// ```rust
/// # use eloquent_once::{FailurePolicy, Once, State};
/// let mut greet = Once::new(|name: &str| format!("hello {name}"), FailurePolicy::Consume);
/// assert_eq!(greet.invoke("ada"), Some("hello ada".to_owned()));
/// assert_eq!(greet.invoke("grace"), None);
/// assert_eq!(greet.state(), State::Done);
/// ```
#[derive(Debug)]
pub struct Once<F> {
    action: F,
    state: State,
    policy: FailurePolicy,
}

impl<F> Once<F> {
    /// Guards `action`; `policy` decides whether a failed run uses it up.
    pub fn new(action: F, policy: FailurePolicy) -> Self {
        Once {
            action,
            state: State::Pending,
            policy,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Decides whether this call gets to run the action, updating the state
    /// for the "consume" policy.
    fn begin(&mut self) -> bool {
        match self.state {
            State::Done => {
                log::trace!("guarded action already ran, ignoring call");
                false
            }
            State::Pending => {
                log::debug!("running guarded action ({:?})", self.policy);
                if self.policy.marks_before_run() {
                    self.state = State::Done;
                }
                true
            }
        }
    }

    fn finish<R, E>(&mut self, result: Result<R, E>) -> Result<Option<R>, GuardError<E>> {
        match result {
            Ok(ret) => {
                self.state = State::Done;
                Ok(Some(ret))
            }
            Err(e) => {
                self.state = self.policy.state_after_failure();
                log::debug!("guarded action failed, now {:?}", self.state);
                Err(self.policy.wrap_error(e))
            }
        }
    }

    /// Runs the action if it hasn't run yet.
    ///
    /// Returns the action's result on the call that ran it, and `None` on
    /// every other call.
    pub fn call<R>(&mut self) -> Option<R>
    where
        F: FnMut() -> R,
    {
        if !self.begin() {
            return None;
        }
        let ret = (self.action)();
        self.state = State::Done;
        Some(ret)
    }

    /// Runs the action on `args` if it hasn't run yet.
    pub fn invoke<A, R>(&mut self, args: A) -> Option<R>
    where
        F: FnMut(A) -> R,
    {
        if !self.begin() {
            return None;
        }
        let ret = (self.action)(args);
        self.state = State::Done;
        Some(ret)
    }

    /// Runs a fallible action if it hasn't run yet.
    ///
    /// `Ok(None)` means the action had already run. On failure, whether the
    /// action may run again depends on the policy; the returned error says
    /// which.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use eloquent_once::{FailurePolicy, Once};
    /// let mut attempts = 0;
    /// let mut connect = Once::new(
    ///     || {
    ///         attempts += 1;
    ///         if attempts < 3 { Err(std::fmt::Error) } else { Ok(attempts) }
    ///     },
    ///     FailurePolicy::Retry,
    /// );
    /// assert!(connect.try_call().unwrap_err().is_retryable());
    /// assert!(connect.try_call().is_err());
    /// assert_eq!(connect.try_call().unwrap(), Some(3));
    /// assert_eq!(connect.try_call().unwrap(), None);
    /// ```
    pub fn try_call<R, E>(&mut self) -> Result<Option<R>, GuardError<E>>
    where
        F: FnMut() -> Result<R, E>,
    {
        if !self.begin() {
            return Ok(None);
        }
        let result = (self.action)();
        self.finish(result)
    }

    /// Runs a fallible action on `args` if it hasn't run yet.
    pub fn try_invoke<A, R, E>(&mut self, args: A) -> Result<Option<R>, GuardError<E>>
    where
        F: FnMut(A) -> Result<R, E>,
    {
        if !self.begin() {
            return Ok(None);
        }
        let result = (self.action)(args);
        self.finish(result)
    }
}
