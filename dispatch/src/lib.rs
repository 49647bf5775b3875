//! Lookup tables that stand in for `match` blocks whose arms are decided at
//! runtime.
//!
//! A [`Cases`] table maps keys to a [`Case`], which is either a plain value or
//! a thunk computing one. Every table declares a default case, so resolving a
//! key always produces a value.
//!
//! ```rust
//! # use eloquent_dispatch::{Case, Cases};
//! let greeting = Cases::new(Case::Value("hello"))
//!     .value("fr", "bonjour")
//!     .thunk("de", || "hallo");
//!
//! assert_eq!(greeting.resolve("fr"), "bonjour");
//! assert_eq!(greeting.resolve("de"), "hallo");
//! assert_eq!(greeting.resolve("xx"), "hello");
//! ```

use std::{borrow::Borrow, collections::HashMap, fmt, hash::Hash};

/// One entry of a [`Cases`] table.
///
/// Whether an entry is a value or a thunk is fixed when it's created.
pub enum Case<V> {
    Value(V),
    /// Called every time the entry is resolved.
    Thunk(Box<dyn Fn() -> V>),
}

impl<V> Case<V> {
    pub fn thunk(f: impl Fn() -> V + 'static) -> Self {
        Case::Thunk(Box::new(f))
    }

    /// Produces this entry's value, running the thunk if there is one.
    pub fn eval(&self) -> V
    where
        V: Clone,
    {
        match self {
            Case::Value(v) => v.clone(),
            Case::Thunk(f) => f(),
        }
    }

    pub fn is_thunk(&self) -> bool {
        matches!(self, Case::Thunk(_))
    }
}

impl<V: fmt::Debug> fmt::Debug for Case<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Case::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Case::Thunk(_) => f.write_str("Thunk(..)"),
        }
    }
}

impl<V> From<V> for Case<V> {
    fn from(v: V) -> Self {
        Case::Value(v)
    }
}

/// A table of cases with a default.
pub struct Cases<K, V> {
    cases: HashMap<K, Case<V>>,
    default: Case<V>,
}

impl<K: Eq + Hash, V> Cases<K, V> {
    /// An empty table where every key resolves to `default`.
    pub fn new(default: Case<V>) -> Self {
        Cases {
            cases: HashMap::new(),
            default,
        }
    }

    /// Adds (or replaces) the entry for `key`.
    pub fn case(mut self, key: K, case: Case<V>) -> Self {
        self.insert(key, case);
        self
    }

    pub fn value(self, key: K, value: V) -> Self {
        self.case(key, Case::Value(value))
    }

    pub fn thunk(self, key: K, f: impl Fn() -> V + 'static) -> Self {
        self.case(key, Case::thunk(f))
    }

    /// Adds (or replaces) the entry for `key`, returning the old one.
    pub fn insert(&mut self, key: K, case: Case<V>) -> Option<Case<V>> {
        self.cases.insert(key, case)
    }

    /// The entry for `key`, or the default entry.
    pub fn get<Q>(&self, key: &Q) -> &Case<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.cases.get(key).unwrap_or_else(|| {
            log::trace!("no case for key, falling back to the default");
            &self.default
        })
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.cases.contains_key(key)
    }

    /// Resolves `key` to a value. Only the thunk of the matching entry (or of
    /// the default, if nothing matches) is run.
    pub fn resolve<Q>(&self, key: &Q) -> V
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
        V: Clone,
    {
        self.get(key).eval()
    }

    pub fn default_case(&self) -> &Case<V> {
        &self.default
    }

    /// The number of entries, not counting the default.
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}

impl<K: Eq + Hash, V> Extend<(K, Case<V>)> for Cases<K, V> {
    fn extend<I: IntoIterator<Item = (K, Case<V>)>>(&mut self, iter: I) {
        self.cases.extend(iter);
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for Cases<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cases")
            .field("cases", &self.cases)
            .field("default", &self.default)
            .finish()
    }
}
