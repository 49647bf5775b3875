use std::{
    fmt,
    hash::{Hash, Hasher},
    iter::FusedIterator,
};

type Link<T> = Option<Box<Node<T>>>;

/// A single cell of a [`List`]: a value and the rest of the list.
///
/// Nodes are only ever created by [`List`]'s constructors and can't be
/// modified afterwards.
pub struct Node<T> {
    value: T,
    rest: Link<T>,
}

impl<T> Node<T> {
    /// A node pointing at the terminal marker.
    fn unlinked(value: T) -> Box<Self> {
        Box::new(Node { value, rest: None })
    }

    /// The element stored in this node.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// The next node, or `None` if this is the last node of the list.
    pub fn rest(&self) -> Option<&Node<T>> {
        self.rest.as_deref()
    }
}

impl<T: fmt::Debug> fmt::Debug for Node<T> {
    // The derived impl would recurse once per node, so we only print this
    // node's value and whether there's anything after it.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("value", &self.value)
            .field("has_rest", &self.rest.is_some())
            .finish()
    }
}

/// An immutable singly linked list.
///
/// The empty list is the terminal marker: it has no head node. Every list owns
/// its nodes exclusively, so two lists never share a node (cloning a list
/// copies every node).
pub struct List<T> {
    head: Link<T>,
    // The number of nodes reachable from `head`. Lists are immutable so this
    // never goes stale.
    length: usize,
}

impl<T> List<T> {
    /// The empty list.
    pub const fn new() -> Self {
        List {
            head: None,
            length: 0,
        }
    }

    /// Builds a list whose traversal order is the iteration order of `iter`.
    ///
    /// We first allocate one unlinked node per element and then link them up
    /// from the back, so each node is handed its `rest` exactly once and the
    /// first node ends up as the head.
    fn build<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let nodes: Vec<Box<Node<T>>> = iter.into_iter().map(Node::unlinked).collect();
        let length = nodes.len();
        let head = nodes.into_iter().rev().fold(None, |rest, mut node| {
            node.rest = rest;
            Some(node)
        });

        List { head, length }
    }

    /// Converts a vector into a list with the same elements in the same order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use eloquent_list::List;
    /// let list = List::from_vec(vec![10, 20, 30]);
    /// assert_eq!(list.len(), 3);
    /// assert_eq!(list.iter().copied().collect::<Vec<_>>(), vec![10, 20, 30]);
    /// assert!(List::<u32>::from_vec(vec![]).head().is_none());
    /// ```
    pub fn from_vec(values: Vec<T>) -> Self {
        Self::build(values)
    }

    /// The first node, or `None` for the empty list.
    pub fn head(&self) -> Option<&Node<T>> {
        self.head.as_deref()
    }

    /// The first element, or `None` for the empty list.
    pub fn first(&self) -> Option<&T> {
        self.head().map(Node::value)
    }

    /// The number of nodes in this list.
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Iterates over the elements from the head to the last node.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use eloquent_list::List;
    /// let list: List<_> = ["a", "b"].into();
    /// let mut iter = list.iter();
    /// assert_eq!(iter.len(), 2);
    /// assert_eq!(iter.next(), Some(&"a"));
    /// assert_eq!(iter.next(), Some(&"b"));
    /// assert_eq!(iter.next(), None);
    /// ```
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            next: self.head(),
            remaining: self.length,
        }
    }

    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.iter().cloned().collect()
    }

    /// Walks the whole chain and panics if it disagrees with the cached
    /// length. Only useful for tests.
    pub fn check_invariants(&self) {
        let mut count = 0;
        let mut node = self.head();
        while let Some(n) = node {
            count += 1;
            node = n.rest();
        }
        assert_eq!(count, self.length);
        assert_eq!(self.head.is_none(), self.length == 0);
    }
}

impl<T> Drop for List<T> {
    // Unlink nodes one at a time; the default drop glue would recurse once per
    // node and blow the stack on long lists.
    fn drop(&mut self) {
        let mut link = self.head.take();
        while let Some(mut node) = link {
            link = node.rest.take();
        }
    }
}

impl<T> Default for List<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Clone for List<T> {
    fn clone(&self) -> Self {
        Self::build(self.iter().cloned())
    }
}

impl<T: fmt::Debug> fmt::Debug for List<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T: PartialEq> PartialEq for List<T> {
    fn eq(&self, other: &Self) -> bool {
        self.length == other.length && self.iter().eq(other.iter())
    }
}

impl<T: Eq> Eq for List<T> {}

impl<T: Hash> Hash for List<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.length);
        for elt in self {
            elt.hash(state);
        }
    }
}

impl<T> FromIterator<T> for List<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::build(iter)
    }
}

impl<T> From<Vec<T>> for List<T> {
    fn from(values: Vec<T>) -> Self {
        Self::from_vec(values)
    }
}

impl<T, const N: usize> From<[T; N]> for List<T> {
    fn from(values: [T; N]) -> Self {
        Self::build(values)
    }
}

impl<T: Clone> From<&[T]> for List<T> {
    fn from(values: &[T]) -> Self {
        Self::build(values.iter().cloned())
    }
}

impl<T: serde::Serialize> serde::Serialize for List<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeSeq;

        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for elt in self.iter() {
            seq.serialize_element(elt)?;
        }
        seq.end()
    }
}

impl<'de, T: serde::Deserialize<'de>> serde::Deserialize<'de> for List<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let vec: Vec<T> = Vec::deserialize(deserializer)?;
        Ok(List::from_vec(vec))
    }
}

#[derive(Debug)]
pub struct Iter<'a, T> {
    next: Option<&'a Node<T>>,
    remaining: usize,
}

// Derived `Clone` would require `T: Clone`.
impl<T> Clone for Iter<'_, T> {
    fn clone(&self) -> Self {
        Iter {
            next: self.next,
            remaining: self.remaining,
        }
    }
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.next?;
        self.next = node.rest();
        self.remaining -= 1;
        Some(&node.value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

impl<T> FusedIterator for Iter<'_, T> {}

impl<'a, T> IntoIterator for &'a List<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[derive(Debug)]
pub struct IntoIter<T> {
    next: Link<T>,
    remaining: usize,
}

impl<T> Iterator for IntoIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.next.take()?;
        let Node { value, rest } = *node;
        self.next = rest;
        self.remaining -= 1;
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for IntoIter<T> {}

impl<T> FusedIterator for IntoIter<T> {}

impl<T> Drop for IntoIter<T> {
    fn drop(&mut self) {
        let mut link = self.next.take();
        while let Some(mut node) = link {
            link = node.rest.take();
        }
    }
}

impl<T> IntoIterator for List<T> {
    type Item = T;
    type IntoIter = IntoIter<T>;

    fn into_iter(mut self) -> Self::IntoIter {
        IntoIter {
            next: self.head.take(),
            remaining: std::mem::take(&mut self.length),
        }
    }
}
