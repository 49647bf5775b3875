//! This crate provides an immutable singly linked list.
//!
//! A [`List`] is built in one pass from an ordered sequence: one [`Node`] is
//! allocated per element and the nodes are then linked from right to left, so
//! that the node for the last element points at the terminal marker and the
//! node for the first element becomes the head. Once built, a list can only be
//! traversed; nothing in the public API mutates a node.
//!
//! ```rust
//! # use eloquent_list::List;
//! let list = List::from_vec(vec![10, 20]);
//! let head = list.head().unwrap();
//! assert_eq!(head.value(), &10);
//! assert_eq!(head.rest().unwrap().value(), &20);
//! assert!(head.rest().unwrap().rest().is_none());
//! ```

pub mod list;

pub use list::{IntoIter, Iter, List, Node};
