//! # Entries, Schemas and Batches
//!
//! Arbor keeps application state in a tree of typed nodes. The tree is
//! described once by [`Schema`]s and instantiated lazily into live
//! [`Entry`] handles. There are three main pieces:
//!
//! - `Schema`: immutable behaviour for one position (how the value is
//!   computed, which writes are accepted, which children exist).
//! - `Entry`: the live node; caches its value, holds listeners.
//! - `Manager`: batches recompute, notify and destroy work into scheduled
//!   drains.
//!
//! ## Reading and writing
//!
//! ```rust
//! use arbor_core::*;
//!
//! let sched = ManualScheduler::new();
//! let root = create_root(
//!     schemas::object()
//!         .member("a", schemas::scalar(3))
//!         .member("b", schemas::scalar(4))
//!         .member(
//!             "sum",
//!             schemas::derived(|v| {
//!                 let a = v.number_field("a").unwrap_or(0.0);
//!                 let b = v.number_field("b").unwrap_or(0.0);
//!                 Ok(Value::from(a + b))
//!             }),
//!         ),
//!     sched.clone(),
//! );
//!
//! let sum = root.member("sum").unwrap();
//! assert_eq!(sum.get().unwrap(), Value::from(7));
//!
//! root.member("a").unwrap().set(5).unwrap();
//! sched.run_until_idle().unwrap();
//! assert_eq!(sum.get().unwrap(), Value::from(9));
//! ```
//!
//! ## Kinds
//!
//! Every schema has a [`Kind`] that decides where invalidation travels:
//!
//! - **Scalar** leaves store their own value and invalidate upward.
//! - **Narrowing** entries derive from their parent and are invalidated
//!   top-down; they are recomputed on the next drain or on the next `get`.
//! - **Widening** entries (objects, arrays, maps, sets) are assembled from
//!   their children. Writes fan out to the children.
//!
//! ## Observing
//!
//! Listeners never run inside `set`. They run in the notify phase of the next
//! drain, once per entry and batch, with the new value and the value before
//! the batch. [`Entry::subscribe`] returns a [`Dispose`] guard that
//! unsubscribes.
//!
//! Entries that end up empty (no listeners, no value of their own, no
//! populated children) are garbage-collected in the destroy phase; handles to
//! them then fail with [`ArborError::Destroyed`].

pub mod config;
pub mod dispose;
pub mod entry;
pub mod error;
pub mod kind;
pub mod manager;
pub mod root;
pub mod runtime;
pub mod schema;
pub mod schemas;
pub mod scheduler;
pub mod tests;
pub mod value;

pub use config::*;
pub use dispose::*;
pub use entry::*;
pub use error::*;
pub use kind::Kind;
pub use manager::{BatchStats, Manager, ManagerState};
pub use root::*;
pub use runtime::{EntryId, Listener};
pub use schema::*;
pub use scheduler::*;
pub use value::*;
