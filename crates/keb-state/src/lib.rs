//! keb-state — instance and operation records for the Kyma environment broker.
//!
//! Backed by [redb](https://docs.rs/redb), with persistent and in-memory
//! backends.
//!
//! # Architecture
//!
//! All records are JSON-serialized into redb's `&[u8]` value columns.
//! Lifecycle code talks to the store only through the [`Instances`],
//! [`Operations`], [`InstancesArchived`] and [`Actions`] traits, bundled as
//! [`Store`]. [`StateStore`] implements all four.
//!
//! Instance updates are guarded by an optimistic `version` counter: an update
//! computed from a stale read fails with [`StateError::Conflict`] instead of
//! silently overwriting a concurrent write.

pub mod error;
pub mod repo;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use repo::{Actions, Instances, InstancesArchived, Operations, Store};
pub use store::StateStore;
pub use types::*;
