//! # Clinic Sync
//!
//! Keeps a client's view of a collection consistent with the server without a push channel:
//! periodic polling, a short-lived read cache, and optimistic local patches reconciled by the
//! next poll.
//!
//! The pieces are independent:
//! - [`Reconciler`] is pure bookkeeping over a [`LocalView`] (no timers, no I/O);
//! - [`PollScheduler`] only drives a callback on an interval until shut down;
//! - [`ReadCache`] is a TTL cache invalidated per collection;
//! - [`CollectionSource`] abstracts where snapshots and transitions go (in-process or HTTP).
//!
//! [`SyncEngine`] composes them for one watched collection.

pub mod cache;
pub mod engine;
pub mod error;
pub mod http;
pub mod reconciler;
pub mod retry;
pub mod scheduler;
pub mod source;
pub mod view;

pub use cache::ReadCache;
pub use engine::SyncEngine;
pub use error::{SyncError, SyncResult};
pub use http::HttpSource;
pub use reconciler::{PatchToken, PollTicket, Reconciler, SnapshotOutcome};
pub use retry::{retry_transient, RetryPolicy};
pub use scheduler::PollScheduler;
pub use source::{BillSource, CollectionSource, LocalSource};
pub use view::LocalView;
