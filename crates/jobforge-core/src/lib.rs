//! # jobforge-core
//!
//! The persistence and coordination core of a distributed background-job
//! engine: a storage-agnostic data model, the secondary-index maintenance
//! every backend must apply, the optimistic-concurrency arbiter, a
//! heartbeat-based server registry, and a rate-limited change-notification
//! decorator. Concrete backends (SQL, Redis, Mongo, or the in-memory
//! provider shipped here) each implement [`StorageProvider`]; everything
//! else in this crate is backend-agnostic.
//!
//! ## Layout
//!
//! - [`model`] — [`Job`], [`RecurringJob`], [`BackgroundJobServer`],
//!   [`MetadataRecord`], pagination types. No backend client imports here.
//! - [`error`] — [`StorageError`], the single error type every
//!   `StorageProvider` method returns.
//! - [`index`] — pure computation of secondary-index write-sets
//!   ([`IndexDelta`], [`IndexWriteSet`], [`rewrite_indexes_for`]) plus the
//!   generic [`paged_delete_before`] bulk-delete driver.
//! - [`arbiter`] — the optimistic-concurrency version-check protocol
//!   ([`expect_version_with`], [`arbitrate_batch`]) and the unresolved-
//!   conflict diagnostic ([`describe_unresolved`]).
//! - [`provider`] — the [`StorageProvider`] trait every backend implements.
//! - [`registry`] — [`ServerRegistry`], a thin wrapper around the
//!   server-liveness operations plus a background reaper task.
//! - [`dispatch`] — [`ChangeDispatcher`], a decorator adding rate-limited
//!   change notification on top of any `StorageProvider`.
//! - [`memory`] — [`InMemoryStorageProvider`], a fully compliant
//!   single-process backend and the contract-test fixture for the other
//!   modules.

mod arbiter;
mod dispatch;
mod error;
mod index;
mod memory;
mod model;
mod provider;
mod registry;

pub use arbiter::{arbitrate_batch, describe_unresolved, expect_version_with, StateSummary, UnresolvedConflict};
pub use dispatch::{ChangeDispatcher, JobStatsListener, ListenerHandle, MetadataListener};
pub use error::StorageError;
pub use index::{paged_delete_before, remove_all_indexes_for, rewrite_indexes_for, IndexDelta, IndexWriteSet};
pub use memory::InMemoryStorageProvider;
pub use model::{
    BackgroundJobServer, Job, JobDetails, JobId, JobStats, JobState, MetadataRecord, Page,
    PageOrder, PageRequest, RecurringJob, ServerTelemetry, StateHistoryEntry,
};
pub use provider::StorageProvider;
pub use registry::ServerRegistry;

pub use async_trait::async_trait;
