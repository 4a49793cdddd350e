//! # Ledgersync Engine
//!
//! Incremental sync engine for paginated remote resources.
//!
//! This crate provides:
//! - Strictly sequential page fetching with bounded linear-backoff retry
//! - Id-keyed, first-seen-ordered deduplication across pages
//! - Progress and snapshot callbacks after every accepted page
//! - HTTP proxy transport abstraction
//!
//! ## Architecture
//!
//! One [`SyncEngine`] owns the accumulated state and drives the pull:
//! 1. Fetch the next page through the [`PageFetch`] collaborator
//! 2. Merge its records into the accumulator (last page wins on id
//!    collision, records without a usable id are dropped)
//! 3. Emit progress and a full snapshot to the [`SyncObserver`]
//! 4. Stop on an empty or short page; otherwise advance to the next page
//!
//! ## Key Invariants
//!
//! - Pages are fetched one at a time, never concurrently
//! - The page counter advances by exactly one per accepted page
//! - A retried page never advances the page counter
//! - At most one sync loop per engine; concurrent starts are no-ops
//! - Accumulated records survive a fatal abort

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod fetch;
mod http;
mod records;

pub use config::{RetryConfig, SyncConfig};
pub use engine::{
    MemoryObserver, NullObserver, StopReason, SyncEngine, SyncObserver, SyncOutcome, SyncProgress,
    SyncReport, SyncState, SyncStats,
};
pub use error::{SyncError, SyncResult};
pub use fetch::{MockFetcher, PageFetch};
pub use http::{HttpClient, LoopbackClient, LoopbackServer, ProxyConfig, ProxyFetcher};
pub use records::{MergeOutcome, RecordSet};
