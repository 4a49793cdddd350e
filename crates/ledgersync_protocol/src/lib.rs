//! # Ledgersync Protocol
//!
//! Protocol types for the ledgersync engine.
//!
//! This crate provides:
//! - `Record`: opaque upstream records with id coercion
//! - `ProxyRequest`: the envelope relayed through the forwarding proxy
//! - `PageEnvelope` / `PageData`: page responses
//! - `PaginationStyle`: upstream query-parameter naming conventions
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod messages;
mod record;

pub use messages::{PageData, PageEnvelope, PaginationStyle, ProxyRequest};
pub use record::Record;
