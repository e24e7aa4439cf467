//! Shared types for the ledger ingestion subsystem.
//!
//! `objects` holds the health read model and ledger row status as they
//! appear on the wire. The `client` feature adds a small HTTP client for
//! the deep-health endpoint.

#![forbid(unsafe_code)]

#[cfg(feature = "client")]
pub mod client;
pub mod objects;
