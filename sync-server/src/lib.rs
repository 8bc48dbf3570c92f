//! # sync-server
//!
//! Sync and identity-matching server for fieldsync field devices.
//!
//! This crate implements a server that:
//! - Serves incremental, location-scoped record deltas to tablets
//! - Reports full-population counts alongside every page
//! - Matches identities by phone, external id and fingerprint template
//! - Degrades gracefully when the biometric matching service is down
//!
//! ## Architecture
//!
//! ```text
//! Tablet ──► POST /sync/:kind ──┐          ┌── POST /match ◄── Tablet
//!                               ▼          ▼
//!        ┌──────────────────────────────────────────────────┐
//!        │                 fieldsync-server                 │
//!        │  SyncService               RecordLinkageMatcher  │
//!        │       │    LocationDirectory     │        │      │
//!        │  ┌────┴──────────────────────────┴──┐     │      │
//!        │  │        SQLite (records)          │     │      │
//!        │  └──────────────────────────────────┘     │      │
//!        └───────────────────────────────────────────┼──────┘
//!                                                    ▼
//!                                       biometric matching service
//! ```
//!
//! The algorithms live in `sync-core`; this crate performs the I/O around
//! them.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod directory;
pub mod error;
pub mod http;
pub mod limits;
pub mod maintenance;
pub mod matcher;
pub mod oracle;
pub mod server;
pub mod storage;
pub mod sync;
