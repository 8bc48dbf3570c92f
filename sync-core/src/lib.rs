//! # sync-core
//!
//! Pure logic for fieldsync (no I/O, instant tests).
//!
//! This crate implements the algorithms behind incremental record sync and
//! identity matching without any network or disk I/O, enabling fast unit
//! tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same input → same output)
//! - Invariants held by construction (counts and pages share one [`RecordQuery`])
//!
//! The actual I/O (record store, biometric matcher) is performed by
//! `sync-server`, which feeds results through these functions.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod assemble;
pub mod counts;
pub mod cursor;
pub mod delta;
pub mod linkage;
pub mod query;
pub mod scope;

pub use assemble::{status_for, SyncResponseAssembler};
pub use counts::{summarize, VoidSplit};
pub use cursor::{requesting_device, CursorError, SyncCursor};
pub use delta::{reconcile, ChangedRow, DeltaPage};
pub use linkage::{BiographicHit, BiometricQuery, LinkageError, MatchPolicy};
pub use query::{Ownership, RecordQuery, TimeBound};
pub use scope::{LocationIndex, ScopeError};
