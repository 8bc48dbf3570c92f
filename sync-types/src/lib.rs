//! # sync-types
//!
//! Wire and value types for field-device record sync and identity matching.
//!
//! This crate provides the foundational types used across all fieldsync crates:
//! - [`RecordId`], [`LocationId`], [`DeviceId`], [`Timestamp`] - Identity and ordering types
//! - [`RecordKind`], [`DeltaRecord`], [`CountSummary`], [`Location`] - Record-level values
//! - [`SyncRequest`], [`SyncResponse`], [`MatchRequest`], [`MatchResult`] - Operation shapes
//! - [`SyncError`] - Error taxonomy

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod ids;
mod messages;
mod records;

pub use error::SyncError;
pub use ids::{DeviceId, LocationId, RecordId, Timestamp};
pub use messages::{
    CandidateSource, LocationScope, MatchCandidate, MatchRequest, MatchResult, Provenance,
    SyncRequest, SyncResponse, SyncStatus, Template,
};
pub use records::{CountSummary, DeltaOp, DeltaRecord, Location, RecordKind};
