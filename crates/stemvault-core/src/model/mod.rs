//! Snapshot domain model
//!
//! A [`ProjectSnapshot`] is the canonical JSON description of a project's
//! tracks at one revision. Parsing validates and numeric-coerces every field
//! the diff engine reads; everything else is carried as opaque metadata.

pub mod coerce;
pub mod snapshot;

pub use snapshot::{
    Event, LoopRegion, Note, Occurrence, ProjectSnapshot, Track, TrackKind, SNAPSHOT_FILE_NAME,
};
