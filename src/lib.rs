//! Core engine for an editor-embedded activity tracker: turns batches of
//! keystroke counts into a continuously accumulating "time coding today"
//! metric, cross-checked against a wall clock and periodically reconciled
//! with a remote summary service.
//!
//! The host editor supplies events ([tracker::TrackerEvent]) and a status
//! bar sink. Everything here runs on a single event loop, so the daily
//! summary only ever has one writer.

pub mod status;
pub mod storage;
pub mod sync;
pub mod tracker;
pub mod utils;
