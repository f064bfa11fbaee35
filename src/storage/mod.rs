//! Durable state for the tracker.
//! The basic idea is:
//!  - `sessionSummary.json` holds today's running counters, pretty printed,
//!    read through an in-memory cache.
//!  - `timeData.json` holds one time bucket per UTC day, kept forever.
//!  - `settings.json` is a flat key-value store for small tracker state
//!    (payload timestamps, session threshold, wall clock seconds).
//!
//! The summary file is shared between editor windows. Only the primary
//! window writes it, everyone else reads, so writes take an exclusive file
//! lock and reads a shared one.

pub mod entities;
pub mod kv;
pub mod summary;
pub mod time_data;
