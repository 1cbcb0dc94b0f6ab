//! Shared types for `scanbind`.
//!
//! * [`report`]: the typed result of one scan.
//! * [`error`]: every way a scan can fail.
//! * [`config`]: the validated, immutable scan configuration.

pub mod config;
pub mod error;
pub mod report;
