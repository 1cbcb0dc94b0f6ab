//! # scanbind core
//!
//! Drives the external RustScan binary and turns its output into a typed
//! [`Report`](scanbind_common::report::Report).
//!
//! * [`scanner`]: the orchestrator. Spawns the process, streams and races it.
//! * [`parser`]: the XML report parser and the empty-report fallback.
//! * [`diagnostics`]: classifies stderr lines and report error messages.
//! * [`filter`]: narrows a report by host or port predicates.
//! * [`args`]: maps a [`ScanConfig`](scanbind_common::config::ScanConfig) to argv.

pub mod args;
pub mod diagnostics;
pub mod filter;
pub mod locate;
pub mod parser;
pub mod scanner;

pub use filter::ScanFilters;
pub use scanner::{Scan, ScanResult, ScanRunner, Scanner};
