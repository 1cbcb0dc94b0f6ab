//! End-to-end tests that run the orchestrator against mock `rustscan` scripts.

#[cfg(all(test, unix))]
mod scan;
#[cfg(all(test, unix))]
mod util;
