//! quibble: MediaWiki CI test runner
//!
//! Provisions CI images, runs isolated test environments and drives full
//! MediaWiki test runs (clone, install, test stages).

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod util;
