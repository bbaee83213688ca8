//! # orgsync testkit
//!
//! Test utilities for orgsync.
//!
//! This crate provides:
//! - Sample trees and legacy (keyed) encodings of them
//! - A temporary workspace wiring a snapshot file to an in-memory remote
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use orgsync_testkit::prelude::*;
//!
//! #[test]
//! fn pull_into_workspace() {
//!     let ws = TestWorkspace::new();
//!     ws.seed_remote_tree(keyed_encoding(&sample_tree()));
//!     // ... run the orchestrator against ws.remote()
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
