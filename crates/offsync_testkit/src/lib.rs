//! # OffSync Testkit
//!
//! Test utilities for OffSync.
//!
//! This crate provides:
//! - A sale store and handler over a mock HTTP API
//! - A scripted handler for exact outcome sequences
//! - A runtime with manual clock and settable network
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use offsync_testkit::prelude::*;
//!
//! #[test]
//! fn sale_reaches_server() {
//!     let (runtime, store, client) = sale_runtime();
//!     store.insert(Sale::new("s-1", 1500));
//!     runtime.runner.enqueue(SALE, "s-1", OperationKind::Create, ExistingJobPolicy::Keep);
//!     runtime.runner.drain();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod scripted;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::scripted::*;
}

pub use fixtures::*;
pub use generators::*;
pub use scripted::*;
