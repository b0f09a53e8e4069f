//! # Tandem Testkit
//!
//! Test utilities for tandem.
//!
//! This crate provides:
//! - Fixed timestamps, sample records and seeded in-memory store pairs
//! - Property-based generators for realistic record sets
//! - A pure simulation of applying a delta, for convergence checks
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tandem_testkit::prelude::*;
//!
//! #[test]
//! fn linked_pair_is_quiet() {
//!     let stores = StorePair::new();
//!     stores.seed_linked("1", "page-1", "Adopt Rust", "Architecture");
//!     assert!(stores.converged());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod convergence;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::convergence::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use convergence::*;
pub use fixtures::*;
pub use generators::*;
