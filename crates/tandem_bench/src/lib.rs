//! Benchmark support for tandem.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod utils;
