//! Evaluation harness and iteration driver for the Magnifier simulator.
//!
//! Builds on `magnifier-core`'s data model and algorithms, adding CSV I/O,
//! the ground-truth-scoring evaluator, and the multi-variant iteration
//! driver. The CLI binaries (`magnifier-sim`, `magnifier-sweep`) are thin
//! wrappers around this crate.

#![deny(unused_import_braces, unused_qualifications)]

pub mod csv_source;
pub mod driver;
pub mod eval;
pub mod output;
