//! services/package_generator/src/lib.rs
//!
//! Adapters, configuration and the SQS entry point for the package generation
//! Lambda. The binary in `src/bin/package_generator.rs` wires these together.

pub mod adapters;
pub mod config;
pub mod error;
pub mod handler;
