//! Address tagger: behavioral labels for prediction-market trading addresses.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod capability;
pub mod confidence;
pub mod config;
pub mod engine;
pub mod store;
pub mod taggers;
pub mod types;
