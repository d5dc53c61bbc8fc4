//! BREAKSCAN: intraday watchlist scanner
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod alerts;
pub mod config;
pub mod dashboard;
pub mod engine;
pub mod market;
pub mod signals;
pub mod types;
