//! ephemera CLI library.
//!
//! Exposes the CLI building blocks for integration testing.
//! In production, `ephemera` is used as a binary (main.rs).

pub mod app;
pub mod cli;
pub mod error;
pub mod logging;
pub mod output;
pub mod report;
pub mod signal;
