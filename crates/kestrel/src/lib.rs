//! Kestrel host library.
//!
//! This library exposes the host's modules for testing purposes.
//! The main entry point is the `kestrel` binary.

pub mod api;
pub mod audit;
pub mod config;
pub mod host;
pub mod server;
