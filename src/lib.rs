//! Pitwall Library
//!
//! This module exposes the cache, data, CLI and server modules for use by the binary
//! and in integration tests.

pub mod cache;
pub mod cli;
pub mod config;
pub mod data;
pub mod display;
pub mod server;
