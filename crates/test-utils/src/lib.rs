//! Shared test utilities for the k6-runner workspace.
//!
//! This crate provides common testing infrastructure including:
//! - A fake k6 executable with scripted behavior
//! - A parser for JavaScript string literals, to check escaped output
//! - Scratch directory and report path helpers
//! - Common request fixtures
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { workspace = true }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{fixtures, FakeEngine, EngineBehavior};
//! ```

#[cfg(unix)]
pub mod fake_engine;
pub mod fixtures;
pub mod js;
pub mod paths;

// Re-export commonly used items at the crate root
#[cfg(unix)]
pub use fake_engine::*;
pub use js::*;
pub use paths::*;
