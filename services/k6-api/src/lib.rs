//! k6 API Service Library
//!
//! HTTP server that renders k6 scripts from request parameters, runs them
//! through the k6 executable and returns the HTML report.

pub mod config;
pub mod error;
pub mod handlers;
pub mod runner;
pub mod server;
pub mod state;
pub mod tracker;
