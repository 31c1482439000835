//! HTTP request handlers for the k6 API.

pub mod api;
pub mod health;
pub mod run;
