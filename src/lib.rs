//! tablegate: credential proxy and table client for a Bitable-backed ledger.
//!
//! Re-exports modules needed by integration tests in `tests/`.

pub mod api;
pub mod app;
pub mod cache;
pub mod client;
pub mod config;
pub mod credential;
pub mod errors;
pub mod ledger;
pub mod models;
pub mod proxy;
