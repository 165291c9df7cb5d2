//! # Rentledger Library
//!
//! Core functionality for the rentledger service: the rent payment
//! reconciliation engine (ledger calculator, ingestion channels, STK push
//! state machine, batch jobs) plus server configuration.

pub mod channels;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod ledger;
pub mod models;
pub mod repositories;
pub mod server;
pub mod stk;
pub mod telemetry;
pub use migration;
