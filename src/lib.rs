//! Betslip Backend Library
//!
//! Accumulator bet slips over an append-only money ledger, settled against
//! local football result files.

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod middleware;
pub mod models;
pub mod names;
pub mod repository;
pub mod results;
pub mod settlement;
pub mod slip;
pub mod storage;
