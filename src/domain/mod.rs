//! Domain logic: signals, policies, ledger, sizing, benchmark, stats
//! and the simulation driver.

pub mod benchmark;
pub mod config;
pub mod driver;
pub mod error;
pub mod evaluator;
pub mod ledger;
pub mod policy;
pub mod signal;
pub mod sizing;
pub mod stats;
