//! Perps Indexer
//!
//! Pulls futures market data from the CoinGlass API into a JSON data tree
//! and optionally commits it to git. See the `perps-indexer` binary for the
//! `daily` and `depth` workflows.

pub mod cli;
pub mod clock;
pub mod config;
pub mod indexer;
pub mod models;
pub mod scrapers;
pub mod store;
pub mod vcs;
