//! xorj-copytrade core library.
//!
//! Two services share this crate: the analytics engine (ingestion, price enrichment,
//! metrics, trust-scoring, ranking) and the execution bot (strategy selection, portfolio
//! reconciliation, trade generation, HSM-signed execution, confirmation monitoring). Each
//! binary in `src/bin/` wires a subset of these modules into its own HTTP boundary.

pub mod analytics_http;
pub mod audit;
pub mod circuit_breaker;
pub mod config;
pub mod confirmation_monitor;
pub mod decimal_ext;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod hsm;
pub mod idempotency;
pub mod ingestion;
pub mod metrics;
pub mod orchestrator;
pub mod parser;
pub mod persistence;
pub mod price_feed;
pub mod processor;
pub mod ranking;
pub mod router_client;
pub mod rpc;
pub mod scheduler;
pub mod slippage;
pub mod strategy;
pub mod token_registry;
pub mod trade_generator;
pub mod trust_score;
pub mod types;
pub mod vault_reader;
