//! Structured error taxonomy.
//!
//! `anyhow` is used for fallible startup/construction paths (see `config.rs`); these
//! `thiserror` enums model the recoverable domain errors from spec §7 so callers can
//! match on variant instead of string-sniffing.

use thiserror::Error;

/// Errors surfaced by the rate-limited RPC client (§4.1).
#[derive(Debug, Error, Clone)]
pub enum RpcError {
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("transient RPC failure: {0}")]
    Transient(String),
    #[error("fatal RPC failure: {0}")]
    Fatal(String),
}

/// Errors from the fault-tolerant batch processor (§4.8).
#[derive(Debug, Error, Clone)]
pub enum CircuitBreakerError {
    #[error("circuit breaker open: {breaker_name}")]
    Open { breaker_name: String },
    #[error("system trading halt asserted: {reason}")]
    SystemHalt { reason: String },
}

/// Errors from the idempotency manager (§4.14).
#[derive(Debug, Error, Clone)]
pub enum IdempotencyError {
    #[error("operation {idem_key} already started and has not expired")]
    InFlight { idem_key: String },
    #[error("checksum mismatch for {idem_key}: possible tamper")]
    ChecksumMismatch { idem_key: String },
    #[error("storage failure: {0}")]
    Storage(String),
}

/// Errors from the slippage controller (§4.15).
#[derive(Debug, Error, Clone)]
pub enum SlippageError {
    #[error("realized slippage {realized_percent} exceeds bound {max_percent}")]
    Exceeded {
        realized_percent: f64,
        max_percent: f64,
    },
    #[error("failed to fetch a fresh quote: {0}")]
    QuoteUnavailable(String),
}

/// Errors from the executor state machine (§4.12).
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("idempotency guard refused execution: {0}")]
    Idempotency(#[from] IdempotencyError),
    #[error("slippage check failed: {0}")]
    Slippage(#[from] SlippageError),
    #[error("circuit breaker rejected trade: {0}")]
    Breaker(#[from] CircuitBreakerError),
    #[error("transaction build failed: {0}")]
    Build(String),
    #[error("simulation failed: {0}")]
    Simulation(String),
    #[error("signing failed: {0}")]
    Signing(#[from] HsmError),
    #[error("submission failed: {0}")]
    Submission(String),
}

/// Errors from the HSM-mediated signer (§4.13).
#[derive(Debug, Error, Clone)]
pub enum HsmError {
    #[error("connection to HSM provider failed: {0}")]
    Connection(String),
    #[error("signing operation rejected: {0}")]
    Signing(String),
}

/// Data-quality and validation errors surfaced by the parser (§4.2) and trade generator.
#[derive(Debug, Error, Clone)]
pub enum ValidationError {
    #[error("missing pre/post token balance for wallet")]
    MissingBalance,
    #[error("identical input/output mint")]
    IdenticalMint,
    #[error("amount out of range: {0}")]
    AmountOutOfRange(String),
    #[error("unsupported mint: {0}")]
    UnsupportedMint(String),
    #[error("allocation percentages sum to {sum}, expected 100")]
    AllocationSumMismatch { sum: f64 },
    #[error("trade value below minimum: {0}")]
    BelowMinimumValue(String),
}

/// Integrity violations (audit / idempotency checksum mismatches) — always a `security_violation`.
#[derive(Debug, Error, Clone)]
#[error("integrity violation: {0}")]
pub struct IntegrityViolation(pub String);
