//! Error types for the swap engine

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the swap engine
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    // Caller-facing validation errors (reject immediately, no retry)
    #[error("Validation error: {0}")]
    Validation(String),

    // Secret vault errors
    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    // RPC errors
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("RPC timeout after {0}ms")]
    RpcTimeout(u64),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    // Quote / guard errors
    #[error("Quote unavailable: {0}")]
    QuoteUnavailable(String),

    #[error("Price feed unavailable: {0}")]
    PriceFeedUnavailable(String),

    #[error("Trade blocked: {0}")]
    GuardBlocked(String),

    // Execution errors
    #[error("Transaction build failed: {0}")]
    TransactionBuild(String),

    #[error("Transaction send failed: {0}")]
    TransactionSend(String),

    #[error("Transaction failed on chain: {0}")]
    OnChainFailure(String),

    #[error("Transaction expired before confirmation")]
    Expired,

    #[error("Transaction not confirmed within {0}s")]
    NotConfirmed(u64),

    #[error("All providers exhausted: {0}")]
    ProvidersExhausted(String),

    #[error("Insufficient balance: {available} available, {required} required")]
    InsufficientBalance { available: u64, required: u64 },

    // Curve math errors
    #[error("Bonding curve decode failed: {0}")]
    BondingCurveDecode(String),

    #[error("Price calculation overflow")]
    PriceOverflow,

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is transient and resolved by provider cascade
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Rpc(_)
                | Error::RpcTimeout(_)
                | Error::UpstreamUnavailable(_)
                | Error::TransactionBuild(_)
                | Error::TransactionSend(_)
                | Error::Expired
                | Error::NotConfirmed(_)
        )
    }

    /// Check if this error is a terminal per-trade decision (no retry)
    pub fn is_terminal_decision(&self) -> bool {
        matches!(
            self,
            Error::Validation(_)
                | Error::QuoteUnavailable(_)
                | Error::GuardBlocked(_)
                | Error::ProvidersExhausted(_)
        )
    }

    /// Check if this error must be logged with audit context
    pub fn is_security_relevant(&self) -> bool {
        matches!(self, Error::Decryption(_) | Error::Encryption(_))
    }
}

/// Strip API keys and similar secrets from a message before it is logged
/// or propagated outside the engine.
pub fn redact_secrets(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    for (i, part) in message.split("api-key=").enumerate() {
        if i == 0 {
            out.push_str(part);
            continue;
        }
        out.push_str("api-key=[redacted]");
        // Keep whatever followed the key value
        if let Some(rest) = part.find(|c: char| c == '&' || c == ' ' || c == '"') {
            out.push_str(&part[rest..]);
        }
    }
    out
}

// Conversion from solana_client errors
impl From<solana_client::client_error::ClientError> for Error {
    fn from(e: solana_client::client_error::ClientError) -> Self {
        Error::Rpc(redact_secrets(&e.to_string()))
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
