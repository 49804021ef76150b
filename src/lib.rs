//! Venue-aware swap execution engine for Solana launchpad tokens.
//!
//! The engine resolves which venue currently governs a token (primary
//! bonding curve, secondary curve, or a graduated AMM market), quotes
//! against that venue's own mechanics, risk-checks the trade, and executes
//! it through an ordered provider cascade with hard on-chain confirmation.
//! All RPC access is governed by a persisted rate limiter and circuit
//! breaker, and wallet secrets live encrypted behind an AES-256-GCM vault.

pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod governor;
pub mod guard;
pub mod quote;
pub mod rpc;
pub mod trace;
pub mod vault;
pub mod venue;

pub use config::EngineConfig;
pub use engine::{TradeEngine, TradeOutcome};
pub use error::{Error, Result};
pub use executor::provider::{AmountSpec, SwapResult, TradeDirection};
pub use guard::GuardDecision;
pub use quote::Quote;
pub use vault::SecretVault;
pub use venue::{Venue, VenueClassification};

/// Initialize structured logging from `RUST_LOG`, defaulting to `info`
/// for this crate.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,swap_engine=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
