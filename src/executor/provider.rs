//! Provider seam for the execution cascade
//!
//! Every execution backend is reduced to one capability: turn a uniform
//! swap request into an unsigned transaction. Signing, submission, and
//! confirmation are the executor's job, identical across providers, which
//! is what makes the cascade a straight loop over trait objects.

use async_trait::async_trait;
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::transaction::VersionedTransaction;

use crate::error::Result;
use crate::venue::Venue;

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeDirection {
    Buy,
    Sell,
}

impl std::fmt::Display for TradeDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeDirection::Buy => write!(f, "buy"),
            TradeDirection::Sell => write!(f, "sell"),
        }
    }
}

/// How much to trade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountSpec {
    /// Raw units: lamports for buys, raw token units for sells
    Exact(u64),
    /// Sell the wallet's full balance of the mint. Invalid for buys.
    EntireBalance,
}

/// Uniform swap request handed to every provider in the cascade
#[derive(Debug, Clone)]
pub struct SwapRequest {
    pub direction: TradeDirection,
    pub mint: String,
    /// Resolved raw amount: lamports in for buys, token units for sells
    pub amount_raw: u64,
    pub wallet: Pubkey,
    pub slippage_bps: u32,
    pub priority_fee_lamports: u64,
    /// Venue the trade was quoted against
    pub venue: Venue,
}

/// One cascade attempt, recorded win or lose
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionAttempt {
    pub provider: String,
    pub signature: Option<String>,
    pub confirmed: bool,
    pub error: Option<String>,
    pub timing_ms: u64,
}

/// Outcome of a confirmed swap
#[derive(Debug, Clone)]
pub struct SwapResult {
    /// The confirmed signature. Signatures of failed attempts stay in
    /// their attempt records.
    pub signatures: Vec<String>,
    /// Provider whose transaction confirmed
    pub source_provider: String,
    pub output_amount_estimate: Option<u64>,
    pub input_amount_used: u64,
    pub attempts: Vec<ExecutionAttempt>,
}

/// An execution backend that can build an unsigned swap transaction
#[async_trait]
pub trait SwapProvider: Send + Sync {
    /// Stable provider name, used in logs and attempt records
    fn name(&self) -> &'static str;

    /// Build an unsigned transaction for the request. Implementations
    /// return errors rather than panicking; the cascade treats any error
    /// as "this provider cannot do it" and moves on.
    async fn prepare(&self, request: &SwapRequest) -> Result<VersionedTransaction>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_display() {
        assert_eq!(TradeDirection::Buy.to_string(), "buy");
        assert_eq!(TradeDirection::Sell.to_string(), "sell");
    }

    #[test]
    fn test_amount_spec_equality() {
        assert_eq!(AmountSpec::Exact(5), AmountSpec::Exact(5));
        assert_ne!(AmountSpec::Exact(5), AmountSpec::EntireBalance);
    }
}
