//! Aggregator-backed execution provider
//!
//! Builds swaps through the same aggregator the quote service uses, so a
//! graduated token's quote and execution go through the same route engine.

use async_trait::async_trait;
use solana_sdk::transaction::VersionedTransaction;

use crate::error::{Error, Result};
use crate::executor::provider::{SwapProvider, SwapRequest, TradeDirection};
use crate::quote::aggregator::AggregatorClient;
use crate::quote::price_feed::SOL_MINT;

pub struct JupiterProvider {
    client: AggregatorClient,
}

impl JupiterProvider {
    pub fn new(base_url: &str, timeout_secs: u64) -> Self {
        Self {
            client: AggregatorClient::new(base_url, timeout_secs),
        }
    }
}

#[async_trait]
impl SwapProvider for JupiterProvider {
    fn name(&self) -> &'static str {
        "jupiter"
    }

    async fn prepare(&self, request: &SwapRequest) -> Result<VersionedTransaction> {
        let (input_mint, output_mint) = match request.direction {
            TradeDirection::Buy => (SOL_MINT, request.mint.as_str()),
            TradeDirection::Sell => (request.mint.as_str(), SOL_MINT),
        };

        let quote = self
            .client
            .quote(input_mint, output_mint, request.amount_raw, request.slippage_bps)
            .await?
            .ok_or_else(|| {
                Error::QuoteUnavailable(format!("no aggregator route for {}", request.mint))
            })?;

        self.client
            .swap_transaction(
                &quote,
                &request.wallet.to_string(),
                request.priority_fee_lamports,
            )
            .await
    }
}
