//! Raydium trade API provider
//!
//! Two-step build against the Raydium transaction API: compute an exact-in
//! swap, then exchange the compute response for an unsigned V0 transaction.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use solana_sdk::transaction::VersionedTransaction;
use tracing::debug;

use crate::error::{Error, Result};
use crate::executor::provider::{SwapProvider, SwapRequest, TradeDirection};
use crate::quote::aggregator::decode_base64_transaction;
use crate::quote::price_feed::SOL_MINT;

const DEFAULT_BASE_URL: &str = "https://transaction-v1.raydium.io";

#[derive(Debug, Deserialize)]
struct ComputeResponse {
    success: bool,
    data: Option<serde_json::Value>,
    msg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BuildResponse {
    success: bool,
    data: Option<Vec<BuiltTransaction>>,
    msg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BuiltTransaction {
    transaction: String,
}

pub struct RaydiumProvider {
    http: reqwest::Client,
    base_url: String,
}

impl RaydiumProvider {
    pub fn new(timeout_secs: u64) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, timeout_secs)
    }

    pub fn with_base_url(base_url: &str, timeout_secs: u64) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .unwrap_or_default(),
            base_url: base_url.to_string(),
        }
    }

    async fn compute_swap(&self, request: &SwapRequest) -> Result<serde_json::Value> {
        let (input_mint, output_mint) = match request.direction {
            TradeDirection::Buy => (SOL_MINT, request.mint.as_str()),
            TradeDirection::Sell => (request.mint.as_str(), SOL_MINT),
        };

        let url = format!(
            "{}/compute/swap-base-in?inputMint={}&outputMint={}&amount={}&slippageBps={}&txVersion=V0",
            self.base_url, input_mint, output_mint, request.amount_raw, request.slippage_bps
        );

        let response: ComputeResponse = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::UpstreamUnavailable(e.to_string()))?
            .json()
            .await
            .map_err(|e| Error::Deserialization(e.to_string()))?;

        if !response.success {
            return Err(Error::QuoteUnavailable(format!(
                "swap compute rejected: {}",
                response.msg.unwrap_or_else(|| "no reason given".to_string())
            )));
        }

        response
            .data
            .ok_or_else(|| Error::Deserialization("compute response missing data".to_string()))
    }
}

#[async_trait]
impl SwapProvider for RaydiumProvider {
    fn name(&self) -> &'static str {
        "raydium"
    }

    async fn prepare(&self, request: &SwapRequest) -> Result<VersionedTransaction> {
        let compute = self.compute_swap(request).await?;
        debug!("raydium compute ok for {}", request.mint);

        let body = json!({
            "computeUnitPriceMicroLamports": request.priority_fee_lamports.to_string(),
            "swapResponse": compute,
            "txVersion": "V0",
            "wallet": request.wallet.to_string(),
            "wrapSol": request.direction == TradeDirection::Buy,
            "unwrapSol": request.direction == TradeDirection::Sell,
        });

        let response: BuildResponse = self
            .http
            .post(format!("{}/transaction/swap-base-in", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::TransactionBuild(e.to_string()))?
            .json()
            .await
            .map_err(|e| Error::Deserialization(e.to_string()))?;

        if !response.success {
            return Err(Error::TransactionBuild(format!(
                "swap build rejected: {}",
                response.msg.unwrap_or_else(|| "no reason given".to_string())
            )));
        }

        let built = response
            .data
            .and_then(|mut txs| if txs.is_empty() { None } else { Some(txs.remove(0)) })
            .ok_or_else(|| Error::TransactionBuild("no transaction in response".to_string()))?;

        decode_base64_transaction(&built.transaction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_response_parsing() {
        let json = r#"{"success":true,"data":[{"transaction":"AAECAw=="}]}"#;
        let parsed: BuildResponse = serde_json::from_str(json).unwrap();
        assert!(parsed.success);
        assert_eq!(parsed.data.unwrap()[0].transaction, "AAECAw==");
    }

    #[test]
    fn test_failed_compute_carries_reason() {
        let json = r#"{"success":false,"msg":"ROUTE_NOT_FOUND"}"#;
        let parsed: ComputeResponse = serde_json::from_str(json).unwrap();
        assert!(!parsed.success);
        assert_eq!(parsed.msg.as_deref(), Some("ROUTE_NOT_FOUND"));
    }
}
