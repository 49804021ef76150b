//! Aggregator quote/build API client
//!
//! Exact-in quotes and swap-transaction builds against the Jupiter v6
//! API. Responses are normalized into `AggregatorQuote` at this boundary;
//! nothing downstream touches provider-specific field names.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use solana_sdk::transaction::VersionedTransaction;
use tracing::debug;

use crate::error::{Error, Result};

/// Normalized exact-in quote
#[derive(Debug, Clone)]
pub struct AggregatorQuote {
    pub out_amount: u64,
    pub price_impact_pct: f64,
    /// Raw quote payload, replayed verbatim into the swap build request
    pub raw: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    #[serde(rename = "outAmount")]
    out_amount: String,
    #[serde(rename = "priceImpactPct")]
    price_impact_pct: String,
}

#[derive(Debug, Deserialize)]
struct SwapResponse {
    #[serde(rename = "swapTransaction")]
    swap_transaction: Option<String>,
    error: Option<String>,
}

/// Jupiter v6 API client
pub struct AggregatorClient {
    http: reqwest::Client,
    base_url: String,
}

impl AggregatorClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .unwrap_or_default(),
            base_url: base_url.to_string(),
        }
    }

    /// Exact-in quote honoring the caller's slippage tolerance.
    ///
    /// Returns `None` when the aggregator has no route for the pair.
    pub async fn quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount: u64,
        slippage_bps: u32,
    ) -> Result<Option<AggregatorQuote>> {
        let url = format!(
            "{}/quote?inputMint={}&outputMint={}&amount={}&slippageBps={}&swapMode=ExactIn",
            self.base_url, input_mint, output_mint, amount, slippage_bps
        );

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::UpstreamUnavailable(e.to_string()))?;

        if response.status().as_u16() == 404 || response.status().as_u16() == 400 {
            debug!("aggregator has no route for {} -> {}", input_mint, output_mint);
            return Ok(None);
        }

        if !response.status().is_success() {
            return Err(Error::UpstreamUnavailable(format!(
                "aggregator quote returned {}",
                response.status()
            )));
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Deserialization(e.to_string()))?;

        let parsed: QuoteResponse = serde_json::from_value(raw.clone())
            .map_err(|e| Error::Deserialization(e.to_string()))?;

        let out_amount: u64 = parsed
            .out_amount
            .parse()
            .map_err(|_| Error::Deserialization("unparseable outAmount".to_string()))?;

        let price_impact_pct: f64 = parsed.price_impact_pct.parse().unwrap_or(0.0) * 100.0;

        Ok(Some(AggregatorQuote {
            out_amount,
            price_impact_pct,
            raw,
        }))
    }

    /// Build an unsigned swap transaction from a previously fetched quote
    pub async fn swap_transaction(
        &self,
        quote: &AggregatorQuote,
        user_pubkey: &str,
        priority_fee_lamports: u64,
    ) -> Result<VersionedTransaction> {
        let body = json!({
            "quoteResponse": quote.raw,
            "userPublicKey": user_pubkey,
            "wrapAndUnwrapSol": true,
            "dynamicComputeUnitLimit": true,
            "prioritizationFeeLamports": priority_fee_lamports,
        });

        let response: SwapResponse = self
            .http
            .post(format!("{}/swap", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::TransactionBuild(e.to_string()))?
            .json()
            .await
            .map_err(|e| Error::Deserialization(e.to_string()))?;

        if let Some(error) = response.error {
            return Err(Error::TransactionBuild(error));
        }

        let encoded = response
            .swap_transaction
            .ok_or_else(|| Error::TransactionBuild("no transaction in response".to_string()))?;

        decode_base64_transaction(&encoded)
    }
}

/// Decode a base64-encoded wire transaction as returned by the build APIs
pub fn decode_base64_transaction(encoded: &str) -> Result<VersionedTransaction> {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;

    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|e| Error::Deserialization(format!("invalid base64 transaction: {}", e)))?;

    bincode::deserialize(&bytes)
        .map_err(|e| Error::Deserialization(format!("invalid wire transaction: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_response_parsing() {
        let json = r#"{
            "outAmount": "32258064516",
            "priceImpactPct": "0.0333",
            "routePlan": []
        }"#;
        let parsed: QuoteResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.out_amount, "32258064516");

        let impact: f64 = parsed.price_impact_pct.parse::<f64>().unwrap() * 100.0;
        assert!((impact - 3.33).abs() < 0.01);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_base64_transaction("not base64 at all!!").is_err());
        // Valid base64 but not a transaction
        assert!(decode_base64_transaction("aGVsbG8gd29ybGQ=").is_err());
    }
}
