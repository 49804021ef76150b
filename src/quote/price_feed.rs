//! Settlement-asset reference price
//!
//! SOL/USD from a two-provider fallback chain. There is deliberately no
//! hardcoded price fallback: when both providers fail, quoting fails
//! closed rather than valuing trades against a stale number.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Wrapped SOL mint, the settlement asset for every venue here
pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";

#[derive(Debug, Deserialize)]
struct PrimaryPriceResponse {
    data: HashMap<String, PrimaryPriceEntry>,
}

#[derive(Debug, Deserialize)]
struct PrimaryPriceEntry {
    price: String,
}

#[derive(Debug, Deserialize)]
struct FallbackPriceEntry {
    usd: f64,
}

/// Two-provider SOL/USD reference price feed
pub struct SolPriceFeed {
    http: reqwest::Client,
    primary_url: String,
    fallback_url: String,
}

impl SolPriceFeed {
    pub fn new(primary_url: &str, fallback_url: &str, timeout_secs: u64) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .unwrap_or_default(),
            primary_url: primary_url.to_string(),
            fallback_url: fallback_url.to_string(),
        }
    }

    /// Freshly fetched SOL/USD. Tries the primary feed, then the
    /// fallback; fails closed when both are unavailable.
    pub async fn sol_usd(&self) -> Result<f64> {
        match self.fetch_primary().await {
            Ok(price) => return Ok(price),
            Err(e) => warn!("primary price feed failed: {}", e),
        }

        match self.fetch_fallback().await {
            Ok(price) => {
                debug!("using fallback price feed");
                Ok(price)
            }
            Err(e) => {
                warn!("fallback price feed failed: {}", e);
                Err(Error::PriceFeedUnavailable(
                    "both settlement price providers failed".to_string(),
                ))
            }
        }
    }

    async fn fetch_primary(&self) -> Result<f64> {
        let url = format!("{}?ids={}", self.primary_url, SOL_MINT);
        let response: PrimaryPriceResponse = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::UpstreamUnavailable(e.to_string()))?
            .json()
            .await
            .map_err(|e| Error::Deserialization(e.to_string()))?;

        let entry = response
            .data
            .get(SOL_MINT)
            .ok_or_else(|| Error::Deserialization("missing SOL entry".to_string()))?;

        let price: f64 = entry
            .price
            .parse()
            .map_err(|_| Error::Deserialization("unparseable price".to_string()))?;

        validate_price(price)
    }

    async fn fetch_fallback(&self) -> Result<f64> {
        let url = format!("{}?ids=solana&vs_currencies=usd", self.fallback_url);
        let response: HashMap<String, FallbackPriceEntry> = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::UpstreamUnavailable(e.to_string()))?
            .json()
            .await
            .map_err(|e| Error::Deserialization(e.to_string()))?;

        let entry = response
            .get("solana")
            .ok_or_else(|| Error::Deserialization("missing solana entry".to_string()))?;

        validate_price(entry.usd)
    }
}

fn validate_price(price: f64) -> Result<f64> {
    if price.is_finite() && price > 0.0 {
        Ok(price)
    } else {
        Err(Error::Deserialization(format!(
            "implausible settlement price: {}",
            price
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_price_rejects_non_positive() {
        assert!(validate_price(0.0).is_err());
        assert!(validate_price(-3.0).is_err());
        assert!(validate_price(f64::NAN).is_err());
        assert!(validate_price(f64::INFINITY).is_err());
        assert!(validate_price(142.5).is_ok());
    }

    #[test]
    fn test_primary_response_shape() {
        let json = format!(
            r#"{{"data":{{"{}":{{"price":"147.23"}}}}}}"#,
            SOL_MINT
        );
        let parsed: PrimaryPriceResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.data[SOL_MINT].price, "147.23");
    }

    #[test]
    fn test_fallback_response_shape() {
        let json = r#"{"solana":{"usd":146.9}}"#;
        let parsed: HashMap<String, FallbackPriceEntry> = serde_json::from_str(json).unwrap();
        assert!((parsed["solana"].usd - 146.9).abs() < f64::EPSILON);
    }
}
