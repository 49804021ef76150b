//! Venue-matched quoting
//!
//! A quote is only meaningful when it is computed against the venue that
//! will actually execute the trade. Each venue has its own mechanism:
//! closed-form math for the primary curve, transaction simulation for the
//! secondary curve, and the aggregator's route quote for graduated tokens.

pub mod aggregator;
pub mod price_feed;
pub mod simulation;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use solana_sdk::pubkey::Pubkey;
use tracing::{debug, warn};

use crate::config::QuoteConfig;
use crate::error::{Error, Result};
use crate::rpc::GovernedRpc;
use crate::venue::curve::CURVE_TOKEN_DECIMALS;
use crate::venue::{Confidence, Venue, VenueClassification, VenueResolver};

use aggregator::AggregatorClient;
use price_feed::{SolPriceFeed, SOL_MINT};
use simulation::simulated_buy_output;

const LAMPORTS_PER_SOL: f64 = 1e9;

/// An executable quote for a prospective buy
#[derive(Debug, Clone)]
pub struct Quote {
    /// Venue the quote was computed against. Execution must happen on the
    /// same venue or the numbers are meaningless.
    pub venue: Venue,
    /// Effective per-token price in USD at this trade size
    pub executable_price_usd: f64,
    /// Tokens received, in raw units
    pub output_amount: u64,
    /// Lamports spent
    pub input_amount: u64,
    /// Estimated price impact of this trade, percent. `None` when the
    /// quote mechanism cannot measure impact (single-shot simulation).
    pub price_impact_pct: Option<f64>,
    pub confidence: Confidence,
    /// Which mechanism produced the quote
    pub source: &'static str,
}

#[derive(Debug, Deserialize)]
struct DexPairsResponse {
    pairs: Option<Vec<DexPair>>,
}

#[derive(Debug, Deserialize)]
struct DexPair {
    #[serde(rename = "priceUsd")]
    price_usd: Option<String>,
}

/// Computes executable quotes against the venue that governs the asset
pub struct QuoteService {
    rpc: Arc<GovernedRpc>,
    resolver: Arc<VenueResolver>,
    aggregator: AggregatorClient,
    price_feed: SolPriceFeed,
    portal: crate::executor::providers::pumpportal::PumpPortalClient,
    http: reqwest::Client,
    config: QuoteConfig,
}

impl QuoteService {
    pub fn new(rpc: Arc<GovernedRpc>, resolver: Arc<VenueResolver>, config: QuoteConfig) -> Self {
        Self {
            rpc,
            aggregator: AggregatorClient::new(&config.aggregator_url, config.http_timeout_secs),
            price_feed: SolPriceFeed::new(
                &config.price_primary_url,
                &config.price_fallback_url,
                config.http_timeout_secs,
            ),
            portal: crate::executor::providers::pumpportal::PumpPortalClient::new(
                &config.launch_api_url,
                config.http_timeout_secs,
            ),
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.http_timeout_secs))
                .build()
                .unwrap_or_default(),
            resolver,
            config,
        }
    }

    /// Quote a buy of `input_lamports` worth of `mint` against the venue
    /// in `classification`.
    ///
    /// Returns `Ok(None)` when no quote can be produced for the venue
    /// (e.g. no aggregator route, or the venue is unknown). Callers that
    /// gate trades on quotes must treat `None` and `Err` identically:
    /// no quote, no trade.
    pub async fn quote_buy(
        &self,
        classification: &VenueClassification,
        input_lamports: u64,
        slippage_bps: u32,
        wallet: &Pubkey,
    ) -> Result<Option<Quote>> {
        match classification.venue {
            Venue::PumpCurve => self.quote_curve(&classification.mint, input_lamports).await,
            Venue::MoonshotCurve => {
                self.quote_simulated(&classification.mint, input_lamports, slippage_bps, wallet)
                    .await
            }
            Venue::Graduated => {
                self.quote_aggregator(&classification.mint, input_lamports, slippage_bps)
                    .await
            }
            Venue::Unknown => {
                debug!("no quote mechanism for unknown venue ({})", classification.mint);
                Ok(None)
            }
        }
    }

    /// Closed-form quote from live bonding-curve reserves
    async fn quote_curve(&self, mint: &str, input_lamports: u64) -> Result<Option<Quote>> {
        let mint_key = Pubkey::from_str(mint)
            .map_err(|e| Error::Validation(format!("bad mint: {}", e)))?;

        let curve = self.resolver.fetch_curve_state(&mint_key).await?;
        let (tokens_out, price_impact_pct) = curve.quote_buy(input_lamports)?;

        if tokens_out == 0 {
            return Ok(None);
        }

        let sol_usd = self.price_feed.sol_usd().await?;
        let executable_price_usd =
            per_token_price_usd(input_lamports, tokens_out, sol_usd)?;

        Ok(Some(Quote {
            venue: Venue::PumpCurve,
            executable_price_usd,
            output_amount: tokens_out,
            input_amount: input_lamports,
            price_impact_pct: Some(price_impact_pct),
            confidence: Confidence::High,
            source: "bonding-curve",
        }))
    }

    /// Simulation-based quote for the secondary curve. Impact cannot be
    /// derived from a single simulation, so it is reported as unmeasured
    /// with low confidence; the guard's deviation check covers the gap.
    async fn quote_simulated(
        &self,
        mint: &str,
        input_lamports: u64,
        slippage_bps: u32,
        wallet: &Pubkey,
    ) -> Result<Option<Quote>> {
        let Some(tokens_out) =
            simulated_buy_output(&self.rpc, &self.portal, mint, wallet, input_lamports, slippage_bps)
                .await?
        else {
            return Ok(None);
        };

        let sol_usd = self.price_feed.sol_usd().await?;
        let executable_price_usd =
            per_token_price_usd(input_lamports, tokens_out, sol_usd)?;

        Ok(Some(Quote {
            venue: Venue::MoonshotCurve,
            executable_price_usd,
            output_amount: tokens_out,
            input_amount: input_lamports,
            price_impact_pct: None,
            confidence: Confidence::Low,
            source: "curve-simulation",
        }))
    }

    /// Route quote from the aggregator for graduated tokens
    async fn quote_aggregator(
        &self,
        mint: &str,
        input_lamports: u64,
        slippage_bps: u32,
    ) -> Result<Option<Quote>> {
        let Some(route) = self
            .aggregator
            .quote(SOL_MINT, mint, input_lamports, slippage_bps)
            .await?
        else {
            return Ok(None);
        };

        let sol_usd = self.price_feed.sol_usd().await?;
        let executable_price_usd =
            per_token_price_usd(input_lamports, route.out_amount, sol_usd)?;

        Ok(Some(Quote {
            venue: Venue::Graduated,
            executable_price_usd,
            output_amount: route.out_amount,
            input_amount: input_lamports,
            price_impact_pct: Some(route.price_impact_pct),
            confidence: Confidence::High,
            source: "aggregator",
        }))
    }

    /// Market-displayed per-token USD price, as shown by the pair
    /// screener. Best effort: `None` when no pair or price is listed.
    pub async fn displayed_price_usd(&self, mint: &str) -> Result<Option<f64>> {
        let url = format!("{}/latest/dex/tokens/{}", self.config.dexscreener_url, mint);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::UpstreamUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            warn!("pair screener returned {} for {}", response.status(), mint);
            return Ok(None);
        }

        let data: DexPairsResponse = response
            .json()
            .await
            .map_err(|e| Error::Deserialization(e.to_string()))?;

        let price = data
            .pairs
            .unwrap_or_default()
            .iter()
            .filter_map(|p| p.price_usd.as_deref())
            .filter_map(|s| s.parse::<f64>().ok())
            .find(|p| p.is_finite() && *p > 0.0);

        Ok(price)
    }
}

/// Effective per-token USD price: USD spent divided by UI tokens received
fn per_token_price_usd(input_lamports: u64, tokens_out: u64, sol_usd: f64) -> Result<f64> {
    let usd_in = input_lamports as f64 / LAMPORTS_PER_SOL * sol_usd;
    let tokens_ui = tokens_out as f64 / 10f64.powi(CURVE_TOKEN_DECIMALS as i32);

    if tokens_ui <= 0.0 {
        return Err(Error::QuoteUnavailable("zero token output".to_string()));
    }

    let price = usd_in / tokens_ui;
    if !price.is_finite() || price <= 0.0 {
        return Err(Error::PriceOverflow);
    }

    Ok(price)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_token_price() {
        // 1 SOL at $150 buying 32,258.064517 UI tokens
        let price = per_token_price_usd(1_000_000_000, 32_258_064_517, 150.0).unwrap();
        assert!((price - 0.00465).abs() < 0.0001);
    }

    #[test]
    fn test_per_token_price_rejects_zero_output() {
        assert!(per_token_price_usd(1_000_000_000, 0, 150.0).is_err());
    }

    #[test]
    fn test_displayed_price_parsing() {
        let json = r#"{"pairs":[{"priceUsd":null},{"priceUsd":"0.00471"}]}"#;
        let parsed: DexPairsResponse = serde_json::from_str(json).unwrap();
        let price = parsed
            .pairs
            .unwrap()
            .iter()
            .filter_map(|p| p.price_usd.as_deref())
            .filter_map(|s| s.parse::<f64>().ok())
            .next();
        assert_eq!(price, Some(0.00471));
    }
}
