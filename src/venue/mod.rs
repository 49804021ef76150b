//! Venue resolution
//!
//! Classifies which execution surface currently governs an asset: an
//! early-stage bonding curve, a secondary launchpad curve, or a graduated
//! AMM/aggregator market. Getting this wrong means quoting against a venue
//! that will not execute the trade, so the resolver short-circuits on the
//! first confident signal and falls back to reading program-owned account
//! state directly when the metadata APIs are unavailable.

pub mod curve;

use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Deserialize;
use solana_sdk::pubkey::Pubkey;
use tracing::{debug, warn};

use crate::config::QuoteConfig;
use crate::error::{Error, Result};
use crate::rpc::GovernedRpc;

use curve::{derive_curve_address, BondingCurve};

/// A distinct execution surface with its own quoting/execution mechanics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Venue {
    /// Primary launchpad bonding curve (closed-form pricing)
    PumpCurve,
    /// Secondary launchpad bonding curve (no public quote API)
    MoonshotCurve,
    /// Graduated: trades on a conventional AMM via the aggregator
    Graduated,
    /// Could not be determined; executor falls back to its generic cascade
    Unknown,
}

impl std::fmt::Display for Venue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Venue::PumpCurve => write!(f, "pump-curve"),
            Venue::MoonshotCurve => write!(f, "moonshot-curve"),
            Venue::Graduated => write!(f, "graduated"),
            Venue::Unknown => write!(f, "unknown"),
        }
    }
}

/// Classification confidence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    High,
    Low,
}

/// Which execution surface governs an asset right now
#[derive(Debug, Clone)]
pub struct VenueClassification {
    pub mint: String,
    pub venue: Venue,
    pub on_curve: bool,
    pub confidence: Confidence,
}

impl VenueClassification {
    fn unknown(mint: &str) -> Self {
        Self {
            mint: mint.to_string(),
            venue: Venue::Unknown,
            on_curve: false,
            confidence: Confidence::Low,
        }
    }
}

// Adapter structs for upstream metadata APIs. Internal logic never
// branches on these shapes; they are normalized at this boundary.

#[derive(Debug, Deserialize)]
struct CurveApiCoin {
    complete: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct MoonshotToken {
    /// Curve progress percent; 100 means migrated
    progress: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DexPairsResponse {
    pairs: Option<Vec<DexPair>>,
}

#[derive(Debug, Deserialize)]
struct DexPair {
    #[serde(rename = "dexId")]
    dex_id: String,
}

/// Resolves the governing venue for an asset
pub struct VenueResolver {
    http: reqwest::Client,
    rpc: Arc<GovernedRpc>,
    config: QuoteConfig,
    cache: DashMap<String, (VenueClassification, Instant)>,
    ttl: Duration,
}

impl VenueResolver {
    pub fn new(rpc: Arc<GovernedRpc>, config: QuoteConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .unwrap_or_default();

        let ttl = Duration::from_secs(config.classification_ttl_secs);

        Self {
            http,
            rpc,
            config,
            cache: DashMap::new(),
            ttl,
        }
    }

    /// Classify the venue governing `mint`.
    ///
    /// Checks the bonding-curve metadata API, then the secondary launchpad
    /// API, then DEX pair discovery, short-circuiting on the first
    /// confident signal; reads the curve account over RPC when the APIs
    /// are inconclusive. Total failure yields `Venue::Unknown`.
    pub async fn classify(&self, mint: &str) -> VenueClassification {
        if let Some(entry) = self.cache.get(mint) {
            let (classification, cached_at) = entry.value();
            if cached_at.elapsed() < self.ttl {
                return classification.clone();
            }
        }

        let classification = self.classify_uncached(mint).await;

        // Unknown is a failure signal, not a fact worth caching
        if classification.venue != Venue::Unknown {
            self.cache
                .insert(mint.to_string(), (classification.clone(), Instant::now()));
        }

        classification
    }

    async fn classify_uncached(&self, mint: &str) -> VenueClassification {
        match self.check_curve_api(mint).await {
            Ok(Some(classification)) => return classification,
            Ok(None) => {}
            Err(e) => debug!("curve metadata API inconclusive for {}: {}", mint, e),
        }

        match self.check_moonshot_api(mint).await {
            Ok(Some(classification)) => return classification,
            Ok(None) => {}
            Err(e) => debug!("moonshot metadata API inconclusive for {}: {}", mint, e),
        }

        match self.check_dex_pairs(mint).await {
            Ok(Some(classification)) => return classification,
            Ok(None) => {}
            Err(e) => debug!("DEX pair discovery inconclusive for {}: {}", mint, e),
        }

        // APIs unavailable or inconclusive: read program-owned state
        match self.check_curve_account(mint).await {
            Ok(Some(classification)) => return classification,
            Ok(None) => {}
            Err(e) => warn!("RPC curve account read failed for {}: {}", mint, e),
        }

        debug!("venue resolution exhausted for {}, deferring to cascade", mint);
        VenueClassification::unknown(mint)
    }

    /// Primary launchpad metadata. Distinguishes still-on-curve from
    /// graduated for the same platform.
    async fn check_curve_api(&self, mint: &str) -> Result<Option<VenueClassification>> {
        let url = format!("{}/coins/{}", self.config.curve_api_url, mint);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::UpstreamUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Ok(None);
        }

        let coin: CurveApiCoin = response
            .json()
            .await
            .map_err(|e| Error::Deserialization(e.to_string()))?;

        let Some(complete) = coin.complete else {
            return Ok(None);
        };

        Ok(Some(if complete {
            VenueClassification {
                mint: mint.to_string(),
                venue: Venue::Graduated,
                on_curve: false,
                confidence: Confidence::High,
            }
        } else {
            VenueClassification {
                mint: mint.to_string(),
                venue: Venue::PumpCurve,
                on_curve: true,
                confidence: Confidence::High,
            }
        }))
    }

    async fn check_moonshot_api(&self, mint: &str) -> Result<Option<VenueClassification>> {
        let url = format!("{}/token/v1/solana/{}", self.config.moonshot_api_url, mint);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::UpstreamUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Ok(None);
        }

        let token: MoonshotToken = response
            .json()
            .await
            .map_err(|e| Error::Deserialization(e.to_string()))?;

        let Some(progress) = token.progress else {
            return Ok(None);
        };

        Ok(Some(if progress >= 100.0 {
            VenueClassification {
                mint: mint.to_string(),
                venue: Venue::Graduated,
                on_curve: false,
                confidence: Confidence::High,
            }
        } else {
            VenueClassification {
                mint: mint.to_string(),
                venue: Venue::MoonshotCurve,
                on_curve: true,
                confidence: Confidence::High,
            }
        }))
    }

    /// A live DEX pair means the asset already trades on a conventional
    /// market.
    async fn check_dex_pairs(&self, mint: &str) -> Result<Option<VenueClassification>> {
        let url = format!("{}/latest/dex/tokens/{}", self.config.dexscreener_url, mint);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::UpstreamUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Ok(None);
        }

        let data: DexPairsResponse = response
            .json()
            .await
            .map_err(|e| Error::Deserialization(e.to_string()))?;

        let has_amm_pair = data
            .pairs
            .unwrap_or_default()
            .iter()
            .any(|p| p.dex_id != "pumpfun" && p.dex_id != "moonshot");

        if has_amm_pair {
            Ok(Some(VenueClassification {
                mint: mint.to_string(),
                venue: Venue::Graduated,
                on_curve: false,
                confidence: Confidence::High,
            }))
        } else {
            Ok(None)
        }
    }

    /// Direct read of the bonding-curve PDA when the APIs are down
    async fn check_curve_account(&self, mint: &str) -> Result<Option<VenueClassification>> {
        let mint_key =
            Pubkey::from_str(mint).map_err(|e| Error::Validation(format!("bad mint: {}", e)))?;
        let (curve_address, _) = derive_curve_address(&mint_key);

        let account = match self.rpc.get_account(&curve_address).await {
            Ok(account) => account,
            // No curve account at the PDA: not a launchpad token
            Err(Error::Rpc(message)) if message.contains("AccountNotFound") => return Ok(None),
            Err(e) => return Err(e),
        };

        let curve = BondingCurve::try_from_account_data(&account.data)?;

        Ok(Some(if curve.complete {
            VenueClassification {
                mint: mint.to_string(),
                venue: Venue::Graduated,
                on_curve: false,
                confidence: Confidence::High,
            }
        } else {
            VenueClassification {
                mint: mint.to_string(),
                venue: Venue::PumpCurve,
                on_curve: true,
                confidence: Confidence::High,
            }
        }))
    }

    /// Fetch and decode the live curve state for a mint
    pub async fn fetch_curve_state(&self, mint: &Pubkey) -> Result<BondingCurve> {
        let (curve_address, _) = derive_curve_address(mint);
        let account = self.rpc.get_account(&curve_address).await?;
        BondingCurve::try_from_account_data(&account.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_classification_defers_to_cascade() {
        let classification = VenueClassification::unknown("mint123");
        assert_eq!(classification.venue, Venue::Unknown);
        assert!(!classification.on_curve);
        assert_eq!(classification.confidence, Confidence::Low);
    }

    #[test]
    fn test_venue_display() {
        assert_eq!(Venue::PumpCurve.to_string(), "pump-curve");
        assert_eq!(Venue::Graduated.to_string(), "graduated");
    }
}
