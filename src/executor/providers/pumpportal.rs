//! Native launch trade API client and providers
//!
//! The launchpad's local-transaction API builds unsigned transactions for
//! both its bonding-curve pool and its post-graduation AMM pool, so two
//! provider instances share this client.
//!
//! Fee and rate limits apply - don't spam requests.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use solana_sdk::transaction::VersionedTransaction;
use tracing::debug;

use crate::error::{Error, Result};
use crate::executor::provider::{SwapProvider, SwapRequest, TradeDirection};
use crate::quote::aggregator::decode_base64_transaction;
use crate::venue::curve::CURVE_TOKEN_DECIMALS;
use crate::venue::Venue;

/// Trade action
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PortalAction {
    Buy,
    Sell,
}

/// Pool the transaction is built against
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PortalPool {
    Pump,
    #[serde(rename = "pump-amm")]
    PumpAmm,
    Moonshot,
    Auto,
}

/// Local-transaction build request (returns an unsigned transaction)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalTradeRequest {
    pub action: PortalAction,
    pub mint: String,
    /// SOL amount for buys, token amount for sells
    pub amount: String,
    /// "true" if amount is denominated in SOL
    pub denominated_in_sol: String,
    /// Slippage percentage (e.g., 25 for 25%)
    pub slippage: u32,
    /// Priority fee in SOL
    pub priority_fee: f64,
    /// Public key of the trader
    pub public_key: String,
    pub pool: PortalPool,
}

#[derive(Debug, Clone, Deserialize)]
struct PortalTradeResponse {
    transaction: Option<String>,
    error: Option<String>,
}

/// Launch trade API client
pub struct PumpPortalClient {
    http: reqwest::Client,
    base_url: String,
}

impl PumpPortalClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .unwrap_or_default(),
            base_url: base_url.to_string(),
        }
    }

    /// Fetch an unsigned transaction for the given trade
    pub async fn unsigned_transaction(
        &self,
        request: &PortalTradeRequest,
    ) -> Result<VersionedTransaction> {
        debug!(
            "requesting unsigned {} transaction for {} (pool {:?})",
            serde_json::to_string(&request.action).unwrap_or_default(),
            request.mint,
            request.pool
        );

        let response: PortalTradeResponse = self
            .http
            .post(format!("{}/trade-local", self.base_url))
            .json(request)
            .send()
            .await
            .map_err(|e| Error::TransactionBuild(format!("HTTP request failed: {}", e)))?
            .json()
            .await
            .map_err(|e| Error::Deserialization(format!("Failed to parse response: {}", e)))?;

        if let Some(error) = response.error {
            return Err(Error::TransactionBuild(error));
        }

        let encoded = response
            .transaction
            .ok_or_else(|| Error::TransactionBuild("No transaction in response".to_string()))?;

        decode_base64_transaction(&encoded)
    }
}

/// Build a portal request from the executor's uniform swap request
pub fn portal_request(request: &SwapRequest, pool: PortalPool) -> PortalTradeRequest {
    let (action, amount, denominated_in_sol) = match request.direction {
        TradeDirection::Buy => (
            PortalAction::Buy,
            format!("{}", request.amount_raw as f64 / 1e9),
            "true",
        ),
        TradeDirection::Sell => (
            PortalAction::Sell,
            format!(
                "{}",
                request.amount_raw as f64 / 10f64.powi(CURVE_TOKEN_DECIMALS as i32)
            ),
            "false",
        ),
    };

    PortalTradeRequest {
        action,
        mint: request.mint.clone(),
        amount,
        denominated_in_sol: denominated_in_sol.to_string(),
        slippage: request.slippage_bps / 100,
        priority_fee: request.priority_fee_lamports as f64 / 1e9,
        public_key: request.wallet.to_string(),
        pool,
    }
}

/// Which portal pool family a provider instance builds against
#[derive(Debug, Clone, Copy)]
enum PoolSelection {
    /// Bonding-curve pools; the concrete pool follows the trade's venue
    Curve,
    /// Post-graduation AMM pool
    Amm,
}

/// Swap provider backed by the launch trade API
pub struct PumpPortalProvider {
    client: PumpPortalClient,
    selection: PoolSelection,
    name: &'static str,
}

impl PumpPortalProvider {
    /// Provider for the launchpad bonding-curve pools. The pool sent to
    /// the API matches the trade's venue, so Moonshot trades build
    /// against the Moonshot curve rather than the pump.fun one.
    pub fn native(base_url: &str, timeout_secs: u64) -> Self {
        Self {
            client: PumpPortalClient::new(base_url, timeout_secs),
            selection: PoolSelection::Curve,
            name: "pumpportal",
        }
    }

    /// Provider for the post-graduation AMM pool
    pub fn amm(base_url: &str, timeout_secs: u64) -> Self {
        Self {
            client: PumpPortalClient::new(base_url, timeout_secs),
            selection: PoolSelection::Amm,
            name: "pump-amm",
        }
    }

    fn pool_for(&self, venue: Venue) -> PortalPool {
        match self.selection {
            PoolSelection::Curve => match venue {
                Venue::MoonshotCurve => PortalPool::Moonshot,
                _ => PortalPool::Pump,
            },
            PoolSelection::Amm => PortalPool::PumpAmm,
        }
    }
}

#[async_trait]
impl SwapProvider for PumpPortalProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn prepare(&self, request: &SwapRequest) -> Result<VersionedTransaction> {
        let portal = portal_request(request, self.pool_for(request.venue));
        self.client.unsigned_transaction(&portal).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::pubkey::Pubkey;

    fn sample_request(direction: TradeDirection) -> SwapRequest {
        SwapRequest {
            direction,
            mint: "DYw8jCTfwHNRJhhmFcbXvVDTqWMEVFBX6ZKUmG5CNSKK".to_string(),
            amount_raw: 1_000_000_000,
            wallet: Pubkey::new_unique(),
            slippage_bps: 2500,
            priority_fee_lamports: 500_000,
            venue: Venue::PumpCurve,
        }
    }

    #[test]
    fn test_buy_request_is_sol_denominated() {
        let portal = portal_request(&sample_request(TradeDirection::Buy), PortalPool::Pump);
        assert_eq!(portal.amount, "1");
        assert_eq!(portal.denominated_in_sol, "true");
        assert_eq!(portal.slippage, 25);

        let json = serde_json::to_string(&portal).unwrap();
        assert!(json.contains("\"action\":\"buy\""));
        assert!(json.contains("\"denominatedInSol\":\"true\""));
        assert!(json.contains("\"pool\":\"pump\""));
    }

    #[test]
    fn test_sell_request_is_token_denominated() {
        let portal = portal_request(&sample_request(TradeDirection::Sell), PortalPool::PumpAmm);
        assert_eq!(portal.amount, "1000");
        assert_eq!(portal.denominated_in_sol, "false");

        let json = serde_json::to_string(&portal).unwrap();
        assert!(json.contains("\"pool\":\"pump-amm\""));
    }

    #[test]
    fn test_priority_fee_converted_to_sol() {
        let portal = portal_request(&sample_request(TradeDirection::Buy), PortalPool::Pump);
        assert!((portal.priority_fee - 0.0005).abs() < 1e-12);
    }

    #[test]
    fn test_curve_provider_pool_follows_venue() {
        let native = PumpPortalProvider::native("http://localhost", 5);
        assert!(matches!(native.pool_for(Venue::PumpCurve), PortalPool::Pump));
        assert!(matches!(
            native.pool_for(Venue::MoonshotCurve),
            PortalPool::Moonshot
        ));
        assert!(matches!(native.pool_for(Venue::Graduated), PortalPool::Pump));

        // The AMM instance ignores venue entirely
        let amm = PumpPortalProvider::amm("http://localhost", 5);
        assert!(matches!(
            amm.pool_for(Venue::MoonshotCurve),
            PortalPool::PumpAmm
        ));
    }

    #[test]
    fn test_moonshot_trade_builds_against_moonshot_pool() {
        let native = PumpPortalProvider::native("http://localhost", 5);
        let mut request = sample_request(TradeDirection::Buy);
        request.venue = Venue::MoonshotCurve;

        let portal = portal_request(&request, native.pool_for(request.venue));
        let json = serde_json::to_string(&portal).unwrap();
        assert!(json.contains("\"pool\":\"moonshot\""));
    }
}
