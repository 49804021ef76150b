//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub governor: GovernorConfig,
    #[serde(default)]
    pub quote: QuoteConfig,
    #[serde(default)]
    pub guard: GuardConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_ws_endpoint")]
    pub ws_endpoint: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: default_rpc_endpoint(),
            ws_endpoint: default_ws_endpoint(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Shared rate limiter and circuit breaker for the upstream RPC endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct GovernorConfig {
    /// Maximum RPC calls per rolling window
    #[serde(default = "default_max_calls")]
    pub max_calls_per_window: u32,
    /// Rolling window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Circuit breaker cooldown after an observed 429, in seconds
    #[serde(default = "default_breaker_cooldown")]
    pub breaker_cooldown_secs: u64,
    /// Path for persisted rate-limit state (in-process fallback when unset)
    #[serde(default)]
    pub state_path: Option<String>,
    /// Path for usage telemetry, appended asynchronously
    #[serde(default)]
    pub usage_path: Option<String>,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            max_calls_per_window: default_max_calls(),
            window_secs: default_window_secs(),
            breaker_cooldown_secs: default_breaker_cooldown(),
            state_path: None,
            usage_path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuoteConfig {
    /// Aggregator quote/build API (exact-in)
    #[serde(default = "default_aggregator_url")]
    pub aggregator_url: String,
    /// Launchpad trade API used for native builds and simulation quotes
    #[serde(default = "default_launch_api_url")]
    pub launch_api_url: String,
    /// Bonding-curve metadata API
    #[serde(default = "default_curve_api_url")]
    pub curve_api_url: String,
    /// Secondary launchpad metadata API
    #[serde(default = "default_moonshot_api_url")]
    pub moonshot_api_url: String,
    /// DEX pair discovery API
    #[serde(default = "default_dexscreener_url")]
    pub dexscreener_url: String,
    /// Settlement-asset price feed, primary
    #[serde(default = "default_price_primary_url")]
    pub price_primary_url: String,
    /// Settlement-asset price feed, fallback
    #[serde(default = "default_price_fallback_url")]
    pub price_fallback_url: String,
    /// Venue classification cache TTL in seconds
    #[serde(default = "default_classification_ttl")]
    pub classification_ttl_secs: u64,
    /// Per-call HTTP timeout for quote/metadata fetches
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            aggregator_url: default_aggregator_url(),
            launch_api_url: default_launch_api_url(),
            curve_api_url: default_curve_api_url(),
            moonshot_api_url: default_moonshot_api_url(),
            dexscreener_url: default_dexscreener_url(),
            price_primary_url: default_price_primary_url(),
            price_fallback_url: default_price_fallback_url(),
            classification_ttl_secs: default_classification_ttl(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

/// Pre-trade risk thresholds. These are operational tuning values and are
/// deliberately runtime configuration, not constants.
#[derive(Debug, Clone, Deserialize)]
pub struct GuardConfig {
    /// Maximum executable-over-displayed price premium, percent
    #[serde(default = "default_max_premium_pct")]
    pub max_premium_pct: f64,
    /// Maximum venue-reported price impact, percent
    #[serde(default = "default_max_impact_pct")]
    pub max_price_impact_pct: f64,
    /// Displayed-vs-executable deviation above which the quote is treated
    /// as a data error rather than a market move, percent
    #[serde(default = "default_max_deviation_pct")]
    pub max_displayed_deviation_pct: f64,
    /// Block unconditionally when any source reports a transfer tax
    #[serde(default = "default_true")]
    pub block_on_tax: bool,
    /// Token risk/tax metadata API
    #[serde(default = "default_tax_api_url")]
    pub tax_api_url: String,
    /// Secondary token security API
    #[serde(default = "default_security_api_url")]
    pub security_api_url: String,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_premium_pct: default_max_premium_pct(),
            max_price_impact_pct: default_max_impact_pct(),
            max_displayed_deviation_pct: default_max_deviation_pct(),
            block_on_tax: true,
            tax_api_url: default_tax_api_url(),
            security_api_url: default_security_api_url(),
        }
    }
}

/// Priority fee selection for built transactions
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PriorityFeeMode {
    /// Fixed micro-lamport tier
    Fixed { lamports: u64 },
    /// Sampled from recent network prioritization fees
    Percentile { percentile: u8 },
}

impl Default for PriorityFeeMode {
    fn default() -> Self {
        Self::Fixed { lamports: 100_000 }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u32,
    #[serde(default)]
    pub priority_fee: PriorityFeeMode,
    /// Overall hard-confirmation deadline per attempt
    #[serde(default = "default_confirm_timeout_secs")]
    pub confirm_timeout_secs: u64,
    /// How long to wait on the confirmation subscription before polling
    #[serde(default = "default_subscription_timeout_secs")]
    pub subscription_timeout_secs: u64,
    /// Definitive status poll interval
    #[serde(default = "default_poll_interval_ms")]
    pub status_poll_interval_ms: u64,
    /// Per-provider unsigned-transaction build timeout
    #[serde(default = "default_build_timeout_secs")]
    pub build_timeout_secs: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            slippage_bps: default_slippage_bps(),
            priority_fee: PriorityFeeMode::default(),
            confirm_timeout_secs: default_confirm_timeout_secs(),
            subscription_timeout_secs: default_subscription_timeout_secs(),
            status_poll_interval_ms: default_poll_interval_ms(),
            build_timeout_secs: default_build_timeout_secs(),
        }
    }
}

fn default_rpc_endpoint() -> String {
    "https://api.mainnet-beta.solana.com".to_string()
}
fn default_ws_endpoint() -> String {
    "wss://api.mainnet-beta.solana.com".to_string()
}
fn default_timeout_ms() -> u64 {
    10_000
}
fn default_max_calls() -> u32 {
    50
}
fn default_window_secs() -> u64 {
    60
}
fn default_breaker_cooldown() -> u64 {
    300
}
fn default_aggregator_url() -> String {
    "https://quote-api.jup.ag/v6".to_string()
}
fn default_launch_api_url() -> String {
    "https://pumpportal.fun/api".to_string()
}
fn default_curve_api_url() -> String {
    "https://frontend-api.pump.fun".to_string()
}
fn default_moonshot_api_url() -> String {
    "https://api.moonshot.cc".to_string()
}
fn default_dexscreener_url() -> String {
    "https://api.dexscreener.com".to_string()
}
fn default_price_primary_url() -> String {
    "https://api.jup.ag/price/v2".to_string()
}
fn default_price_fallback_url() -> String {
    "https://api.coingecko.com/api/v3/simple/price".to_string()
}
fn default_classification_ttl() -> u64 {
    30
}
fn default_http_timeout_secs() -> u64 {
    5
}
fn default_max_premium_pct() -> f64 {
    25.0
}
fn default_max_impact_pct() -> f64 {
    20.0
}
fn default_max_deviation_pct() -> f64 {
    90.0
}
fn default_tax_api_url() -> String {
    "https://api.rugcheck.xyz".to_string()
}
fn default_security_api_url() -> String {
    "https://api.gopluslabs.io".to_string()
}
fn default_slippage_bps() -> u32 {
    2500
}
fn default_confirm_timeout_secs() -> u64 {
    30
}
fn default_subscription_timeout_secs() -> u64 {
    10
}
fn default_poll_interval_ms() -> u64 {
    2_000
}
fn default_build_timeout_secs() -> u64 {
    10
}
fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rpc: RpcConfig::default(),
            governor: GovernorConfig::default(),
            quote: QuoteConfig::default(),
            guard: GuardConfig::default(),
            executor: ExecutorConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix SWAP_ENGINE_)
            .add_source(
                config::Environment::with_prefix("SWAP_ENGINE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: EngineConfig = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.executor.slippage_bps > 10_000 {
            anyhow::bail!("slippage_bps cannot exceed 10000 (100%)");
        }

        if self.governor.max_calls_per_window == 0 {
            anyhow::bail!("max_calls_per_window must be positive");
        }

        if self.governor.window_secs == 0 {
            anyhow::bail!("window_secs must be positive");
        }

        if self.guard.max_premium_pct <= 0.0 {
            anyhow::bail!("max_premium_pct must be positive");
        }

        if self.guard.max_price_impact_pct <= 0.0 {
            anyhow::bail!("max_price_impact_pct must be positive");
        }

        if let PriorityFeeMode::Percentile { percentile } = self.executor.priority_fee {
            if percentile > 100 {
                anyhow::bail!("priority fee percentile must be 0-100");
            }
        }

        if self.executor.confirm_timeout_secs == 0 {
            anyhow::bail!("confirm_timeout_secs must be positive");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.governor.max_calls_per_window, 50);
        assert_eq!(config.governor.breaker_cooldown_secs, 300);
        assert!((config.guard.max_premium_pct - 25.0).abs() < f64::EPSILON);
        assert!((config.guard.max_price_impact_pct - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rejects_excessive_slippage() {
        let mut config = EngineConfig::default();
        config.executor.slippage_bps = 20_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_window() {
        let mut config = EngineConfig::default();
        config.governor.window_secs = 0;
        assert!(config.validate().is_err());
    }
}
