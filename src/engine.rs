//! Trade engine facade
//!
//! Wires the resolver, quote service, guard, governor, vault, and executor
//! together behind one entry point. The orchestration rule is fixed: a
//! trade that the guard blocks is never executed, and every stage of a
//! trade is recorded on its tracer.

use std::sync::Arc;
use std::time::Duration;

use solana_sdk::pubkey::Pubkey;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::executor::provider::{AmountSpec, SwapResult, TradeDirection};
use crate::executor::SwapExecutor;
use crate::governor::store::{FileStateStore, MemoryStateStore, RateLimitStore};
use crate::governor::RpcGovernor;
use crate::guard::{GuardDecision, TradeGuard};
use crate::guard::tax::TaxScanner;
use crate::quote::{Quote, QuoteService};
use crate::rpc::GovernedRpc;
use crate::trace::{ExecutionTracer, TraceStep};
use crate::vault::SecretVault;
use crate::venue::{VenueClassification, VenueResolver};

/// A confirmed trade plus its full step trace
#[derive(Debug)]
pub struct TradeOutcome {
    pub result: SwapResult,
    pub trace: Vec<TraceStep>,
}

/// Top-level engine owning every component
pub struct TradeEngine {
    config: EngineConfig,
    resolver: Arc<VenueResolver>,
    quotes: Arc<QuoteService>,
    guard: TradeGuard,
    executor: SwapExecutor,
    vault: Arc<SecretVault>,
}

impl TradeEngine {
    /// Build an engine from configuration. The governor persists state to
    /// the configured path, or degrades to an in-process store when no
    /// path is set.
    pub fn new(config: EngineConfig, vault: SecretVault) -> Self {
        let store: Arc<dyn RateLimitStore> = match &config.governor.state_path {
            Some(path) => Arc::new(FileStateStore::new(
                path,
                config.governor.usage_path.clone().map(Into::into),
            )),
            None => Arc::new(MemoryStateStore::new()),
        };

        let governor = Arc::new(RpcGovernor::new(config.governor.clone(), store));
        let rpc = Arc::new(GovernedRpc::new(
            &config.rpc.endpoint,
            governor,
            Duration::from_millis(config.rpc.timeout_ms),
        ));

        let resolver = Arc::new(VenueResolver::new(Arc::clone(&rpc), config.quote.clone()));
        let quotes = Arc::new(QuoteService::new(
            Arc::clone(&rpc),
            Arc::clone(&resolver),
            config.quote.clone(),
        ));

        let scanner = TaxScanner::new(
            Arc::clone(&rpc),
            &config.guard,
            config.quote.http_timeout_secs,
        );
        let guard = TradeGuard::new(Arc::clone(&quotes), scanner, config.guard.clone());

        let vault = Arc::new(vault);
        let executor = SwapExecutor::new(rpc, Arc::clone(&vault), &config);

        Self {
            config,
            resolver,
            quotes,
            guard,
            executor,
            vault,
        }
    }

    /// Engine with the master key taken from the environment
    pub fn from_config(config: EngineConfig) -> Result<Self> {
        let vault = SecretVault::from_env()?;
        Ok(Self::new(config, vault))
    }

    /// Resolve the venue currently governing a mint
    pub async fn resolve_venue(&self, mint: &str) -> VenueClassification {
        self.resolver.classify(mint).await
    }

    /// Venue-matched quote for a prospective buy
    pub async fn get_quote(
        &self,
        mint: &str,
        input_lamports: u64,
        wallet: &Pubkey,
    ) -> Result<Option<Quote>> {
        let classification = self.resolver.classify(mint).await;
        self.quotes
            .quote_buy(
                &classification,
                input_lamports,
                self.config.executor.slippage_bps,
                wallet,
            )
            .await
    }

    /// Run the guard's check chain for a prospective buy. A displayed
    /// market price the caller already holds is used as-is; pass `None`
    /// to have the guard look one up.
    pub async fn validate_trade(
        &self,
        mint: &str,
        input_lamports: u64,
        displayed_price_usd: Option<f64>,
        wallet: &Pubkey,
    ) -> GuardDecision {
        let classification = self.resolver.classify(mint).await;
        self.guard
            .validate(
                &classification,
                input_lamports,
                self.config.executor.slippage_bps,
                displayed_price_usd,
                wallet,
            )
            .await
    }

    /// Execute a swap without re-running the guard. Callers that want
    /// guarded execution use [`TradeEngine::trade`].
    pub async fn execute_swap(
        &self,
        direction: TradeDirection,
        mint: &str,
        amount: AmountSpec,
        encrypted_secret: &str,
        slippage_bps: Option<u32>,
        cancel: &CancellationToken,
    ) -> Result<TradeOutcome> {
        let tracer = ExecutionTracer::new();
        let classification = self.resolver.classify(mint).await;
        tracer.step(
            "classify",
            format!("{} resolved as {}", mint, classification.venue),
        );

        let result = self
            .executor
            .execute(
                direction,
                mint,
                amount,
                classification.venue,
                encrypted_secret,
                slippage_bps,
                cancel,
                &tracer,
            )
            .await?;

        Ok(TradeOutcome {
            result,
            trace: tracer.steps(),
        })
    }

    /// Guarded buy: classify, quote, validate, execute. A blocked guard
    /// decision terminates the trade before any transaction is built.
    pub async fn trade(
        &self,
        mint: &str,
        input_lamports: u64,
        encrypted_secret: &str,
        cancel: &CancellationToken,
    ) -> Result<TradeOutcome> {
        let tracer = ExecutionTracer::new();

        let classification = self.resolver.classify(mint).await;
        tracer.step(
            "classify",
            format!(
                "{} resolved as {} ({:?} confidence)",
                mint, classification.venue, classification.confidence
            ),
        );

        let wallet = self.wallet_pubkey(encrypted_secret)?;
        let decision = self
            .guard
            .validate(
                &classification,
                input_lamports,
                self.config.executor.slippage_bps,
                None,
                &wallet,
            )
            .await;

        if !decision.is_valid {
            let reason = decision
                .block_reason
                .unwrap_or_else(|| "unspecified".to_string());
            tracer.step("guard", format!("blocked: {}", reason));
            return Err(Error::GuardBlocked(reason));
        }

        tracer.step(
            "guard",
            format!(
                "passed (premium {:.2}%, impact {:.2}%)",
                decision.premium_pct, decision.price_impact_pct
            ),
        );
        info!("guard passed for {}, executing", mint);

        let result = self
            .executor
            .execute(
                TradeDirection::Buy,
                mint,
                AmountSpec::Exact(input_lamports),
                classification.venue,
                encrypted_secret,
                None,
                cancel,
                &tracer,
            )
            .await?;

        Ok(TradeOutcome {
            result,
            trace: tracer.steps(),
        })
    }

    /// Encrypt a wallet secret for storage
    pub fn encrypt_wallet_secret(&self, plaintext: &str) -> Result<String> {
        self.vault.encrypt(plaintext)
    }

    /// Decrypt a stored wallet secret
    pub fn decrypt_wallet_secret(&self, ciphertext: &str) -> Result<String> {
        self.vault.decrypt(ciphertext)
    }

    fn wallet_pubkey(&self, encrypted_secret: &str) -> Result<Pubkey> {
        use solana_sdk::signer::Signer;
        let secret = self.vault.decrypt(encrypted_secret)?;
        let keypair = crate::executor::keypair_from_secret(&secret)?;
        Ok(keypair.pubkey())
    }
}
