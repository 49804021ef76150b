//! Swap execution
//!
//! Drives a trade through an ordered cascade of execution providers. Each
//! attempt is built, signed with a freshly decrypted wallet secret,
//! submitted, and hard-confirmed before the next provider is tried.
//! Expired, failed, and deadline-unconfirmed attempts all cascade to the
//! next provider; only cancellation stops the cascade early.

pub mod balance;
pub mod confirm;
pub mod provider;
pub mod providers;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use solana_sdk::hash::Hash;
use solana_sdk::message::VersionedMessage;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use solana_sdk::transaction::VersionedTransaction;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{EngineConfig, PriorityFeeMode};
use crate::error::{Error, Result};
use crate::rpc::GovernedRpc;
use crate::trace::ExecutionTracer;
use crate::vault::SecretVault;
use crate::venue::Venue;

use confirm::{is_slippage_error, ConfirmOutcome, Confirmer};
use provider::{AmountSpec, ExecutionAttempt, SwapProvider, SwapRequest, SwapResult, TradeDirection};
use providers::{JupiterProvider, PumpPortalProvider, RaydiumProvider};

const DEFAULT_PRIORITY_FEE_LAMPORTS: u64 = 100_000;

/// Provider ordering per venue. On-curve venues lead with the launch
/// trade API, which is the only backend that reliably builds curve
/// trades; everything else leads with the aggregator.
pub fn provider_order(venue: Venue) -> [&'static str; 4] {
    match venue {
        Venue::PumpCurve | Venue::MoonshotCurve => {
            ["pumpportal", "jupiter", "raydium", "pump-amm"]
        }
        Venue::Graduated | Venue::Unknown => {
            ["jupiter", "raydium", "pump-amm", "pumpportal"]
        }
    }
}

/// Result of one attempt handed back to the cascade loop
pub(crate) enum AttemptOutcome {
    /// Landed and confirmed; carries the signature
    Confirmed(String),
    /// This attempt is dead; the cascade may continue
    Failed {
        signature: Option<String>,
        error: String,
        slippage: bool,
    },
    /// Stop the whole cascade (cancellation)
    Aborted {
        signature: Option<String>,
        error: String,
    },
}

pub(crate) enum CascadeVerdict {
    Won(usize),
    Exhausted,
    Aborted(String),
}

/// Run the provider cascade: one attempt per provider in order, plus a
/// single same-provider retry when the failure reads as a slippage bound
/// violation.
pub(crate) async fn run_cascade<F, Fut>(
    providers: &[String],
    mut attempt: F,
) -> (Vec<ExecutionAttempt>, CascadeVerdict)
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = AttemptOutcome>,
{
    let mut attempts: Vec<ExecutionAttempt> = Vec::new();

    for name in providers {
        let mut retried = false;
        loop {
            let started = Instant::now();
            let outcome = attempt(name.clone()).await;
            let timing_ms = started.elapsed().as_millis() as u64;

            match outcome {
                AttemptOutcome::Confirmed(signature) => {
                    attempts.push(ExecutionAttempt {
                        provider: name.clone(),
                        signature: Some(signature),
                        confirmed: true,
                        error: None,
                        timing_ms,
                    });
                    let winner = attempts.len() - 1;
                    return (attempts, CascadeVerdict::Won(winner));
                }
                AttemptOutcome::Failed {
                    signature,
                    error,
                    slippage,
                } => {
                    warn!("provider {} attempt failed: {}", name, error);
                    attempts.push(ExecutionAttempt {
                        provider: name.clone(),
                        signature,
                        confirmed: false,
                        error: Some(error),
                        timing_ms,
                    });
                    if slippage && !retried {
                        retried = true;
                        continue;
                    }
                    break;
                }
                AttemptOutcome::Aborted { signature, error } => {
                    attempts.push(ExecutionAttempt {
                        provider: name.clone(),
                        signature,
                        confirmed: false,
                        error: Some(error.clone()),
                        timing_ms,
                    });
                    return (attempts, CascadeVerdict::Aborted(error));
                }
            }
        }
    }

    (attempts, CascadeVerdict::Exhausted)
}

/// Executes swaps through the provider cascade with hard confirmation
pub struct SwapExecutor {
    rpc: Arc<GovernedRpc>,
    confirmer: Confirmer,
    vault: Arc<SecretVault>,
    providers: Vec<Arc<dyn SwapProvider>>,
    config: crate::config::ExecutorConfig,
}

impl SwapExecutor {
    pub fn new(rpc: Arc<GovernedRpc>, vault: Arc<SecretVault>, config: &EngineConfig) -> Self {
        let timeout = config.quote.http_timeout_secs;
        let providers: Vec<Arc<dyn SwapProvider>> = vec![
            Arc::new(PumpPortalProvider::native(&config.quote.launch_api_url, timeout)),
            Arc::new(PumpPortalProvider::amm(&config.quote.launch_api_url, timeout)),
            Arc::new(JupiterProvider::new(&config.quote.aggregator_url, timeout)),
            Arc::new(RaydiumProvider::new(timeout)),
        ];

        Self {
            confirmer: Confirmer::new(
                Arc::clone(&rpc),
                &config.rpc.ws_endpoint,
                &config.executor,
            ),
            rpc,
            vault,
            providers,
            config: config.executor.clone(),
        }
    }

    /// Execute a swap to a confirmed result or a terminal error.
    ///
    /// The wallet secret is decrypted for the duration of this call only;
    /// the derived keypair is dropped before returning.
    pub async fn execute(
        &self,
        direction: TradeDirection,
        mint: &str,
        amount: AmountSpec,
        venue: Venue,
        encrypted_secret: &str,
        slippage_bps: Option<u32>,
        cancel: &CancellationToken,
        tracer: &ExecutionTracer,
    ) -> Result<SwapResult> {
        let secret = self.vault.decrypt(encrypted_secret)?;
        let keypair = keypair_from_secret(&secret)?;
        let wallet = keypair.pubkey();

        let amount_raw = self.resolve_amount(direction, mint, amount, &wallet).await?;
        let priority_fee_lamports = self.resolve_priority_fee().await;

        let request = SwapRequest {
            direction,
            mint: mint.to_string(),
            amount_raw,
            wallet,
            slippage_bps: slippage_bps.unwrap_or(self.config.slippage_bps),
            priority_fee_lamports,
            venue,
        };

        tracer.step(
            "executor",
            format!(
                "{} {} raw units of {} on {} (fee {} lamports)",
                direction, amount_raw, mint, venue, priority_fee_lamports
            ),
        );

        let order: Vec<String> = provider_order(venue)
            .iter()
            .map(|name| name.to_string())
            .collect();

        let (attempts, verdict) = run_cascade(&order, |name| {
            let request = request.clone();
            let keypair = &keypair;
            async move { self.attempt(&name, &request, keypair, cancel, tracer).await }
        })
        .await;

        match verdict {
            CascadeVerdict::Won(winner) => {
                let source_provider = attempts[winner].provider.clone();
                info!(
                    "swap confirmed via {} after {} attempt(s)",
                    source_provider,
                    attempts.len()
                );
                // Only the confirmed signature counts as a result; failed
                // attempts keep theirs in the attempt records.
                Ok(SwapResult {
                    signatures: attempts[winner].signature.clone().into_iter().collect(),
                    source_provider,
                    output_amount_estimate: None,
                    input_amount_used: amount_raw,
                    attempts,
                })
            }
            CascadeVerdict::Aborted(reason) => {
                Err(Error::Internal(format!("execution aborted: {}", reason)))
            }
            CascadeVerdict::Exhausted => {
                let summary = attempts
                    .iter()
                    .map(|a| {
                        format!(
                            "{}: {}",
                            a.provider,
                            a.error.as_deref().unwrap_or("no error recorded")
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("; ");
                Err(Error::ProvidersExhausted(summary))
            }
        }
    }

    async fn attempt(
        &self,
        name: &str,
        request: &SwapRequest,
        keypair: &Keypair,
        cancel: &CancellationToken,
        tracer: &ExecutionTracer,
    ) -> AttemptOutcome {
        if cancel.is_cancelled() {
            return AttemptOutcome::Aborted {
                signature: None,
                error: "cancelled before build".to_string(),
            };
        }

        let Some(provider) = self.providers.iter().find(|p| p.name() == name) else {
            return AttemptOutcome::Failed {
                signature: None,
                error: format!("no provider registered as {}", name),
                slippage: false,
            };
        };

        tracer.step(name, "building transaction");
        let built = match tokio::time::timeout(
            Duration::from_secs(self.config.build_timeout_secs),
            provider.prepare(request),
        )
        .await
        {
            Ok(Ok(transaction)) => transaction,
            Ok(Err(e)) => {
                return AttemptOutcome::Failed {
                    signature: None,
                    error: format!("build failed: {}", e),
                    slippage: false,
                }
            }
            Err(_) => {
                return AttemptOutcome::Failed {
                    signature: None,
                    error: "build timed out".to_string(),
                    slippage: false,
                }
            }
        };

        let (blockhash, last_valid_block_height) = match self.rpc.get_latest_blockhash().await {
            Ok(result) => result,
            Err(e) => {
                return AttemptOutcome::Failed {
                    signature: None,
                    error: format!("blockhash fetch failed: {}", e),
                    slippage: false,
                }
            }
        };

        let signed = match sign_with_blockhash(built, blockhash, keypair) {
            Ok(transaction) => transaction,
            Err(e) => {
                return AttemptOutcome::Failed {
                    signature: None,
                    error: e.to_string(),
                    slippage: false,
                }
            }
        };

        // Last exit before money moves
        if cancel.is_cancelled() {
            return AttemptOutcome::Aborted {
                signature: None,
                error: "cancelled before submit".to_string(),
            };
        }

        let signature = match self.rpc.send_transaction(&signed).await {
            Ok(signature) => signature,
            Err(e) => {
                return AttemptOutcome::Failed {
                    signature: None,
                    error: format!("submit failed: {}", e),
                    slippage: false,
                }
            }
        };

        tracer.step(name, format!("submitted {}", signature));

        let outcome = self
            .confirmer
            .confirm(&signature, last_valid_block_height)
            .await;

        if outcome == ConfirmOutcome::Confirmed {
            tracer.step(name, format!("confirmed {}", signature));
            return AttemptOutcome::Confirmed(signature.to_string());
        }

        let slippage = matches!(&outcome, ConfirmOutcome::FailedOnChain(m) if is_slippage_error(m));
        let error = confirmation_error(&outcome, self.config.confirm_timeout_secs)
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown confirmation outcome".to_string());

        AttemptOutcome::Failed {
            signature: Some(signature.to_string()),
            error,
            slippage,
        }
    }

    async fn resolve_amount(
        &self,
        direction: TradeDirection,
        mint: &str,
        amount: AmountSpec,
        wallet: &Pubkey,
    ) -> Result<u64> {
        let balances = match amount {
            AmountSpec::EntireBalance => {
                let mint_key: Pubkey = mint
                    .parse()
                    .map_err(|_| Error::Validation(format!("bad mint: {}", mint)))?;
                balance::account_balances(&self.rpc, wallet, &mint_key).await?
            }
            AmountSpec::Exact(_) => Vec::new(),
        };
        balance::resolve_amount(amount, direction, &balances)
    }

    async fn resolve_priority_fee(&self) -> u64 {
        match &self.config.priority_fee {
            PriorityFeeMode::Fixed { lamports } => *lamports,
            PriorityFeeMode::Percentile { percentile } => {
                match self.rpc.get_recent_prioritization_fees(&[]).await {
                    Ok(fees) => {
                        let samples: Vec<u64> =
                            fees.iter().map(|f| f.prioritization_fee).collect();
                        percentile_fee(&samples, *percentile)
                            .unwrap_or(DEFAULT_PRIORITY_FEE_LAMPORTS)
                    }
                    Err(e) => {
                        warn!("fee sampling failed, using default: {}", e);
                        DEFAULT_PRIORITY_FEE_LAMPORTS
                    }
                }
            }
        }
    }
}

/// Map a non-confirmed confirmation outcome to its typed error. Every
/// fate short of confirmation is a dead attempt; the cascade moves on to
/// the next provider with this as the recorded reason.
fn confirmation_error(outcome: &ConfirmOutcome, deadline_secs: u64) -> Option<Error> {
    match outcome {
        ConfirmOutcome::Confirmed => None,
        ConfirmOutcome::FailedOnChain(message) => Some(Error::OnChainFailure(message.clone())),
        ConfirmOutcome::Expired => Some(Error::Expired),
        ConfirmOutcome::NotConfirmed => Some(Error::NotConfirmed(deadline_secs)),
    }
}

/// Stamp a fresh blockhash into an unsigned transaction and sign it
fn sign_with_blockhash(
    transaction: VersionedTransaction,
    blockhash: Hash,
    keypair: &Keypair,
) -> Result<VersionedTransaction> {
    let mut message = transaction.message;
    match &mut message {
        VersionedMessage::Legacy(m) => m.recent_blockhash = blockhash,
        VersionedMessage::V0(m) => m.recent_blockhash = blockhash,
    }

    VersionedTransaction::try_new(message, &[keypair])
        .map_err(|e| Error::TransactionSend(format!("signing failed: {}", e)))
}

/// Parse a decrypted wallet secret into a keypair. Accepts the base58
/// 64-byte form and the JSON byte-array form.
pub fn keypair_from_secret(secret: &str) -> Result<Keypair> {
    let trimmed = secret.trim();

    if let Ok(bytes) = bs58::decode(trimmed).into_vec() {
        if bytes.len() == 64 {
            if let Ok(keypair) = Keypair::from_bytes(&bytes) {
                return Ok(keypair);
            }
        }
    }

    if trimmed.starts_with('[') {
        if let Ok(bytes) = serde_json::from_str::<Vec<u8>>(trimmed) {
            if bytes.len() == 64 {
                if let Ok(keypair) = Keypair::from_bytes(&bytes) {
                    return Ok(keypair);
                }
            }
        }
    }

    Err(Error::Validation(
        "unrecognized wallet secret format".to_string(),
    ))
}

/// Fee at the given percentile of observed samples
fn percentile_fee(samples: &[u64], percentile: u8) -> Option<u64> {
    if samples.is_empty() {
        return None;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_unstable();
    let rank = (sorted.len() - 1) as f64 * (percentile.min(100) as f64 / 100.0);
    Some(sorted[rank.round() as usize])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    fn scripted(
        outcomes: Vec<AttemptOutcome>,
    ) -> RefCell<VecDeque<AttemptOutcome>> {
        RefCell::new(outcomes.into_iter().collect())
    }

    fn failed(error: &str) -> AttemptOutcome {
        AttemptOutcome::Failed {
            signature: None,
            error: error.to_string(),
            slippage: false,
        }
    }

    fn slippage_failed() -> AttemptOutcome {
        AttemptOutcome::Failed {
            signature: Some("sig-slip".to_string()),
            error: "custom program error: 0x1771".to_string(),
            slippage: true,
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_on_curve_order_leads_with_launch_api() {
        assert_eq!(
            provider_order(Venue::PumpCurve),
            ["pumpportal", "jupiter", "raydium", "pump-amm"]
        );
        assert_eq!(provider_order(Venue::MoonshotCurve)[0], "pumpportal");
    }

    #[test]
    fn test_graduated_order_leads_with_aggregator() {
        assert_eq!(
            provider_order(Venue::Graduated),
            ["jupiter", "raydium", "pump-amm", "pumpportal"]
        );
        assert_eq!(provider_order(Venue::Unknown)[0], "jupiter");
    }

    #[tokio::test]
    async fn test_cascade_advances_past_failures() {
        let script = scripted(vec![
            failed("blockhash expired before landing"),
            failed("blockhash expired before landing"),
            AttemptOutcome::Confirmed("sig-win".to_string()),
        ]);

        let (attempts, verdict) = run_cascade(&names(&["a", "b", "c", "d"]), |_| {
            let outcome = script.borrow_mut().pop_front().unwrap();
            async move { outcome }
        })
        .await;

        assert_eq!(attempts.len(), 3);
        assert!(matches!(verdict, CascadeVerdict::Won(2)));
        assert_eq!(attempts[2].provider, "c");
        assert!(attempts[2].confirmed);
        assert_eq!(attempts[2].signature.as_deref(), Some("sig-win"));
    }

    #[tokio::test]
    async fn test_slippage_gets_one_same_provider_retry() {
        let script = scripted(vec![
            slippage_failed(),
            AttemptOutcome::Confirmed("sig-retry".to_string()),
        ]);

        let (attempts, verdict) = run_cascade(&names(&["a", "b"]), |_| {
            let outcome = script.borrow_mut().pop_front().unwrap();
            async move { outcome }
        })
        .await;

        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].provider, attempts[1].provider);
        assert!(matches!(verdict, CascadeVerdict::Won(1)));
    }

    #[tokio::test]
    async fn test_slippage_retry_happens_only_once() {
        let script = scripted(vec![
            slippage_failed(),
            slippage_failed(),
            AttemptOutcome::Confirmed("sig-b".to_string()),
        ]);

        let (attempts, verdict) = run_cascade(&names(&["a", "b"]), |_| {
            let outcome = script.borrow_mut().pop_front().unwrap();
            async move { outcome }
        })
        .await;

        // Two tries on "a", then "b" wins
        assert_eq!(attempts.len(), 3);
        assert_eq!(attempts[0].provider, "a");
        assert_eq!(attempts[1].provider, "a");
        assert_eq!(attempts[2].provider, "b");
        assert!(matches!(verdict, CascadeVerdict::Won(2)));
    }

    #[tokio::test]
    async fn test_deadline_unconfirmed_attempt_cascades_to_next_provider() {
        let script = scripted(vec![
            AttemptOutcome::Failed {
                signature: Some("sig-limbo".to_string()),
                error: confirmation_error(&ConfirmOutcome::NotConfirmed, 30)
                    .unwrap()
                    .to_string(),
                slippage: false,
            },
            AttemptOutcome::Confirmed("sig-win".to_string()),
        ]);

        let (attempts, verdict) = run_cascade(&names(&["a", "b"]), |_| {
            let outcome = script.borrow_mut().pop_front().unwrap();
            async move { outcome }
        })
        .await;

        // The second provider is tried; the stalled attempt keeps its
        // signature in the record
        assert_eq!(attempts.len(), 2);
        assert!(matches!(verdict, CascadeVerdict::Won(1)));
        assert_eq!(attempts[0].provider, "a");
        assert_eq!(attempts[0].signature.as_deref(), Some("sig-limbo"));
        assert!(!attempts[0].confirmed);
        assert_eq!(attempts[1].provider, "b");
        assert!(attempts[1].confirmed);
    }

    #[tokio::test]
    async fn test_cancellation_aborts_cascade() {
        let script = scripted(vec![AttemptOutcome::Aborted {
            signature: None,
            error: "cancelled before submit".to_string(),
        }]);

        let (attempts, verdict) = run_cascade(&names(&["a", "b", "c"]), |_| {
            let outcome = script.borrow_mut().pop_front().unwrap();
            async move { outcome }
        })
        .await;

        assert_eq!(attempts.len(), 1);
        assert!(matches!(verdict, CascadeVerdict::Aborted(_)));
    }

    #[test]
    fn test_confirmation_error_mapping() {
        assert!(confirmation_error(&ConfirmOutcome::Confirmed, 30).is_none());
        assert!(matches!(
            confirmation_error(&ConfirmOutcome::FailedOnChain("0x1771".to_string()), 30),
            Some(Error::OnChainFailure(m)) if m == "0x1771"
        ));
        assert!(matches!(
            confirmation_error(&ConfirmOutcome::Expired, 30),
            Some(Error::Expired)
        ));
        assert!(matches!(
            confirmation_error(&ConfirmOutcome::NotConfirmed, 30),
            Some(Error::NotConfirmed(30))
        ));
    }

    #[tokio::test]
    async fn test_exhaustion_records_every_attempt() {
        let script = scripted(vec![
            failed("no route"),
            failed("build timed out"),
            failed("submit failed: node behind"),
        ]);

        let (attempts, verdict) = run_cascade(&names(&["a", "b", "c"]), |_| {
            let outcome = script.borrow_mut().pop_front().unwrap();
            async move { outcome }
        })
        .await;

        assert_eq!(attempts.len(), 3);
        assert!(matches!(verdict, CascadeVerdict::Exhausted));
        assert!(attempts.iter().all(|a| !a.confirmed));
    }

    #[test]
    fn test_keypair_from_base58_secret() {
        let keypair = Keypair::new();
        let encoded = bs58::encode(keypair.to_bytes()).into_string();
        let parsed = keypair_from_secret(&encoded).unwrap();
        assert_eq!(parsed.pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_keypair_from_json_array_secret() {
        let keypair = Keypair::new();
        let encoded = serde_json::to_string(&keypair.to_bytes().to_vec()).unwrap();
        let parsed = keypair_from_secret(&encoded).unwrap();
        assert_eq!(parsed.pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_keypair_from_garbage_rejected() {
        assert!(keypair_from_secret("not a key").is_err());
        assert!(keypair_from_secret("[1,2,3]").is_err());
    }

    #[test]
    fn test_percentile_fee_selection() {
        let samples = vec![100, 500, 200, 400, 300];
        assert_eq!(percentile_fee(&samples, 0), Some(100));
        assert_eq!(percentile_fee(&samples, 50), Some(300));
        assert_eq!(percentile_fee(&samples, 100), Some(500));
        assert_eq!(percentile_fee(&[], 50), None);
    }

    #[test]
    fn test_sign_with_blockhash_stamps_message() {
        use solana_sdk::message::Message;
        use solana_sdk::system_instruction;

        let keypair = Keypair::new();
        let instruction =
            system_instruction::transfer(&keypair.pubkey(), &Pubkey::new_unique(), 1);
        let message = Message::new(&[instruction], Some(&keypair.pubkey()));
        let unsigned = VersionedTransaction {
            signatures: vec![],
            message: VersionedMessage::Legacy(message),
        };

        let blockhash = Hash::new_unique();
        let signed = sign_with_blockhash(unsigned, blockhash, &keypair).unwrap();

        assert_eq!(*signed.message.recent_blockhash(), blockhash);
        assert_eq!(signed.signatures.len(), 1);
        assert!(signed.verify_with_results().iter().all(|ok| *ok));
    }
}
