//! Hard transaction confirmation
//!
//! A submitted signature is not a result. Confirmation races a websocket
//! signature subscription against status polling, tracks blockhash expiry
//! so a dead transaction is reported as `Expired` rather than hanging, and
//! gives up with `NotConfirmed` at the overall deadline. `NotConfirmed` is
//! deliberately distinct from failure: the transaction may still land.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use solana_client::nonblocking::pubsub_client::PubsubClient;
use solana_client::rpc_config::RpcSignatureSubscribeConfig;
use solana_client::rpc_response::RpcSignatureResult;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::signature::Signature;
use tracing::{debug, warn};

use crate::config::ExecutorConfig;
use crate::rpc::GovernedRpc;

/// Terminal confirmation outcome for one submitted transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Confirmed,
    /// Landed on chain and failed; carries the program error
    FailedOnChain(String),
    /// Blockhash expired with no landed status: the transaction is dead
    Expired,
    /// Deadline hit with no terminal status either way
    NotConfirmed,
}

pub struct Confirmer {
    rpc: Arc<GovernedRpc>,
    ws_url: String,
    overall_timeout: Duration,
    subscription_timeout: Duration,
    poll_interval: Duration,
}

impl Confirmer {
    pub fn new(rpc: Arc<GovernedRpc>, ws_url: &str, config: &ExecutorConfig) -> Self {
        Self {
            rpc,
            ws_url: ws_url.to_string(),
            overall_timeout: Duration::from_secs(config.confirm_timeout_secs),
            subscription_timeout: Duration::from_secs(config.subscription_timeout_secs),
            poll_interval: Duration::from_millis(config.status_poll_interval_ms),
        }
    }

    /// Drive `signature` to a terminal outcome or the overall deadline
    pub async fn confirm(
        &self,
        signature: &Signature,
        last_valid_block_height: u64,
    ) -> ConfirmOutcome {
        match tokio::time::timeout(
            self.overall_timeout,
            self.confirm_inner(signature, last_valid_block_height),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!("confirmation deadline hit for {}", signature);
                ConfirmOutcome::NotConfirmed
            }
        }
    }

    async fn confirm_inner(
        &self,
        signature: &Signature,
        last_valid_block_height: u64,
    ) -> ConfirmOutcome {
        // Fast path: websocket notification. Any subscription problem
        // falls through to polling, which is the source of truth anyway.
        if let Some(outcome) = self.subscribe_outcome(signature).await {
            return outcome;
        }

        loop {
            match self.rpc.get_signature_status(signature).await {
                Ok(Some(status)) => {
                    if let Some(err) = status.err {
                        return ConfirmOutcome::FailedOnChain(format!("{:?}", err));
                    }
                    if status.satisfies_commitment(CommitmentConfig::confirmed()) {
                        return ConfirmOutcome::Confirmed;
                    }
                }
                Ok(None) => {}
                Err(e) => debug!("status poll failed for {}: {}", signature, e),
            }

            if let Ok(height) = self.rpc.get_block_height().await {
                if height > last_valid_block_height {
                    // Blockhash is gone; one final status check closes the
                    // race with a landing in the last valid block.
                    return match self.rpc.get_signature_status(signature).await {
                        Ok(Some(status)) => match status.err {
                            Some(err) => ConfirmOutcome::FailedOnChain(format!("{:?}", err)),
                            None => ConfirmOutcome::Confirmed,
                        },
                        _ => ConfirmOutcome::Expired,
                    };
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn subscribe_outcome(&self, signature: &Signature) -> Option<ConfirmOutcome> {
        let client = match PubsubClient::new(&self.ws_url).await {
            Ok(client) => client,
            Err(e) => {
                debug!("signature subscription unavailable: {}", e);
                return None;
            }
        };

        let config = RpcSignatureSubscribeConfig {
            commitment: Some(CommitmentConfig::confirmed()),
            ..Default::default()
        };

        let (mut stream, _unsubscribe) =
            match client.signature_subscribe(signature, Some(config)).await {
                Ok(subscription) => subscription,
                Err(e) => {
                    debug!("signature subscribe failed: {}", e);
                    return None;
                }
            };

        match tokio::time::timeout(self.subscription_timeout, stream.next()).await {
            Ok(Some(response)) => match response.value {
                RpcSignatureResult::ProcessedSignature(result) => Some(match result.err {
                    Some(err) => ConfirmOutcome::FailedOnChain(format!("{:?}", err)),
                    None => ConfirmOutcome::Confirmed,
                }),
                _ => None,
            },
            _ => {
                debug!("no subscription notification for {} in time", signature);
                None
            }
        }
    }
}

/// Whether an on-chain failure reads like a slippage bound violation, the
/// one failure class worth a single same-provider retry.
pub fn is_slippage_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("slippage")
        || lower.contains("0x1771")
        || lower.contains("exceeds desired slippage")
        || lower.contains("price moved")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slippage_classification() {
        assert!(is_slippage_error("custom program error: 0x1771"));
        assert!(is_slippage_error("TooMuchSolRequired: slippage exceeded"));
        assert!(is_slippage_error("Price moved before execution"));
        assert!(!is_slippage_error("insufficient funds for rent"));
        assert!(!is_slippage_error("custom program error: 0x1"));
    }

    #[test]
    fn test_outcome_equality() {
        assert_eq!(ConfirmOutcome::Confirmed, ConfirmOutcome::Confirmed);
        assert_ne!(
            ConfirmOutcome::Expired,
            ConfirmOutcome::FailedOnChain("x".to_string())
        );
    }
}
