//! Governed RPC access
//!
//! Every upstream RPC call goes through this wrapper: the governor
//! reserves a slot before the call, each call carries its own timeout, and
//! an observed 429 trips the shared circuit breaker.

use std::sync::Arc;
use std::time::Duration;

use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::{
    RpcSendTransactionConfig, RpcSimulateTransactionConfig,
};
use solana_client::rpc_request::TokenAccountsFilter;
use solana_client::rpc_response::{RpcKeyedAccount, RpcPrioritizationFee, RpcSimulateTransactionResult};
use solana_sdk::account::Account;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use solana_transaction_status::TransactionStatus;
use tracing::warn;

use crate::error::{Error, Result};
use crate::governor::RpcGovernor;

/// RPC client wrapped by the access governor
pub struct GovernedRpc {
    client: RpcClient,
    governor: Arc<RpcGovernor>,
    timeout: Duration,
}

impl GovernedRpc {
    pub fn new(endpoint: &str, governor: Arc<RpcGovernor>, timeout: Duration) -> Self {
        Self {
            client: RpcClient::new_with_commitment(
                endpoint.to_string(),
                CommitmentConfig::confirmed(),
            ),
            governor,
            timeout,
        }
    }

    pub fn governor(&self) -> &Arc<RpcGovernor> {
        &self.governor
    }

    pub async fn get_account(&self, pubkey: &Pubkey) -> Result<Account> {
        self.reserve().await?;
        let result = self.bounded(self.client.get_account(pubkey)).await;
        self.observe(result)
    }

    /// Latest blockhash plus the height at which it expires
    pub async fn get_latest_blockhash(&self) -> Result<(Hash, u64)> {
        self.reserve().await?;
        let result = self
            .bounded(
                self.client
                    .get_latest_blockhash_with_commitment(CommitmentConfig::confirmed()),
            )
            .await;
        self.observe(result)
    }

    pub async fn get_block_height(&self) -> Result<u64> {
        self.reserve().await?;
        let result = self.bounded(self.client.get_block_height()).await;
        self.observe(result)
    }

    /// Submit without pre-flight simulation; confirmation is handled by
    /// the executor's hard-confirmation step.
    pub async fn send_transaction(&self, transaction: &VersionedTransaction) -> Result<Signature> {
        self.reserve().await?;
        let config = RpcSendTransactionConfig {
            skip_preflight: true,
            max_retries: Some(0),
            ..Default::default()
        };
        let result = self
            .bounded(self.client.send_transaction_with_config(transaction, config))
            .await;
        self.observe(result)
    }

    pub async fn get_signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<TransactionStatus>> {
        self.reserve().await?;
        let result = self
            .bounded(self.client.get_signature_statuses(&[*signature]))
            .await;
        let response = self.observe(result)?;
        Ok(response.value.into_iter().next().flatten())
    }

    pub async fn get_token_accounts_by_owner(
        &self,
        owner: &Pubkey,
        filter: TokenAccountsFilter,
    ) -> Result<Vec<RpcKeyedAccount>> {
        self.reserve().await?;
        let result = self
            .bounded(self.client.get_token_accounts_by_owner(owner, filter))
            .await;
        self.observe(result)
    }

    pub async fn simulate_transaction(
        &self,
        transaction: &VersionedTransaction,
        config: RpcSimulateTransactionConfig,
    ) -> Result<RpcSimulateTransactionResult> {
        self.reserve().await?;
        let result = self
            .bounded(
                self.client
                    .simulate_transaction_with_config(transaction, config),
            )
            .await;
        Ok(self.observe(result)?.value)
    }

    pub async fn get_recent_prioritization_fees(
        &self,
        addresses: &[Pubkey],
    ) -> Result<Vec<RpcPrioritizationFee>> {
        self.reserve().await?;
        let result = self
            .bounded(self.client.get_recent_prioritization_fees(addresses))
            .await;
        self.observe(result)
    }

    async fn reserve(&self) -> Result<()> {
        let decision = self.governor.check_and_reserve().await?;
        if !decision.allowed {
            let reason = decision.reason.unwrap_or_else(|| "unknown".to_string());
            return Err(Error::RateLimited(reason));
        }
        Ok(())
    }

    async fn bounded<T>(
        &self,
        fut: impl std::future::Future<Output = solana_client::client_error::Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(Error::from),
            Err(_) => Err(Error::RpcTimeout(self.timeout.as_millis() as u64)),
        }
    }

    /// Inspect an RPC outcome for upstream throttling before returning it
    fn observe<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            let message = e.to_string();
            if message.contains("429") || message.contains("Too Many Requests") {
                warn!("upstream 429 observed, tripping circuit breaker");
                let governor = Arc::clone(&self.governor);
                tokio::spawn(async move { governor.trip_breaker().await });
            }
        }
        result
    }
}
