//! Simulation-based quoting
//!
//! The secondary launchpad curve has no public quote API and no published
//! closed-form formula, and third-party market feeds do not match its true
//! execution price. The only faithful quote is to build the real candidate
//! transaction and simulate it, reading the token-balance delta out of the
//! simulation's returned account state.

use solana_account_decoder::{UiAccountData, UiAccountEncoding};
use solana_client::rpc_config::{
    RpcSimulateTransactionAccountsConfig, RpcSimulateTransactionConfig,
};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use spl_token::solana_program::program_pack::Pack;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::executor::providers::pumpportal::{
    portal_request, PortalPool, PumpPortalClient,
};
use crate::executor::provider::{SwapRequest, TradeDirection};
use crate::rpc::GovernedRpc;
use crate::venue::Venue;

/// Simulate a candidate buy on the secondary curve and return the token
/// amount the wallet would actually receive. `None` means the simulation
/// could not produce a usable delta; callers treat that as no quote.
pub async fn simulated_buy_output(
    rpc: &GovernedRpc,
    portal: &PumpPortalClient,
    mint: &str,
    wallet: &Pubkey,
    input_lamports: u64,
    slippage_bps: u32,
) -> Result<Option<u64>> {
    let mint_key: Pubkey = mint
        .parse()
        .map_err(|_| Error::Validation(format!("bad mint: {}", mint)))?;
    let token_account =
        spl_associated_token_account::get_associated_token_address(wallet, &mint_key);

    // Balance before, zero when the account does not exist yet
    let pre_balance = match rpc.get_account(&token_account).await {
        Ok(account) => unpack_token_amount(&account.data).unwrap_or(0),
        Err(_) => 0,
    };

    let request = SwapRequest {
        direction: TradeDirection::Buy,
        mint: mint.to_string(),
        amount_raw: input_lamports,
        wallet: *wallet,
        slippage_bps,
        priority_fee_lamports: 0,
        venue: Venue::MoonshotCurve,
    };

    let transaction = portal
        .unsigned_transaction(&portal_request(&request, PortalPool::Moonshot))
        .await?;

    let config = RpcSimulateTransactionConfig {
        sig_verify: false,
        replace_recent_blockhash: true,
        commitment: Some(CommitmentConfig::confirmed()),
        accounts: Some(RpcSimulateTransactionAccountsConfig {
            encoding: Some(UiAccountEncoding::Base64),
            addresses: vec![token_account.to_string()],
        }),
        ..Default::default()
    };

    let result = rpc.simulate_transaction(&transaction, config).await?;

    if let Some(err) = result.err {
        warn!("curve simulation failed for {}: {:?}", mint, err);
        return Ok(None);
    }

    let post_balance = result
        .accounts
        .and_then(|accounts| accounts.into_iter().next().flatten())
        .and_then(|account| match account.data {
            UiAccountData::Binary(encoded, UiAccountEncoding::Base64) => {
                use base64::engine::general_purpose::STANDARD as BASE64;
                use base64::Engine;
                BASE64.decode(encoded).ok()
            }
            _ => None,
        })
        .and_then(|bytes| unpack_token_amount(&bytes));

    let Some(post_balance) = post_balance else {
        debug!("simulation returned no readable token account for {}", mint);
        return Ok(None);
    };

    let output = post_balance.saturating_sub(pre_balance);
    if output == 0 {
        debug!("simulation produced no balance delta for {}", mint);
        return Ok(None);
    }

    Ok(Some(output))
}

fn unpack_token_amount(data: &[u8]) -> Option<u64> {
    spl_token::state::Account::unpack(data)
        .ok()
        .map(|account| account.amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use spl_token::solana_program::program_option::COption;
    use spl_token::state::{Account as TokenAccount, AccountState};

    #[test]
    fn test_unpack_token_amount() {
        let account = TokenAccount {
            mint: Pubkey::new_unique(),
            owner: Pubkey::new_unique(),
            amount: 123_456_789,
            delegate: COption::None,
            state: AccountState::Initialized,
            is_native: COption::None,
            delegated_amount: 0,
            close_authority: COption::None,
        };

        let mut data = vec![0u8; TokenAccount::LEN];
        TokenAccount::pack(account, &mut data).unwrap();

        assert_eq!(unpack_token_amount(&data), Some(123_456_789));
    }

    #[test]
    fn test_unpack_rejects_short_data() {
        assert_eq!(unpack_token_amount(&[0u8; 10]), None);
    }
}
