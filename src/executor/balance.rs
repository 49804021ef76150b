//! Wallet balance resolution for sells
//!
//! "Sell everything" has to be resolved to a raw amount before any
//! provider sees the request. The owner's token accounts are filtered by
//! mint, which covers both the legacy token program and token-2022 in a
//! single call since the mint pins the owning program.

use solana_account_decoder::parse_account_data::ParsedAccount;
use solana_account_decoder::{UiAccountData, UiAccountEncoding};
use solana_client::rpc_request::TokenAccountsFilter;
use solana_sdk::pubkey::Pubkey;
use spl_token::solana_program::program_pack::Pack;
use tracing::debug;

use crate::error::{Error, Result};
use crate::executor::provider::{AmountSpec, TradeDirection};
use crate::rpc::GovernedRpc;

/// Raw balance of `mint` in each of the wallet's token accounts.
///
/// Filtering by mint covers every token account holding it, whichever
/// program owns the mint and however the holdings are split.
pub async fn account_balances(
    rpc: &GovernedRpc,
    wallet: &Pubkey,
    mint: &Pubkey,
) -> Result<Vec<u64>> {
    let accounts = rpc
        .get_token_accounts_by_owner(wallet, TokenAccountsFilter::Mint(*mint))
        .await?;

    let balances: Vec<u64> = accounts
        .iter()
        .filter_map(|keyed| parse_token_amount(&keyed.account.data))
        .collect();

    debug!(
        "wallet {} holds {} raw units of {} across {} account(s)",
        wallet,
        balances.iter().sum::<u64>(),
        mint,
        balances.len()
    );
    Ok(balances)
}

/// Resolve an amount spec into the raw amount providers will trade.
/// `balances` carries the wallet's per-account holdings for sells.
pub fn resolve_amount(
    spec: AmountSpec,
    direction: TradeDirection,
    balances: &[u64],
) -> Result<u64> {
    match (spec, direction) {
        (AmountSpec::Exact(amount), _) => {
            if amount == 0 {
                return Err(Error::Validation("trade amount must be non-zero".to_string()));
            }
            Ok(amount)
        }
        (AmountSpec::EntireBalance, TradeDirection::Buy) => Err(Error::Validation(
            "entire-balance amounts only apply to sells".to_string(),
        )),
        (AmountSpec::EntireBalance, TradeDirection::Sell) => {
            let total: u64 = balances.iter().sum();
            if total == 0 {
                return Err(Error::InsufficientBalance {
                    available: 0,
                    required: 1,
                });
            }
            Ok(total)
        }
    }
}

/// Raw token amount from an account payload, whichever encoding the RPC
/// returned it in.
pub fn parse_token_amount(data: &UiAccountData) -> Option<u64> {
    match data {
        UiAccountData::Json(ParsedAccount { parsed, .. }) => parsed
            .get("info")?
            .get("tokenAmount")?
            .get("amount")?
            .as_str()?
            .parse()
            .ok(),
        UiAccountData::Binary(encoded, UiAccountEncoding::Base64) => {
            use base64::engine::general_purpose::STANDARD as BASE64;
            use base64::Engine;
            let bytes = BASE64.decode(encoded).ok()?;
            spl_token::state::Account::unpack(&bytes)
                .ok()
                .map(|account| account.amount)
        }
        _ => None,
    }
}
