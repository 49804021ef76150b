//! Bonding curve account state and pricing math
//!
//! # WARNING: These structures may change without notice
//! The launchpad has modified its account layouts in the past. If
//! deserialization fails, these structures may need updating.

use borsh::{BorshDeserialize, BorshSerialize};
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Launchpad bonding-curve program ID
pub const CURVE_PROGRAM_ID_STR: &str = "6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P";

lazy_static::lazy_static! {
    /// Launchpad bonding-curve program ID as Pubkey
    pub static ref CURVE_PROGRAM_ID: Pubkey =
        Pubkey::from_str(CURVE_PROGRAM_ID_STR).expect("Invalid curve program ID");
}

/// BondingCurve account discriminator (first 8 bytes of account data,
/// Anchor convention: SHA-256("account:BondingCurve")[0..8])
pub const BONDING_CURVE_DISCRIMINATOR: [u8; 8] = [23, 183, 248, 55, 96, 216, 172, 96];

/// Launchpad tokens use 6 decimals, not Solana's standard 9
pub const CURVE_TOKEN_DECIMALS: u8 = 6;

/// BondingCurve account - stores the curve state for a token
#[derive(Debug, Clone, BorshDeserialize, BorshSerialize)]
pub struct BondingCurve {
    /// Account discriminator (first 8 bytes)
    _discriminator: [u8; 8],

    /// Virtual SOL reserves for price calculation
    pub virtual_sol_reserves: u64,

    /// Virtual token reserves for price calculation
    pub virtual_token_reserves: u64,

    /// Real SOL reserves (actual SOL held in the curve)
    pub real_sol_reserves: u64,

    /// Real token reserves (actual tokens held in the curve)
    pub real_token_reserves: u64,

    /// Total supply of the token
    pub token_total_supply: u64,

    /// Whether the curve has completed (asset graduated to an AMM)
    pub complete: bool,
}

impl BondingCurve {
    #[cfg(test)]
    pub fn new_for_test(
        virtual_sol_reserves: u64,
        virtual_token_reserves: u64,
        complete: bool,
    ) -> Self {
        Self {
            _discriminator: BONDING_CURVE_DISCRIMINATOR,
            virtual_sol_reserves,
            virtual_token_reserves,
            real_sol_reserves: 0,
            real_token_reserves: virtual_token_reserves,
            token_total_supply: virtual_token_reserves,
            complete,
        }
    }

    /// Deserialize from account data, verifying the discriminator
    pub fn try_from_account_data(data: &[u8]) -> Result<Self> {
        if data.len() < 8 {
            return Err(Error::BondingCurveDecode(
                "Account data too short".to_string(),
            ));
        }

        let discriminator: [u8; 8] = data[..8]
            .try_into()
            .map_err(|_| Error::BondingCurveDecode("Invalid discriminator".to_string()))?;

        if discriminator != BONDING_CURVE_DISCRIMINATOR {
            return Err(Error::BondingCurveDecode(format!(
                "Wrong discriminator: expected {:?}, got {:?}",
                BONDING_CURVE_DISCRIMINATOR, discriminator
            )));
        }

        // Decode from a cursor rather than try_from_slice: the program has
        // appended fields to this account before, and trailing bytes must
        // not break the known prefix.
        let mut slice = data;
        BondingCurve::deserialize(&mut slice)
            .map_err(|e| Error::BondingCurveDecode(format!("Borsh decode failed: {}", e)))
    }

    /// Spot price in lamports per token base unit
    pub fn spot_price(&self) -> Result<f64> {
        if self.virtual_token_reserves == 0 {
            return Err(Error::PriceOverflow);
        }
        Ok(self.virtual_sol_reserves as f64 / self.virtual_token_reserves as f64)
    }

    /// Tokens received for a given SOL amount, plus price impact percent.
    ///
    /// Constant product: new_out = (v_in * v_out) / (v_in + input),
    /// output = v_out - new_out. Impact is input relative to the virtual
    /// input reserve, which is monotonically increasing in input size.
    pub fn quote_buy(&self, sol_amount: u64) -> Result<(u64, f64)> {
        if self.virtual_sol_reserves == 0 || self.virtual_token_reserves == 0 {
            return Err(Error::PriceOverflow);
        }

        let new_sol_reserves = self
            .virtual_sol_reserves
            .checked_add(sol_amount)
            .ok_or(Error::PriceOverflow)?;

        let k = (self.virtual_sol_reserves as u128)
            .checked_mul(self.virtual_token_reserves as u128)
            .ok_or(Error::PriceOverflow)?;

        let new_token_reserves = k
            .checked_div(new_sol_reserves as u128)
            .ok_or(Error::PriceOverflow)?;

        let tokens_out = (self.virtual_token_reserves as u128)
            .checked_sub(new_token_reserves)
            .ok_or(Error::PriceOverflow)?;

        let impact_pct =
            sol_amount as f64 / self.virtual_sol_reserves as f64 * 100.0;

        Ok((tokens_out as u64, impact_pct))
    }

    /// SOL received for selling tokens, plus price impact percent
    pub fn quote_sell(&self, token_amount: u64) -> Result<(u64, f64)> {
        if self.virtual_sol_reserves == 0 || self.virtual_token_reserves == 0 {
            return Err(Error::PriceOverflow);
        }

        let new_token_reserves = self
            .virtual_token_reserves
            .checked_add(token_amount)
            .ok_or(Error::PriceOverflow)?;

        let k = (self.virtual_sol_reserves as u128)
            .checked_mul(self.virtual_token_reserves as u128)
            .ok_or(Error::PriceOverflow)?;

        let new_sol_reserves = k
            .checked_div(new_token_reserves as u128)
            .ok_or(Error::PriceOverflow)?;

        let sol_out = (self.virtual_sol_reserves as u128)
            .checked_sub(new_sol_reserves)
            .ok_or(Error::PriceOverflow)?;

        let impact_pct =
            token_amount as f64 / self.virtual_token_reserves as f64 * 100.0;

        Ok((sol_out as u64, impact_pct))
    }
}

/// Derive the bonding-curve PDA for a mint
pub fn derive_curve_address(mint: &Pubkey) -> (Pubkey, u8) {
    let seeds = &[b"bonding-curve".as_ref(), mint.as_ref()];
    Pubkey::find_program_address(seeds, &CURVE_PROGRAM_ID)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_curve() -> BondingCurve {
        BondingCurve::new_for_test(
            30_000_000_000,    // 30 SOL in lamports
            1_000_000_000_000, // 1M tokens at 6 decimals
            false,
        )
    }

    #[test]
    fn test_worked_buy_example() {
        let curve = test_curve();

        // 1 SOL into 30 SOL / 1e12 virtual reserves
        let (tokens, impact) = curve.quote_buy(1_000_000_000).unwrap();

        assert!((tokens as i64 - 32_258_064_516).abs() <= 2);
        assert!((impact - 3.333).abs() < 0.01);
    }

    #[test]
    fn test_buy_output_strictly_below_virtual_reserves() {
        let curve = test_curve();
        for input in [1u64, 1_000, 1_000_000_000, 500_000_000_000] {
            let (tokens, _) = curve.quote_buy(input).unwrap();
            assert!(tokens < curve.virtual_token_reserves);
        }
    }

    #[test]
    fn test_impact_monotonic_in_input() {
        let curve = test_curve();
        let mut last_impact = 0.0;
        for input in [100_000_000u64, 1_000_000_000, 5_000_000_000, 20_000_000_000] {
            let (_, impact) = curve.quote_buy(input).unwrap();
            assert!(impact > last_impact);
            last_impact = impact;
        }
    }

    #[test]
    fn test_sell_output_strictly_below_sol_reserves() {
        let curve = test_curve();
        let (sol, impact) = curve.quote_sell(10_000_000_000).unwrap();
        assert!(sol < curve.virtual_sol_reserves);
        assert!(impact > 0.0);
    }

    #[test]
    fn test_zero_reserves_rejected() {
        let curve = BondingCurve::new_for_test(0, 0, false);
        assert!(matches!(curve.quote_buy(1), Err(Error::PriceOverflow)));
    }

    #[test]
    fn test_discriminator_check() {
        let mut data = vec![0u8; 57];
        data[..8].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(BondingCurve::try_from_account_data(&data).is_err());
    }

    #[test]
    fn test_decode_roundtrip() {
        let curve = test_curve();
        let data = borsh::to_vec(&curve).unwrap();
        let decoded = BondingCurve::try_from_account_data(&data).unwrap();
        assert_eq!(decoded.virtual_sol_reserves, curve.virtual_sol_reserves);
        assert!(!decoded.complete);
    }

    #[test]
    fn test_curve_pda_is_deterministic() {
        let mint = Pubkey::new_unique();
        assert_eq!(derive_curve_address(&mint), derive_curve_address(&mint));
    }
}
