//! Token tax detection
//!
//! Three best-effort sources: a community risk report API, the mint's own
//! token-2022 transfer-fee extension read over RPC, and a security
//! screening API. Any one of them flagging a fee is enough to block when
//! tax blocking is enabled; a source that errors simply contributes
//! nothing.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use crate::config::GuardConfig;
use crate::error::{Error, Result};
use crate::rpc::GovernedRpc;

/// One source's verdict on transfer taxation
#[derive(Debug, Clone)]
pub struct TaxReport {
    pub has_tax: bool,
    /// Fee percent when the source quantifies it
    pub tax_pct: Option<f64>,
    pub source: &'static str,
}

#[derive(Debug, Deserialize)]
struct RiskReport {
    risks: Option<Vec<RiskEntry>>,
}

#[derive(Debug, Deserialize)]
struct RiskEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SecurityResponse {
    result: Option<std::collections::HashMap<String, SecurityEntry>>,
}

#[derive(Debug, Deserialize)]
struct SecurityEntry {
    buy_tax: Option<String>,
    sell_tax: Option<String>,
}

// Token-2022 mint layout: 82-byte base, zero padding to 165, account type
// byte, then TLV entries of (type u16 LE, length u16 LE, data).
const MINT_BASE_LEN: usize = 82;
const ACCOUNT_TYPE_OFFSET: usize = 165;
const TLV_START: usize = 166;
const EXTENSION_TRANSFER_FEE_CONFIG: u16 = 1;
// Within TransferFeeConfig: two authorities (64), withheld amount (8),
// older fee (18), then the newer fee whose bps sit at its tail.
const NEWER_FEE_BPS_OFFSET: usize = 64 + 8 + 18 + 16;

/// Scans a mint for transfer taxes across all sources
pub struct TaxScanner {
    http: reqwest::Client,
    rpc: Arc<GovernedRpc>,
    tax_api_url: String,
    security_api_url: String,
}

impl TaxScanner {
    pub fn new(rpc: Arc<GovernedRpc>, config: &GuardConfig, timeout_secs: u64) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .unwrap_or_default(),
            rpc,
            tax_api_url: config.tax_api_url.clone(),
            security_api_url: config.security_api_url.clone(),
        }
    }

    /// Collect verdicts from every source that answers
    pub async fn scan(&self, mint: &str) -> Vec<TaxReport> {
        let mut reports = Vec::new();

        match self.check_risk_report(mint).await {
            Ok(Some(report)) => reports.push(report),
            Ok(None) => {}
            Err(e) => debug!("risk report source failed for {}: {}", mint, e),
        }

        match self.check_transfer_fee_extension(mint).await {
            Ok(Some(report)) => reports.push(report),
            Ok(None) => {}
            Err(e) => debug!("mint extension read failed for {}: {}", mint, e),
        }

        match self.check_security_api(mint).await {
            Ok(Some(report)) => reports.push(report),
            Ok(None) => {}
            Err(e) => debug!("security source failed for {}: {}", mint, e),
        }

        reports
    }

    async fn check_risk_report(&self, mint: &str) -> Result<Option<TaxReport>> {
        let url = format!("{}/v1/tokens/{}/report/summary", self.tax_api_url, mint);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::UpstreamUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Ok(None);
        }

        let report: RiskReport = response
            .json()
            .await
            .map_err(|e| Error::Deserialization(e.to_string()))?;

        let has_tax = report
            .risks
            .unwrap_or_default()
            .iter()
            .any(|risk| risk.name.to_lowercase().contains("fee"));

        Ok(Some(TaxReport {
            has_tax,
            tax_pct: None,
            source: "risk-report",
        }))
    }

    /// Read the transfer-fee extension straight off the mint account
    async fn check_transfer_fee_extension(&self, mint: &str) -> Result<Option<TaxReport>> {
        let mint_key =
            Pubkey::from_str(mint).map_err(|e| Error::Validation(format!("bad mint: {}", e)))?;
        let account = self.rpc.get_account(&mint_key).await?;

        Ok(transfer_fee_bps(&account.data).map(|bps| TaxReport {
            has_tax: bps > 0,
            tax_pct: Some(bps as f64 / 100.0),
            source: "mint-extension",
        }))
    }

    async fn check_security_api(&self, mint: &str) -> Result<Option<TaxReport>> {
        let url = format!(
            "{}/api/v1/solana/token_security?contract_addresses={}",
            self.security_api_url, mint
        );
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::UpstreamUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Ok(None);
        }

        let data: SecurityResponse = response
            .json()
            .await
            .map_err(|e| Error::Deserialization(e.to_string()))?;

        let Some(entry) = data.result.and_then(|mut map| map.remove(mint)) else {
            return Ok(None);
        };

        let parse_pct = |value: &Option<String>| {
            value
                .as_deref()
                .and_then(|s| s.parse::<f64>().ok())
                .filter(|pct| *pct > 0.0)
        };

        let tax_pct = parse_pct(&entry.buy_tax).or_else(|| parse_pct(&entry.sell_tax));

        Ok(Some(TaxReport {
            has_tax: tax_pct.is_some(),
            tax_pct,
            source: "security-screen",
        }))
    }
}

/// First positive tax verdict, if any source produced one
pub fn tax_block(reports: &[TaxReport]) -> Option<&TaxReport> {
    reports.iter().find(|report| report.has_tax)
}

/// Transfer-fee basis points from a token-2022 mint's TLV data.
/// `None` for legacy mints or mints without the extension.
pub fn transfer_fee_bps(data: &[u8]) -> Option<u16> {
    if data.len() <= ACCOUNT_TYPE_OFFSET || data[ACCOUNT_TYPE_OFFSET] != 1 {
        return None;
    }
    debug_assert!(data.len() > MINT_BASE_LEN);

    let mut cursor = TLV_START;
    while cursor + 4 <= data.len() {
        let extension_type = u16::from_le_bytes([data[cursor], data[cursor + 1]]);
        let length = u16::from_le_bytes([data[cursor + 2], data[cursor + 3]]) as usize;
        let value_start = cursor + 4;

        if value_start + length > data.len() {
            return None;
        }

        if extension_type == EXTENSION_TRANSFER_FEE_CONFIG {
            let bps_offset = value_start + NEWER_FEE_BPS_OFFSET;
            if bps_offset + 2 > value_start + length {
                return None;
            }
            return Some(u16::from_le_bytes([data[bps_offset], data[bps_offset + 1]]));
        }

        cursor = value_start + length;
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mint_with_transfer_fee(bps: u16) -> Vec<u8> {
        let mut data = vec![0u8; 166];
        data[ACCOUNT_TYPE_OFFSET] = 1;
        // TLV entry: transfer fee config, 108-byte payload
        data.extend_from_slice(&EXTENSION_TRANSFER_FEE_CONFIG.to_le_bytes());
        data.extend_from_slice(&108u16.to_le_bytes());
        let mut payload = vec![0u8; 108];
        payload[NEWER_FEE_BPS_OFFSET..NEWER_FEE_BPS_OFFSET + 2]
            .copy_from_slice(&bps.to_le_bytes());
        data.extend_from_slice(&payload);
        data
    }

    #[test]
    fn test_transfer_fee_extension_parsing() {
        assert_eq!(transfer_fee_bps(&mint_with_transfer_fee(250)), Some(250));
        assert_eq!(transfer_fee_bps(&mint_with_transfer_fee(0)), Some(0));
    }

    #[test]
    fn test_legacy_mint_has_no_extension() {
        // Legacy mints are exactly 82 bytes
        assert_eq!(transfer_fee_bps(&vec![0u8; 82]), None);
    }

    #[test]
    fn test_token_account_data_rejected() {
        // Account type 2 is a token account, not a mint
        let mut data = vec![0u8; 200];
        data[ACCOUNT_TYPE_OFFSET] = 2;
        assert_eq!(transfer_fee_bps(&data), None);
    }

    #[test]
    fn test_tax_block_picks_first_positive() {
        let reports = vec![
            TaxReport { has_tax: false, tax_pct: None, source: "risk-report" },
            TaxReport { has_tax: true, tax_pct: Some(2.5), source: "mint-extension" },
            TaxReport { has_tax: true, tax_pct: None, source: "security-screen" },
        ];
        let blocked = tax_block(&reports).unwrap();
        assert_eq!(blocked.source, "mint-extension");
    }

    #[test]
    fn test_no_block_when_all_clean() {
        let reports = vec![TaxReport { has_tax: false, tax_pct: None, source: "risk-report" }];
        assert!(tax_block(&reports).is_none());
    }

    #[test]
    fn test_security_response_shape() {
        let json = r#"{"code":1,"result":{"MintAddr":{"buy_tax":"0.05","sell_tax":"0"}}}"#;
        let parsed: SecurityResponse = serde_json::from_str(json).unwrap();
        let entry = &parsed.result.unwrap()["MintAddr"];
        assert_eq!(entry.buy_tax.as_deref(), Some("0.05"));
    }
}
