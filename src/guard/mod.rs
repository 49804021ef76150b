//! Trade guard
//!
//! Pre-trade risk validation. Every check fails closed: a tax verdict, a
//! missing quote, or implausible quote data blocks the trade rather than
//! letting it through on partial information. Checks run in a fixed order
//! and the first violation wins.

pub mod tax;

use std::sync::Arc;

use solana_sdk::pubkey::Pubkey;
use tracing::{info, warn};

use crate::config::GuardConfig;
use crate::quote::{Quote, QuoteService};
use crate::venue::VenueClassification;

use tax::{tax_block, TaxReport, TaxScanner};

pub const BLOCK_TOKEN_HAS_TAX: &str = "TOKEN_HAS_TAX";
pub const BLOCK_QUOTE_UNAVAILABLE: &str = "QUOTE_UNAVAILABLE";
pub const BLOCK_QUOTE_DATA_ERROR: &str = "QUOTE_DATA_ERROR";
pub const BLOCK_PRICE_PREMIUM_EXCEEDED: &str = "PRICE_PREMIUM_EXCEEDED";
pub const BLOCK_PRICE_IMPACT_EXCEEDED: &str = "PRICE_IMPACT_EXCEEDED";

/// Guard verdict for a prospective trade. The premium and impact fields
/// are always numeric: 0.0 on paths where the figure was never computed
/// (tax block, missing quote, missing displayed price).
#[derive(Debug, Clone)]
pub struct GuardDecision {
    pub is_valid: bool,
    pub block_reason: Option<String>,
    /// Executable price premium over the displayed market price, percent
    pub premium_pct: f64,
    pub price_impact_pct: f64,
    pub tax: Option<TaxReport>,
}

impl GuardDecision {
    fn blocked(reason: &str) -> Self {
        Self {
            is_valid: false,
            block_reason: Some(reason.to_string()),
            premium_pct: 0.0,
            price_impact_pct: 0.0,
            tax: None,
        }
    }
}

/// Tax verdict mapped to a blocking decision. `None` when no source
/// flags a transfer tax.
pub fn tax_decision(reports: &[TaxReport]) -> Option<GuardDecision> {
    let report = tax_block(reports)?;
    Some(GuardDecision {
        tax: Some(report.clone()),
        ..GuardDecision::blocked(BLOCK_TOKEN_HAS_TAX)
    })
}

/// Validates a prospective buy before any transaction is built
pub struct TradeGuard {
    quotes: Arc<QuoteService>,
    scanner: TaxScanner,
    config: GuardConfig,
}

impl TradeGuard {
    pub fn new(quotes: Arc<QuoteService>, scanner: TaxScanner, config: GuardConfig) -> Self {
        Self {
            quotes,
            scanner,
            config,
        }
    }

    /// Run the full check chain for a prospective buy.
    ///
    /// Check order: tax first (cheapest to fail, no quote needed), then
    /// quote availability, then quote sanity, then premium and impact
    /// bounds. Callers that already hold a displayed market price pass it
    /// in; otherwise it is looked up here.
    pub async fn validate(
        &self,
        classification: &VenueClassification,
        input_lamports: u64,
        slippage_bps: u32,
        displayed_price_usd: Option<f64>,
        wallet: &Pubkey,
    ) -> GuardDecision {
        let mint = &classification.mint;

        if self.config.block_on_tax {
            let reports = self.scanner.scan(mint).await;
            if let Some(decision) = tax_decision(&reports) {
                if let Some(report) = &decision.tax {
                    info!(
                        "blocking {}: transfer tax flagged by {} ({:?}%)",
                        mint, report.source, report.tax_pct
                    );
                }
                return decision;
            }
        }

        // No quote, no trade. Quote errors are treated the same as an
        // absent quote.
        let quote = match self
            .quotes
            .quote_buy(classification, input_lamports, slippage_bps, wallet)
            .await
        {
            Ok(Some(quote)) => quote,
            Ok(None) => {
                info!("blocking {}: no quote available", mint);
                return GuardDecision::blocked(BLOCK_QUOTE_UNAVAILABLE);
            }
            Err(e) => {
                warn!("blocking {}: quote failed: {}", mint, e);
                return GuardDecision::blocked(BLOCK_QUOTE_UNAVAILABLE);
            }
        };

        let displayed_price = match displayed_price_usd {
            Some(price) => Some(price),
            None => match self.quotes.displayed_price_usd(mint).await {
                Ok(price) => price,
                Err(e) => {
                    warn!("displayed price lookup failed for {}: {}", mint, e);
                    None
                }
            },
        };

        let decision = evaluate(&quote, displayed_price, &self.config);
        if let Some(reason) = &decision.block_reason {
            info!(
                "blocking {}: {} (premium {:.2}%, impact {:.2}%)",
                mint, reason, decision.premium_pct, decision.price_impact_pct
            );
        }
        decision
    }
}

/// Pure evaluation of a quote against the guard thresholds.
///
/// A quote with unmeasured impact skips the impact ceiling; the
/// deviation check against the displayed price is the backstop for
/// those quotes.
pub fn evaluate(
    quote: &Quote,
    displayed_price_usd: Option<f64>,
    config: &GuardConfig,
) -> GuardDecision {
    if !quote.executable_price_usd.is_finite() || quote.executable_price_usd <= 0.0 {
        return GuardDecision::blocked(BLOCK_QUOTE_DATA_ERROR);
    }
    if let Some(impact) = quote.price_impact_pct {
        if !impact.is_finite() || impact < 0.0 {
            return GuardDecision::blocked(BLOCK_QUOTE_DATA_ERROR);
        }
    }

    let impact_pct = quote.price_impact_pct.unwrap_or(0.0);
    let premium_pct = displayed_price_usd.map(|displayed| {
        (quote.executable_price_usd - displayed) / displayed * 100.0
    });

    if let Some(premium) = premium_pct {
        // A wild gap in either direction means one of the two prices is
        // garbage; do not trade on it.
        if !premium.is_finite() || premium.abs() > config.max_displayed_deviation_pct {
            return GuardDecision {
                premium_pct: premium,
                price_impact_pct: impact_pct,
                ..GuardDecision::blocked(BLOCK_QUOTE_DATA_ERROR)
            };
        }

        if premium > config.max_premium_pct {
            return GuardDecision {
                premium_pct: premium,
                price_impact_pct: impact_pct,
                ..GuardDecision::blocked(BLOCK_PRICE_PREMIUM_EXCEEDED)
            };
        }
    }

    if let Some(impact) = quote.price_impact_pct {
        if impact > config.max_price_impact_pct {
            return GuardDecision {
                premium_pct: premium_pct.unwrap_or(0.0),
                price_impact_pct: impact,
                ..GuardDecision::blocked(BLOCK_PRICE_IMPACT_EXCEEDED)
            };
        }
    }

    GuardDecision {
        is_valid: true,
        block_reason: None,
        premium_pct: premium_pct.unwrap_or(0.0),
        price_impact_pct: impact_pct,
        tax: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venue::{Confidence, Venue};

    fn sample_quote(price: f64, impact: f64) -> Quote {
        Quote {
            venue: Venue::PumpCurve,
            executable_price_usd: price,
            output_amount: 1_000_000,
            input_amount: 1_000_000_000,
            price_impact_pct: Some(impact),
            confidence: Confidence::High,
            source: "bonding-curve",
        }
    }

    fn taxed_report(tax_pct: f64) -> TaxReport {
        TaxReport {
            has_tax: true,
            tax_pct: Some(tax_pct),
            source: "risk-report",
        }
    }

    #[test]
    fn test_clean_quote_passes() {
        let decision = evaluate(&sample_quote(0.01, 3.0), Some(0.0099), &GuardConfig::default());
        assert!(decision.is_valid);
        assert!(decision.block_reason.is_none());
        assert!(decision.premium_pct < 25.0);
        assert!((decision.price_impact_pct - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_premium_above_threshold_blocks() {
        // Executable 30% above displayed
        let decision = evaluate(&sample_quote(0.013, 3.0), Some(0.01), &GuardConfig::default());
        assert!(!decision.is_valid);
        assert_eq!(decision.block_reason.as_deref(), Some(BLOCK_PRICE_PREMIUM_EXCEEDED));
        assert!(decision.premium_pct > 25.0);
    }

    #[test]
    fn test_impact_above_threshold_blocks() {
        let decision = evaluate(&sample_quote(0.01, 22.0), Some(0.0099), &GuardConfig::default());
        assert!(!decision.is_valid);
        assert_eq!(decision.block_reason.as_deref(), Some(BLOCK_PRICE_IMPACT_EXCEEDED));
        assert!((decision.price_impact_pct - 22.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_wild_deviation_reads_as_data_error() {
        // 200x over displayed: somebody's price is wrong
        let decision = evaluate(&sample_quote(2.0, 3.0), Some(0.01), &GuardConfig::default());
        assert!(!decision.is_valid);
        assert_eq!(decision.block_reason.as_deref(), Some(BLOCK_QUOTE_DATA_ERROR));
    }

    #[test]
    fn test_discount_below_displayed_still_passes() {
        // Cheaper than displayed is not a premium violation
        let decision = evaluate(&sample_quote(0.008, 3.0), Some(0.01), &GuardConfig::default());
        assert!(decision.is_valid);
        assert!(decision.premium_pct < 0.0);
    }

    #[test]
    fn test_missing_displayed_price_skips_premium_check() {
        let decision = evaluate(&sample_quote(0.01, 3.0), None, &GuardConfig::default());
        assert!(decision.is_valid);
        assert_eq!(decision.premium_pct, 0.0);
    }

    #[test]
    fn test_non_finite_price_blocks() {
        let decision = evaluate(&sample_quote(f64::NAN, 3.0), Some(0.01), &GuardConfig::default());
        assert_eq!(decision.block_reason.as_deref(), Some(BLOCK_QUOTE_DATA_ERROR));
    }

    #[test]
    fn test_unmeasured_impact_skips_ceiling() {
        let mut quote = sample_quote(0.01, 0.0);
        quote.price_impact_pct = None;
        quote.venue = Venue::MoonshotCurve;
        quote.confidence = Confidence::Low;
        quote.source = "curve-simulation";

        let decision = evaluate(&quote, Some(0.0099), &GuardConfig::default());
        assert!(decision.is_valid);
        assert_eq!(decision.price_impact_pct, 0.0);
    }

    #[test]
    fn test_tax_verdict_blocks_with_benign_premium_and_impact() {
        // A 5% transfer tax blocks even though premium and impact would
        // both pass their own thresholds
        let decision = tax_decision(&[taxed_report(5.0)]).unwrap();
        assert!(!decision.is_valid);
        assert_eq!(decision.block_reason.as_deref(), Some(BLOCK_TOKEN_HAS_TAX));
        assert_eq!(decision.premium_pct, 0.0);
        assert_eq!(decision.price_impact_pct, 0.0);
        assert_eq!(decision.tax.unwrap().tax_pct, Some(5.0));
    }

    #[test]
    fn test_no_tax_yields_no_decision() {
        assert!(tax_decision(&[]).is_none());
        let clean = TaxReport {
            has_tax: false,
            tax_pct: None,
            source: "risk-report",
        };
        assert!(tax_decision(&[clean]).is_none());
    }
}
