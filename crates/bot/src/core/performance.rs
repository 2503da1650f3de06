//! Closed-trade history and aggregate statistics.
//!
//! In-memory, append-only. Peak balance and max drawdown are tracked from
//! each trade's `balance_after`. Statistics are logged every
//! `SUMMARY_EVERY` trades and written as JSON on shutdown.

use std::path::Path;

use anyhow::{Context, Result};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use tracing::info;

use crate::types::{PerformanceStats, TradeRecord};

/// Trades between periodic summary log lines.
pub const SUMMARY_EVERY: usize = 20;

const TRADING_DAYS_PER_YEAR: u32 = 252;

pub struct PerformanceTracker {
    initial_balance: Decimal,
    balance: Decimal,
    peak_balance: Decimal,
    max_drawdown_pct: Decimal,
    trades: Vec<TradeRecord>,
}

#[derive(Serialize)]
struct StatsExport<'a> {
    statistics: PerformanceStats,
    trades: &'a [TradeRecord],
}

impl PerformanceTracker {
    pub fn new(initial_balance: Decimal) -> Self {
        Self {
            initial_balance,
            balance: initial_balance,
            peak_balance: initial_balance,
            max_drawdown_pct: Decimal::ZERO,
            trades: Vec::new(),
        }
    }

    /// Rebase on the venue's balance before any trade has closed.
    pub fn set_initial_balance(&mut self, balance: Decimal) {
        if self.trades.is_empty() {
            self.initial_balance = balance;
            self.balance = balance;
            self.peak_balance = balance;
        }
    }

    pub fn record(&mut self, trade: TradeRecord) {
        self.update_balance(trade.balance_after);
        self.trades.push(trade);
        if self.trades.len() % SUMMARY_EVERY == 0 {
            self.log_summary();
        }
    }

    fn update_balance(&mut self, balance: Decimal) {
        self.balance = balance;
        if balance > self.peak_balance {
            self.peak_balance = balance;
        }
        if self.peak_balance > Decimal::ZERO {
            let dd = (self.peak_balance - balance) / self.peak_balance * dec!(100);
            if dd > self.max_drawdown_pct {
                self.max_drawdown_pct = dd;
            }
        }
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn statistics(&self) -> PerformanceStats {
        let total = self.trades.len();
        if total == 0 {
            return PerformanceStats {
                final_balance: self.balance,
                ..PerformanceStats::default()
            };
        }
        let n = Decimal::from(total as u64);

        let profits: Vec<Decimal> = self.trades.iter().map(|t| t.profit).collect();
        let winning = profits.iter().filter(|p| **p > Decimal::ZERO).count();
        let losing = profits.iter().filter(|p| **p < Decimal::ZERO).count();

        let total_profit: Decimal = profits.iter().copied().sum();
        let total_pips: Decimal = self.trades.iter().map(|t| t.pips).sum();
        let gross_profit: Decimal = profits.iter().filter(|p| **p > Decimal::ZERO).sum();
        let gross_loss: Decimal = profits
            .iter()
            .filter(|p| **p < Decimal::ZERO)
            .map(|p| p.abs())
            .sum();

        let (max_consecutive_wins, max_consecutive_losses) = max_streaks(&profits);
        let returns: Vec<Decimal> = self
            .trades
            .iter()
            .filter_map(|t| {
                let before = t.balance_after - t.profit;
                (before > Decimal::ZERO).then(|| t.profit / before)
            })
            .collect();

        PerformanceStats {
            total_trades: total as u32,
            winning_trades: winning as u32,
            losing_trades: losing as u32,
            win_rate: Decimal::from(winning as u64) / n * dec!(100),
            total_profit,
            total_pips,
            avg_profit: total_profit / n,
            avg_pips: total_pips / n,
            max_profit: profits.iter().copied().max().unwrap_or_default(),
            max_loss: profits.iter().copied().min().unwrap_or_default(),
            profit_factor: (gross_loss > Decimal::ZERO).then(|| gross_profit / gross_loss),
            max_consecutive_wins,
            max_consecutive_losses,
            max_drawdown_pct: self.max_drawdown_pct,
            sharpe_ratio: compute_sharpe(&returns),
            final_balance: self.balance,
            total_return_pct: if self.initial_balance > Decimal::ZERO {
                (self.balance - self.initial_balance) / self.initial_balance * dec!(100)
            } else {
                Decimal::ZERO
            },
        }
    }

    pub fn log_summary(&self) {
        let s = self.statistics();
        info!(
            trades = s.total_trades,
            win_rate = %s.win_rate.round_dp(1),
            total_profit = %s.total_profit.round_dp(2),
            total_pips = %s.total_pips.round_dp(1),
            profit_factor = %s.profit_factor.map(|p| p.round_dp(2).to_string()).unwrap_or_else(|| "n/a".into()),
            max_drawdown_pct = %s.max_drawdown_pct.round_dp(2),
            sharpe = %s.sharpe_ratio.round_dp(3),
            balance = %s.final_balance.round_dp(2),
            return_pct = %s.total_return_pct.round_dp(2),
            "performance summary"
        );
    }

    /// Write statistics and the full trade history as pretty JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let export = StatsExport {
            statistics: self.statistics(),
            trades: &self.trades,
        };
        let json = serde_json::to_string_pretty(&export).context("failed to serialize statistics")?;
        std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), trades = self.trades.len(), "statistics written");
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Utilities
// ═══════════════════════════════════════════════════════════════════════════

/// Longest runs of winning and losing trades. Break-even trades end both.
fn max_streaks(profits: &[Decimal]) -> (u32, u32) {
    let (mut wins, mut losses) = (0u32, 0u32);
    let (mut best_wins, mut best_losses) = (0u32, 0u32);
    for p in profits {
        match p.cmp(&Decimal::ZERO) {
            std::cmp::Ordering::Greater => {
                wins += 1;
                losses = 0;
            }
            std::cmp::Ordering::Less => {
                losses += 1;
                wins = 0;
            }
            std::cmp::Ordering::Equal => {
                wins = 0;
                losses = 0;
            }
        }
        best_wins = best_wins.max(wins);
        best_losses = best_losses.max(losses);
    }
    (best_wins, best_losses)
}

/// Annualized Sharpe of per-trade returns (population std, ×√252).
///
/// Zero with fewer than two returns or zero dispersion.
fn compute_sharpe(returns: &[Decimal]) -> Decimal {
    if returns.len() < 2 {
        return Decimal::ZERO;
    }

    let n = Decimal::from(returns.len() as u64);
    let mean: Decimal = returns.iter().copied().sum::<Decimal>() / n;
    let variance: Decimal = returns
        .iter()
        .map(|r| {
            let diff = *r - mean;
            diff * diff
        })
        .sum::<Decimal>()
        / n;

    if variance <= Decimal::ZERO {
        return Decimal::ZERO;
    }

    let annualizer = Decimal::from(TRADING_DAYS_PER_YEAR).sqrt().unwrap_or(Decimal::ONE);
    match variance.sqrt() {
        Some(std_dev) if std_dev > Decimal::ZERO => mean / std_dev * annualizer,
        _ => Decimal::ZERO,
    }
}
