use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::analysis::StructureLabel;
use super::position::PositionDirection;

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// Opposite signal while in position.
    SignalReversal,
    /// Position vanished at the venue (stop or target filled).
    StopOrTarget,
    /// Closed during shutdown.
    Shutdown,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SignalReversal => "signal_reversal",
            Self::StopOrTarget => "stop_or_target",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Immutable record of a closed trade, appended to the trade history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub symbol: String,
    pub direction: PositionDirection,
    #[serde(with = "rust_decimal::serde::str")]
    pub entry: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub exit: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub profit: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub pips: Decimal,
    pub duration_minutes: i64,
    pub confidence: u8,
    pub structure: StructureLabel,
    pub sweep_detected: bool,
    pub bos_detected: bool,
    pub displacement_detected: bool,
    #[serde(with = "rust_decimal::serde::str")]
    pub balance_after: Decimal,
    pub exit_reason: ExitReason,
    /// UNIX seconds.
    pub close_time: i64,
}

/// Aggregate statistics over the closed-trade history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub total_trades: u32,
    pub winning_trades: u32,
    pub losing_trades: u32,
    /// Percent, 0 to 100.
    #[serde(with = "rust_decimal::serde::str")]
    pub win_rate: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_profit: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_pips: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub avg_profit: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub avg_pips: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub max_profit: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub max_loss: Decimal,
    /// Gross profit over gross loss; `None` while there are no losses.
    #[serde(with = "rust_decimal::serde::str_option")]
    pub profit_factor: Option<Decimal>,
    pub max_consecutive_wins: u32,
    pub max_consecutive_losses: u32,
    /// Percent from peak balance.
    #[serde(with = "rust_decimal::serde::str")]
    pub max_drawdown_pct: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub sharpe_ratio: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub final_balance: Decimal,
    /// Percent over the initial balance.
    #[serde(with = "rust_decimal::serde::str")]
    pub total_return_pct: Decimal,
}
