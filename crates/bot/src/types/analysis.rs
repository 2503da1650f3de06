use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::position::PositionDirection;

// ============================================================================
// Market structure
// ============================================================================

/// Trend classification derived from the swing-point sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StructureLabel {
    /// Higher highs and higher lows.
    Uptrend,
    /// Lower highs and lower lows.
    Downtrend,
    Range,
}

impl StructureLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uptrend => "UPTREND",
            Self::Downtrend => "DOWNTREND",
            Self::Range => "RANGE",
        }
    }

    /// Trade direction implied by the structure, if any.
    pub fn direction(&self) -> Option<PositionDirection> {
        match self {
            Self::Uptrend => Some(PositionDirection::Long),
            Self::Downtrend => Some(PositionDirection::Short),
            Self::Range => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SwingKind {
    High,
    Low,
}

/// A local price extremum. Recomputed every cycle, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwingPoint {
    /// Index into the candle window the swing was detected in.
    pub index: usize,
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    pub kind: SwingKind,
}

/// Structure snapshot for the current window. Stateless across cycles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StructureState {
    pub label: StructureLabel,
    pub last_swing_high: Option<SwingPoint>,
    pub last_swing_low: Option<SwingPoint>,
}

impl StructureState {
    pub fn range() -> Self {
        Self {
            label: StructureLabel::Range,
            last_swing_high: None,
            last_swing_low: None,
        }
    }
}

/// Liquidity sweep of a recent extreme, carrying the swept level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SweepType {
    BullishSweep { level: Decimal },
    BearishSweep { level: Decimal },
}

impl SweepType {
    pub fn direction(&self) -> PositionDirection {
        match self {
            Self::BullishSweep { .. } => PositionDirection::Long,
            Self::BearishSweep { .. } => PositionDirection::Short,
        }
    }

    pub fn level(&self) -> Decimal {
        match self {
            Self::BullishSweep { level } | Self::BearishSweep { level } => *level,
        }
    }
}

/// Break of structure in the direction of the prevailing trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BosType {
    BosUp,
    BosDown,
}

impl BosType {
    pub fn direction(&self) -> PositionDirection {
        match self {
            Self::BosUp => PositionDirection::Long,
            Self::BosDown => PositionDirection::Short,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisplacementType {
    Bullish,
    Bearish,
}

impl DisplacementType {
    pub fn direction(&self) -> PositionDirection {
        match self {
            Self::Bullish => PositionDirection::Long,
            Self::Bearish => PositionDirection::Short,
        }
    }
}

// ============================================================================
// Trend filter output
// ============================================================================

/// Directional-movement and moving-average reading for one window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendReading {
    #[serde(with = "rust_decimal::serde::str")]
    pub adx: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub plus_di: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub minus_di: Decimal,
    /// `adx > adx_minimum`.
    pub strong_trend: bool,
    #[serde(with = "rust_decimal::serde::str")]
    pub fast_ma: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub slow_ma: Decimal,
}

impl TrendReading {
    /// Direction of the moving-average bias (fast above slow is bullish).
    pub fn ma_bias(&self) -> Option<PositionDirection> {
        if self.fast_ma > self.slow_ma {
            Some(PositionDirection::Long)
        } else if self.fast_ma < self.slow_ma {
            Some(PositionDirection::Short)
        } else {
            None
        }
    }

    /// Strong trend whose dominant DI agrees with `direction`.
    pub fn confirms(&self, direction: PositionDirection) -> bool {
        self.strong_trend
            && match direction {
                PositionDirection::Long => self.plus_di > self.minus_di,
                PositionDirection::Short => self.minus_di > self.plus_di,
            }
    }
}

// ============================================================================
// Signal
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::Hold => "HOLD",
        }
    }

    pub fn direction(&self) -> Option<PositionDirection> {
        match self {
            Self::Buy => Some(PositionDirection::Long),
            Self::Sell => Some(PositionDirection::Short),
            Self::Hold => None,
        }
    }

    pub fn from_direction(direction: PositionDirection) -> Self {
        match direction {
            PositionDirection::Long => Self::Buy,
            PositionDirection::Short => Self::Sell,
        }
    }
}

/// Per-condition contributions to the confidence score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub structure: u8,
    pub sweep: u8,
    pub bos: u8,
    pub displacement: u8,
    pub trend: u8,
    pub ma_bias: u8,
    pub session: u8,
}

impl ScoreBreakdown {
    /// Unclamped sum of all contributions.
    pub fn raw_total(&self) -> u32 {
        [
            self.structure,
            self.sweep,
            self.bos,
            self.displacement,
            self.trend,
            self.ma_bias,
            self.session,
        ]
        .iter()
        .map(|&w| u32::from(w))
        .sum()
    }
}

/// Ephemeral per-symbol, per-cycle analysis snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub symbol: String,
    pub structure: StructureState,
    pub sweep: Option<SweepType>,
    pub bos: Option<BosType>,
    pub displacement: Option<DisplacementType>,
    #[serde(with = "rust_decimal::serde::str")]
    pub adx: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub plus_di: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub minus_di: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub atr: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub spread: Decimal,
    /// Clamped to `[0, 10]`.
    pub confidence: u8,
    pub signal: Signal,
    pub breakdown: ScoreBreakdown,
    pub spread_rejected: bool,
    /// Reason an otherwise qualifying candidate was downgraded to HOLD.
    pub filter_rejection: Option<String>,
    pub timestamp: i64,
}

impl Analysis {
    /// Entry context flags carried onto the position and the closed trade.
    pub fn entry_flags(&self) -> super::position::EntryFlags {
        super::position::EntryFlags {
            sweep: self.sweep.is_some(),
            bos: self.bos.is_some(),
            displacement: self.displacement.is_some(),
        }
    }
}
