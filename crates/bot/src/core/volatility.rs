//! Volatility and price-normalization primitives.
//!
//! Pure computation, no I/O. ATR is the simple moving average of true range
//! over the last `period` bars. Pip sizes come from the instrument naming
//! convention unless the instrument configures its own.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::config::InstrumentConfig;
use crate::types::Candle;

/// Substituted for a zero ATR whenever ATR is used as a divisor.
pub const ATR_EPSILON: Decimal = dec!(0.00000001);

// ═══════════════════════════════════════════════════════════════════════════
// Instrument classification
// ═══════════════════════════════════════════════════════════════════════════

/// Coarse instrument grouping that drives pip size and base risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentClass {
    Forex,
    /// Pairs quoted in yen.
    JpyForex,
    Metal,
    Crypto,
}

impl InstrumentClass {
    /// Classify from the symbol naming convention.
    pub fn from_symbol(symbol: &str) -> Self {
        let s = symbol.to_uppercase();
        if ["BTC", "ETH"].iter().any(|k| s.contains(k)) {
            Self::Crypto
        } else if ["XAU", "XAG", "GOLD", "SILVER"].iter().any(|k| s.contains(k)) {
            Self::Metal
        } else if s.contains("JPY") {
            Self::JpyForex
        } else {
            Self::Forex
        }
    }

    /// Canonical pip size for the class.
    pub fn pip_size(&self) -> Decimal {
        match self {
            Self::Forex => dec!(0.0001),
            Self::JpyForex => dec!(0.01),
            Self::Metal => dec!(0.01),
            Self::Crypto => dec!(1.0),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forex => "forex",
            Self::JpyForex => "jpy_forex",
            Self::Metal => "metal",
            Self::Crypto => "crypto",
        }
    }
}

/// Resolved contract specification for one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentSpec {
    pub symbol: String,
    pub class: InstrumentClass,
    pub pip: Decimal,
    pub contract_size: Decimal,
    pub tick_value: Decimal,
    pub min_lot: Decimal,
    pub max_lot: Decimal,
    pub lot_step: Decimal,
}

impl InstrumentSpec {
    pub fn from_config(config: &InstrumentConfig) -> Self {
        let class = InstrumentClass::from_symbol(&config.symbol);
        Self {
            symbol: config.symbol.clone(),
            class,
            pip: config.pip_size.unwrap_or_else(|| class.pip_size()),
            contract_size: config.contract_size,
            tick_value: config.tick_value,
            min_lot: config.min_lot,
            max_lot: config.max_lot,
            lot_step: config.lot_step,
        }
    }

    /// Account-currency value of a one-pip move on one lot.
    ///
    /// Metals and crypto quote tick value per contract; forex pairs use the
    /// pip size against the contract.
    pub fn value_per_pip(&self) -> Decimal {
        match self.class {
            InstrumentClass::Metal | InstrumentClass::Crypto => {
                self.contract_size * self.tick_value
            }
            InstrumentClass::Forex | InstrumentClass::JpyForex => self.contract_size * self.pip,
        }
    }

    pub fn to_pips(&self, distance: Decimal) -> Decimal {
        price_to_pips(distance, self.pip)
    }

    pub fn to_price(&self, pips: Decimal) -> Decimal {
        pips_to_price(pips, self.pip)
    }
}

/// Convert a price distance into pips. A non-positive pip size yields zero.
pub fn price_to_pips(distance: Decimal, pip: Decimal) -> Decimal {
    if pip <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    distance / pip
}

pub fn pips_to_price(pips: Decimal, pip: Decimal) -> Decimal {
    pips * pip
}

// ═══════════════════════════════════════════════════════════════════════════
// True range / ATR
// ═══════════════════════════════════════════════════════════════════════════

/// True range for bars `1..n`: `max(H-L, |H-prevC|, |L-prevC|)`.
///
/// The result is one shorter than the input; index `i` belongs to bar `i+1`.
pub fn true_ranges(candles: &[Candle]) -> Vec<Decimal> {
    candles
        .windows(2)
        .map(|w| {
            let (prev, cur) = (&w[0], &w[1]);
            let hl = cur.high - cur.low;
            let hc = (cur.high - prev.close).abs();
            let lc = (cur.low - prev.close).abs();
            hl.max(hc).max(lc)
        })
        .collect()
}

/// Average True Range as the mean of the last `period` true ranges.
///
/// Returns `Decimal::ZERO` on insufficient data.
pub fn atr(candles: &[Candle], period: usize) -> Decimal {
    if period == 0 || candles.len() < period + 1 {
        return Decimal::ZERO;
    }
    let trs = true_ranges(candles);
    let window = &trs[trs.len() - period..];
    window.iter().copied().sum::<Decimal>() / Decimal::from(period as u64)
}

/// Guard a volatility value before dividing by it.
pub fn safe_divisor(value: Decimal) -> Decimal {
    if value > Decimal::ZERO {
        value
    } else {
        ATR_EPSILON
    }
}

/// ATR calculator bound to a configured period.
#[derive(Debug, Clone, Copy)]
pub struct VolatilityEngine {
    pub period: usize,
}

impl VolatilityEngine {
    pub fn new(period: usize) -> Self {
        Self { period }
    }

    pub fn atr(&self, candles: &[Candle]) -> Decimal {
        atr(candles, self.period)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════
