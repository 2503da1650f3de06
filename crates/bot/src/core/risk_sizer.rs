//! Fractional-risk position sizing and ATR-based stop placement.
//!
//! `risk% = base_risk(class) × (confidence / 10 if scaling)`, capped at
//! `max_risk_per_trade`. The account risks `balance × risk% / 100` over a stop
//! `ATR × atr_stop_multiplier` away, so
//! `lots = risk_amount / (value_per_pip × stop_pips)`, snapped to the lot
//! grid inside `[min_lot, max_lot]`.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::config::RiskConfig;
use crate::types::PositionDirection;

use super::volatility::{InstrumentClass, InstrumentSpec};

// ═══════════════════════════════════════════════════════════════════════════
// Lot grid
// ═══════════════════════════════════════════════════════════════════════════

/// Snap `raw` onto the `step` grid within `[min_lot, max_lot]`.
///
/// Bounds are first tightened to the nearest on-grid values, then the raw
/// size is rounded to the nearest step and clamped. A non-positive step
/// disables snapping.
pub fn snap_lots(raw: Decimal, min_lot: Decimal, max_lot: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return raw.max(min_lot).min(max_lot);
    }
    let lo = (min_lot / step).ceil() * step;
    let hi = (max_lot / step).floor() * step;
    if hi < lo {
        return lo;
    }
    let snapped = (raw / step).round() * step;
    snapped.max(lo).min(hi).normalize()
}

/// Smallest on-grid lot, used whenever the size cannot be computed.
pub fn min_safe_lots(min_lot: Decimal, max_lot: Decimal, step: Decimal) -> Decimal {
    snap_lots(Decimal::ZERO, min_lot, max_lot, step)
}

// ═══════════════════════════════════════════════════════════════════════════
// Stop plan
// ═══════════════════════════════════════════════════════════════════════════

/// Protective levels for a prospective entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopPlan {
    pub stop: Decimal,
    pub target: Decimal,
    /// Absolute entry-to-stop distance in price units.
    pub stop_distance: Decimal,
    pub stop_pips: Decimal,
}

/// Entry size together with the figures that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizedEntry {
    pub lots: Decimal,
    pub risk_percent: Decimal,
    pub risk_amount: Decimal,
    pub plan: StopPlan,
}

// ═══════════════════════════════════════════════════════════════════════════
// RiskSizer
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct RiskSizer {
    config: RiskConfig,
}

impl RiskSizer {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    fn base_risk(&self, class: InstrumentClass) -> Decimal {
        let base = &self.config.base_risk;
        match class {
            InstrumentClass::Forex => base.forex,
            InstrumentClass::JpyForex => base.jpy_forex,
            InstrumentClass::Metal => base.metal,
            InstrumentClass::Crypto => base.crypto,
        }
    }

    /// Percent of balance to risk on one trade.
    pub fn risk_percent(&self, class: InstrumentClass, confidence: u8) -> Decimal {
        let base = self.base_risk(class);
        let scaled = if self.config.confidence_scaling {
            base * Decimal::from(confidence) / dec!(10)
        } else {
            base
        };
        scaled.min(self.config.max_risk_per_trade).max(Decimal::ZERO)
    }

    /// Stop and target `ATR × multiplier` away from `entry`.
    pub fn stop_plan(
        &self,
        direction: PositionDirection,
        entry: Decimal,
        atr: Decimal,
        spec: &InstrumentSpec,
    ) -> StopPlan {
        let sign = direction.sign();
        let stop_distance = atr * self.config.atr_stop_multiplier;
        let target_distance = atr * self.config.atr_tp_multiplier;
        StopPlan {
            stop: entry - sign * stop_distance,
            target: entry + sign * target_distance,
            stop_distance,
            stop_pips: spec.to_pips(stop_distance),
        }
    }

    /// Lots for a given balance, confidence and stop distance in pips.
    ///
    /// Falls back to the minimum safe lot when `value_per_pip × stop_pips`
    /// is not positive.
    pub fn lots(
        &self,
        balance: Decimal,
        confidence: u8,
        spec: &InstrumentSpec,
        stop_pips: Decimal,
    ) -> Decimal {
        let risk_amount = balance * self.risk_percent(spec.class, confidence) / dec!(100);
        let divisor = spec.value_per_pip() * stop_pips;
        if divisor <= Decimal::ZERO {
            return min_safe_lots(spec.min_lot, spec.max_lot, spec.lot_step);
        }
        snap_lots(risk_amount / divisor, spec.min_lot, spec.max_lot, spec.lot_step)
    }

    /// Full sizing for an entry at `entry` with the current ATR.
    pub fn size_entry(
        &self,
        direction: PositionDirection,
        entry: Decimal,
        atr: Decimal,
        balance: Decimal,
        confidence: u8,
        spec: &InstrumentSpec,
    ) -> SizedEntry {
        let plan = self.stop_plan(direction, entry, atr, spec);
        let risk_percent = self.risk_percent(spec.class, confidence);
        SizedEntry {
            lots: self.lots(balance, confidence, spec, plan.stop_pips),
            risk_percent,
            risk_amount: balance * risk_percent / dec!(100),
            plan,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════
