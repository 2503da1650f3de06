use anyhow::{bail, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashSet;
use std::fmt::Debug;

use super::types::*;
use crate::core::signal_scorer::min_bars_required;
use crate::errors::BotError;

/// Reset every out-of-range field to its documented default.
///
/// Returns one [`BotError::ConfigInvalid`] per reset so the caller can log
/// them. Called automatically by [`super::load_config`] before
/// [`validate_config`].
pub fn sanitize_config(config: &mut BotConfig) -> Vec<BotError> {
    let mut issues = Vec::new();

    sanitize_signals(&mut config.signals, &mut issues);
    sanitize_trading(config, &mut issues);
    sanitize_risk(&mut config.risk, &mut issues);

    issues
}

/// Validate invariants that cannot be repaired by falling back to a default.
pub fn validate_config(config: &BotConfig) -> Result<()> {
    let mut errors: Vec<String> = Vec::new();

    if config.trading.instruments.is_empty() {
        errors.push("trading.instruments: at least one instrument is required".into());
    }

    let mut seen = HashSet::new();
    for (i, inst) in config.trading.instruments.iter().enumerate() {
        if inst.symbol.trim().is_empty() {
            errors.push(format!("trading.instruments[{i}]: symbol is empty"));
        } else if !seen.insert(inst.symbol.to_uppercase()) {
            errors.push(format!(
                "trading.instruments[{i}]: duplicate symbol {}",
                inst.symbol
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        let msg = format!(
            "Configuration validation failed ({} error{}):\n  - {}",
            errors.len(),
            if errors.len() == 1 { "" } else { "s" },
            errors.join("\n  - ")
        );
        bail!("{msg}");
    }
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

fn sanitize_signals(signals: &mut SignalConfig, issues: &mut Vec<BotError>) {
    let d = StructureConfig::default();
    let s = &mut signals.structure;
    if s.swing_strength == 0 {
        reset(issues, "signals.structure.swing_strength", &mut s.swing_strength, d.swing_strength, "must be >= 1");
    }
    if s.structure_window < 2 * s.swing_strength + 3 {
        reset(issues, "signals.structure.structure_window", &mut s.structure_window, d.structure_window.max(2 * s.swing_strength + 3), "too small for swing strength");
    }
    if s.sweep_lookback == 0 {
        reset(issues, "signals.structure.sweep_lookback", &mut s.sweep_lookback, d.sweep_lookback, "must be >= 1");
    }
    if s.sweep_sensitivity < Decimal::ZERO || s.sweep_sensitivity >= Decimal::ONE {
        reset(issues, "signals.structure.sweep_sensitivity", &mut s.sweep_sensitivity, d.sweep_sensitivity, "must be in [0, 1)");
    }
    if s.displacement_window == 0 {
        reset(issues, "signals.structure.displacement_window", &mut s.displacement_window, d.displacement_window, "must be >= 1");
    }
    if s.displacement_body_factor <= Decimal::ZERO {
        reset(issues, "signals.structure.displacement_body_factor", &mut s.displacement_body_factor, d.displacement_body_factor, "must be > 0");
    }
    if s.displacement_range_factor <= Decimal::ZERO {
        reset(issues, "signals.structure.displacement_range_factor", &mut s.displacement_range_factor, d.displacement_range_factor, "must be > 0");
    }

    let d = TrendConfig::default();
    let t = &mut signals.trend;
    if t.atr_period == 0 {
        reset(issues, "signals.trend.atr_period", &mut t.atr_period, d.atr_period, "must be >= 1");
    }
    if t.adx_period == 0 {
        reset(issues, "signals.trend.adx_period", &mut t.adx_period, d.adx_period, "must be >= 1");
    }
    if t.adx_minimum < Decimal::ZERO || t.adx_minimum > dec!(100) {
        reset(issues, "signals.trend.adx_minimum", &mut t.adx_minimum, d.adx_minimum, "must be in [0, 100]");
    }
    if t.fast_ma == 0 || t.fast_ma >= t.slow_ma {
        reset(issues, "signals.trend.fast_ma", &mut t.fast_ma, d.fast_ma, "must be >= 1 and below slow_ma");
        reset(issues, "signals.trend.slow_ma", &mut t.slow_ma, d.slow_ma, "must exceed fast_ma");
    }

    let d = ScoringConfig::default();
    let sc = &mut signals.scoring;
    if sc.min_confidence > 10 {
        reset(issues, "signals.scoring.min_confidence", &mut sc.min_confidence, d.min_confidence, "must be in [0, 10]");
    }
    if sc.max_spread_multiplier <= Decimal::ZERO {
        reset(issues, "signals.scoring.max_spread_multiplier", &mut sc.max_spread_multiplier, d.max_spread_multiplier, "must be > 0");
    }

    let before = signals.sessions.windows.len();
    signals.sessions.windows.retain(|w| {
        let ok = w.start_hour < 24 && w.end_hour <= 24 && w.start_hour != w.end_hour;
        if !ok {
            issues.push(BotError::ConfigInvalid {
                field: format!("signals.sessions.{}", w.name),
                reason: format!("invalid hours {}..{}, window dropped", w.start_hour, w.end_hour),
            });
        }
        ok
    });
    if before > 0 && signals.sessions.windows.is_empty() {
        signals.sessions = SessionsConfig::default();
    }

    let d = FilterConfig::default();
    let f = &mut signals.filters;
    if f.rsi_period == 0 {
        reset(issues, "signals.filters.rsi_period", &mut f.rsi_period, d.rsi_period, "must be >= 1");
    }
    if f.rsi_oversold <= Decimal::ZERO
        || f.rsi_overbought >= dec!(100)
        || f.rsi_oversold >= f.rsi_overbought
    {
        reset(issues, "signals.filters.rsi_oversold", &mut f.rsi_oversold, d.rsi_oversold, "must satisfy 0 < oversold < overbought < 100");
        reset(issues, "signals.filters.rsi_overbought", &mut f.rsi_overbought, d.rsi_overbought, "must satisfy 0 < oversold < overbought < 100");
    }
    if f.min_volume < Decimal::ZERO {
        reset(issues, "signals.filters.min_volume", &mut f.min_volume, d.min_volume, "must be >= 0");
    }
}

// ---------------------------------------------------------------------------
// Trading
// ---------------------------------------------------------------------------

fn sanitize_trading(config: &mut BotConfig, issues: &mut Vec<BotError>) {
    let d = TradingConfig::default();
    let required = min_bars_required(&config.signals);
    let t = &mut config.trading;

    if t.bars < required {
        reset(issues, "trading.bars", &mut t.bars, d.bars.max(required), "fewer than the longest lookback needs");
    }
    if t.check_interval_seconds == 0 {
        reset(issues, "trading.check_interval_seconds", &mut t.check_interval_seconds, d.check_interval_seconds, "must be > 0");
    }

    let dp = PaperConfig::default();
    if t.paper.starting_balance <= Decimal::ZERO {
        reset(issues, "trading.paper.starting_balance", &mut t.paper.starting_balance, dp.starting_balance, "must be > 0");
    }
    if t.paper.spread_pips < Decimal::ZERO {
        reset(issues, "trading.paper.spread_pips", &mut t.paper.spread_pips, dp.spread_pips, "must be >= 0");
    }

    for inst in &mut t.instruments {
        sanitize_instrument(inst, issues);
    }
}

fn sanitize_instrument(inst: &mut InstrumentConfig, issues: &mut Vec<BotError>) {
    let d = InstrumentConfig::default();
    let prefix = format!("trading.instruments.{}", inst.symbol);

    if inst.pip_size.is_some_and(|p| p <= Decimal::ZERO) {
        reset(issues, &format!("{prefix}.pip_size"), &mut inst.pip_size, None, "must be > 0");
    }
    if inst.contract_size <= Decimal::ZERO {
        reset(issues, &format!("{prefix}.contract_size"), &mut inst.contract_size, d.contract_size, "must be > 0");
    }
    if inst.tick_value <= Decimal::ZERO {
        reset(issues, &format!("{prefix}.tick_value"), &mut inst.tick_value, d.tick_value, "must be > 0");
    }

    // The lot grid must contain at least one value inside [min_lot, max_lot].
    let grid_ok = inst.lot_step > Decimal::ZERO
        && inst.min_lot > Decimal::ZERO
        && inst.max_lot >= inst.min_lot
        && (inst.min_lot / inst.lot_step).ceil() * inst.lot_step <= inst.max_lot;
    if !grid_ok {
        reset(issues, &format!("{prefix}.min_lot"), &mut inst.min_lot, d.min_lot, "lot bounds inconsistent with lot_step");
        reset(issues, &format!("{prefix}.max_lot"), &mut inst.max_lot, d.max_lot, "lot bounds inconsistent with lot_step");
        reset(issues, &format!("{prefix}.lot_step"), &mut inst.lot_step, d.lot_step, "lot bounds inconsistent with lot_step");
    }
}

// ---------------------------------------------------------------------------
// Risk
// ---------------------------------------------------------------------------

fn sanitize_risk(risk: &mut RiskConfig, issues: &mut Vec<BotError>) {
    let d = RiskConfig::default();
    let pct_ok = |v: Decimal| v > Decimal::ZERO && v <= dec!(100);

    let db = ClassRiskConfig::default();
    let b = &mut risk.base_risk;
    for (name, value, default) in [
        ("forex", &mut b.forex, db.forex),
        ("jpy_forex", &mut b.jpy_forex, db.jpy_forex),
        ("metal", &mut b.metal, db.metal),
        ("crypto", &mut b.crypto, db.crypto),
    ] {
        if !pct_ok(*value) {
            reset(issues, &format!("risk.base_risk.{name}"), value, default, "must be in (0, 100]");
        }
    }

    if !pct_ok(risk.max_risk_per_trade) {
        reset(issues, "risk.max_risk_per_trade", &mut risk.max_risk_per_trade, d.max_risk_per_trade, "must be in (0, 100]");
    }
    if risk.atr_stop_multiplier <= Decimal::ZERO {
        reset(issues, "risk.atr_stop_multiplier", &mut risk.atr_stop_multiplier, d.atr_stop_multiplier, "must be > 0");
    }
    if risk.atr_tp_multiplier <= Decimal::ZERO {
        reset(issues, "risk.atr_tp_multiplier", &mut risk.atr_tp_multiplier, d.atr_tp_multiplier, "must be > 0");
    }
    if !pct_ok(risk.daily_loss_limit_pct) {
        reset(issues, "risk.daily_loss_limit_pct", &mut risk.daily_loss_limit_pct, d.daily_loss_limit_pct, "must be in (0, 100]");
    }

    let dt = TrailingConfig::default();
    let t = &mut risk.trailing;
    if t.activation_pips < Decimal::ZERO {
        reset(issues, "risk.trailing.activation_pips", &mut t.activation_pips, dt.activation_pips, "must be >= 0");
    }
    if t.trail_distance_pips <= Decimal::ZERO {
        reset(issues, "risk.trailing.trail_distance_pips", &mut t.trail_distance_pips, dt.trail_distance_pips, "must be > 0");
    }
    if t.atr_trailing_multiplier <= Decimal::ZERO {
        reset(issues, "risk.trailing.atr_trailing_multiplier", &mut t.atr_trailing_multiplier, dt.atr_trailing_multiplier, "must be > 0");
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn reset<T: Debug>(
    issues: &mut Vec<BotError>,
    field: &str,
    value: &mut T,
    default: T,
    reason: &str,
) {
    issues.push(BotError::ConfigInvalid {
        field: field.to_string(),
        reason: format!("{reason} (got {value:?}, using {default:?})"),
    });
    *value = default;
}
