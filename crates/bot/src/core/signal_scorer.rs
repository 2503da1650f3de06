//! Confidence scoring and BUY/SELL/HOLD decision.
//!
//! Fuses the market-structure report, the trend reading and the session clock
//! into an additive score clamped to `[0, 10]`:
//!
//! | condition                                   | weight |
//! |---------------------------------------------|--------|
//! | structure matches direction                 | 2      |
//! | sweep matches direction                     | 2      |
//! | BOS matches direction                       | 2      |
//! | displacement matches direction              | 3      |
//! | strong trend with matching DI dominance     | 2      |
//! | moving-average bias matches direction       | 1      |
//! | inside an active session window             | 1      |
//!
//! A directional signal needs matching structure, every configured hard gate,
//! and `confidence >= min_confidence`. Candidates whose spread exceeds
//! `max_spread_multiplier × ATR` are forced to HOLD, as are candidates that
//! fail an enabled RSI or volume filter.

use chrono::{DateTime, Timelike};
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::config::{ScoringConfig, SessionWindow, SignalConfig};
use crate::errors::BotError;
use crate::types::{Analysis, Candle, PositionDirection, Quote, ScoreBreakdown, Signal, TrendReading};

use super::market_structure::{MarketStructureAnalyzer, StructureReport};
use super::trend_filter::{self, TrendFilter};
use super::volatility::VolatilityEngine;

pub const WEIGHT_STRUCTURE: u8 = 2;
pub const WEIGHT_SWEEP: u8 = 2;
pub const WEIGHT_BOS: u8 = 2;
pub const WEIGHT_DISPLACEMENT: u8 = 3;
pub const WEIGHT_TREND: u8 = 2;
pub const WEIGHT_MA_BIAS: u8 = 1;
pub const WEIGHT_SESSION: u8 = 1;

pub const MAX_CONFIDENCE: u8 = 10;

/// Fewest bars that satisfy every lookback in the signal configuration.
pub fn min_bars_required(signals: &SignalConfig) -> usize {
    let t = &signals.trend;
    let s = &signals.structure;
    [
        t.slow_ma,
        s.structure_window,
        2 * t.adx_period + 1,
        s.displacement_window + 1,
        t.atr_period + 1,
    ]
    .into_iter()
    .max()
    .unwrap_or(0)
        + 1
}

// ═══════════════════════════════════════════════════════════════════════════
// Sessions
// ═══════════════════════════════════════════════════════════════════════════

impl SessionWindow {
    /// Half-open `[start, end)` in UTC hours, wrapping past midnight when
    /// `start > end`. An empty window (`start == end`) never matches.
    pub fn contains_hour(&self, hour: u32) -> bool {
        match self.start_hour.cmp(&self.end_hour) {
            std::cmp::Ordering::Less => hour >= self.start_hour && hour < self.end_hour,
            std::cmp::Ordering::Greater => hour >= self.start_hour || hour < self.end_hour,
            std::cmp::Ordering::Equal => false,
        }
    }
}

/// Whether `server_time` (UNIX seconds) falls inside any session window.
pub fn in_session(server_time: i64, windows: &[SessionWindow]) -> bool {
    let Some(ts) = DateTime::from_timestamp(server_time, 0) else {
        return false;
    };
    let hour = ts.hour();
    windows.iter().any(|w| w.contains_hour(hour))
}

// ═══════════════════════════════════════════════════════════════════════════
// Scoring
// ═══════════════════════════════════════════════════════════════════════════

/// Weighted contributions for one direction.
pub fn score_direction(
    direction: PositionDirection,
    report: &StructureReport,
    trend: &TrendReading,
    session_active: bool,
) -> ScoreBreakdown {
    let award = |hit: bool, weight: u8| if hit { weight } else { 0 };

    ScoreBreakdown {
        structure: award(
            report.structure.label.direction() == Some(direction),
            WEIGHT_STRUCTURE,
        ),
        sweep: award(
            report.sweep.map(|s| s.direction()) == Some(direction),
            WEIGHT_SWEEP,
        ),
        bos: award(report.bos.map(|b| b.direction()) == Some(direction), WEIGHT_BOS),
        displacement: award(
            report.displacement.map(|d| d.direction()) == Some(direction),
            WEIGHT_DISPLACEMENT,
        ),
        trend: award(trend.confirms(direction), WEIGHT_TREND),
        ma_bias: award(trend.ma_bias() == Some(direction), WEIGHT_MA_BIAS),
        session: award(session_active, WEIGHT_SESSION),
    }
}

/// Clamp a breakdown total into `[0, MAX_CONFIDENCE]`.
pub fn clamp_confidence(breakdown: &ScoreBreakdown) -> u8 {
    breakdown.raw_total().min(u32::from(MAX_CONFIDENCE)) as u8
}

/// Structure-matching direction that clears every hard gate and the
/// confidence floor; HOLD otherwise.
pub fn decide(scoring: &ScoringConfig, report: &StructureReport, confidence: u8) -> Signal {
    let Some(direction) = report.structure.label.direction() else {
        return Signal::Hold;
    };
    if scoring.require_bos && report.bos.map(|b| b.direction()) != Some(direction) {
        return Signal::Hold;
    }
    if scoring.require_displacement
        && report.displacement.map(|d| d.direction()) != Some(direction)
    {
        return Signal::Hold;
    }
    if confidence < scoring.min_confidence {
        return Signal::Hold;
    }
    Signal::from_direction(direction)
}

/// Execution-cost sanity check: spread wider than `multiplier × ATR`.
pub fn spread_exceeds(spread: Decimal, atr: Decimal, multiplier: Decimal) -> bool {
    spread > atr * multiplier
}

// ═══════════════════════════════════════════════════════════════════════════
// SignalScorer
// ═══════════════════════════════════════════════════════════════════════════

/// Per-symbol analysis pipeline: volatility, trend, structure, score.
#[derive(Debug, Clone)]
pub struct SignalScorer {
    config: SignalConfig,
    structure: MarketStructureAnalyzer,
    trend: TrendFilter,
    volatility: VolatilityEngine,
    min_bars: usize,
}

impl SignalScorer {
    pub fn new(config: SignalConfig) -> Self {
        Self {
            structure: MarketStructureAnalyzer::new(config.structure.clone()),
            trend: TrendFilter::new(config.trend.clone()),
            volatility: VolatilityEngine::new(config.trend.atr_period),
            min_bars: min_bars_required(&config),
            config,
        }
    }

    pub fn min_bars(&self) -> usize {
        self.min_bars
    }

    /// Analyze one symbol for the current cycle.
    ///
    /// Fails with `DataUnavailable` when the window is shorter than the
    /// longest configured lookback.
    pub fn analyze(
        &self,
        symbol: &str,
        candles: &[Candle],
        quote: &Quote,
    ) -> Result<Analysis, BotError> {
        if candles.len() < self.min_bars {
            return Err(BotError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: format!("{} bars, need {}", candles.len(), self.min_bars),
            });
        }
        let Some(current) = candles.last() else {
            return Err(BotError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: "empty candle window".into(),
            });
        };

        let report = self.structure.analyze(candles);
        let trend = self.trend.evaluate(candles);
        let atr = self.volatility.atr(candles);
        let session_active = in_session(quote.server_time, &self.config.sessions.windows);

        let breakdown = match report.structure.label.direction() {
            Some(direction) => score_direction(direction, &report, &trend, session_active),
            None => {
                let bull = score_direction(PositionDirection::Long, &report, &trend, session_active);
                let bear =
                    score_direction(PositionDirection::Short, &report, &trend, session_active);
                if bull.raw_total() >= bear.raw_total() {
                    bull
                } else {
                    bear
                }
            }
        };
        let confidence = clamp_confidence(&breakdown);
        let mut signal = decide(&self.config.scoring, &report, confidence);

        let spread = quote.spread();
        let mut spread_rejected = false;
        if signal != Signal::Hold
            && spread_exceeds(spread, atr, self.config.scoring.max_spread_multiplier)
        {
            let err = BotError::SpreadTooWide {
                symbol: symbol.to_string(),
                spread: spread.to_string(),
                limit: (atr * self.config.scoring.max_spread_multiplier).to_string(),
            };
            debug!(error = %err, "candidate downgraded to HOLD");
            signal = Signal::Hold;
            spread_rejected = true;
        }

        let mut filter_rejection = None;
        if let Some(direction) = signal.direction() {
            filter_rejection = self.filter_rejection(candles, direction);
            if let Some(reason) = &filter_rejection {
                debug!(symbol, reason = %reason, "candidate filtered");
                signal = Signal::Hold;
            }
        }

        let analysis = Analysis {
            symbol: symbol.to_string(),
            structure: report.structure,
            sweep: report.sweep,
            bos: report.bos,
            displacement: report.displacement,
            adx: trend.adx,
            plus_di: trend.plus_di,
            minus_di: trend.minus_di,
            atr,
            price: current.close,
            spread,
            confidence,
            signal,
            breakdown,
            spread_rejected,
            filter_rejection,
            timestamp: current.timestamp,
        };

        if analysis.signal == Signal::Hold {
            debug!(
                symbol,
                structure = analysis.structure.label.as_str(),
                confidence,
                "no signal"
            );
        } else {
            info!(
                symbol,
                signal = analysis.signal.as_str(),
                confidence,
                structure = analysis.structure.label.as_str(),
                sweep = analysis.sweep.is_some(),
                bos = analysis.bos.is_some(),
                displacement = analysis.displacement.is_some(),
                adx = %analysis.adx.round_dp(2),
                atr = %analysis.atr,
                "signal generated"
            );
        }

        Ok(analysis)
    }

    fn filter_rejection(&self, candles: &[Candle], direction: PositionDirection) -> Option<String> {
        let filters = &self.config.filters;
        if filters.use_rsi_filter {
            let closes: Vec<Decimal> = candles.iter().map(|c| c.close).collect();
            let rsi = trend_filter::rsi(&closes, filters.rsi_period);
            if !trend_filter::rsi_allows(rsi, direction, filters) {
                return Some(format!("rsi {} blocks {}", rsi.round_dp(2), direction.as_str()));
            }
        }
        if filters.use_volume_filter && !trend_filter::volume_allows(candles, filters.min_volume) {
            return Some("volume below threshold".into());
        }
        None
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StructureConfig, TrendConfig};
    use crate::types::{
        BosType, DisplacementType, StructureLabel, StructureState, SweepType,
    };
    use rust_decimal_macros::dec;

    fn report(
        label: StructureLabel,
        sweep: Option<SweepType>,
        bos: Option<BosType>,
        displacement: Option<DisplacementType>,
    ) -> StructureReport {
        StructureReport {
            structure: StructureState {
                label,
                last_swing_high: None,
                last_swing_low: None,
            },
            swings: Vec::new(),
            sweep,
            bos,
            displacement,
        }
    }

    fn bullish_trend() -> TrendReading {
        TrendReading {
            adx: dec!(30),
            plus_di: dec!(30),
            minus_di: dec!(10),
            strong_trend: true,
            fast_ma: dec!(1.2),
            slow_ma: dec!(1.1),
        }
    }

    fn full_bull_report() -> StructureReport {
        report(
            StructureLabel::Uptrend,
            Some(SweepType::BullishSweep { level: dec!(1.1) }),
            Some(BosType::BosUp),
            Some(DisplacementType::Bullish),
        )
    }

    // -- min bars --------------------------------------------------------------

    #[test]
    fn test_min_bars_required_defaults() {
        // max(200, 100, 29, 21, 15) + 1
        assert_eq!(min_bars_required(&SignalConfig::default()), 201);
    }

    #[test]
    fn test_min_bars_required_structure_dominates() {
        let cfg = SignalConfig {
            structure: StructureConfig {
                structure_window: 250,
                ..StructureConfig::default()
            },
            trend: TrendConfig {
                slow_ma: 50,
                ..TrendConfig::default()
            },
            ..SignalConfig::default()
        };
        assert_eq!(min_bars_required(&cfg), 251);
    }

    // -- sessions --------------------------------------------------------------

    #[test]
    fn test_session_window_half_open() {
        let london = SessionWindow {
            name: "london".into(),
            start_hour: 7,
            end_hour: 16,
        };
        assert!(!london.contains_hour(6));
        assert!(london.contains_hour(7));
        assert!(london.contains_hour(15));
        assert!(!london.contains_hour(16));
    }

    #[test]
    fn test_session_window_wraps_midnight() {
        let sydney = SessionWindow {
            name: "sydney".into(),
            start_hour: 21,
            end_hour: 6,
        };
        assert!(sydney.contains_hour(22));
        assert!(sydney.contains_hour(0));
        assert!(sydney.contains_hour(5));
        assert!(!sydney.contains_hour(6));
        assert!(!sydney.contains_hour(12));
    }

    #[test]
    fn test_in_session_uses_utc_hour() {
        let windows = crate::config::SessionsConfig::default().windows;
        // 2024-01-02 13:00:00 UTC
        assert!(in_session(1_704_200_400, &windows));
        // 2024-01-02 03:00:00 UTC
        assert!(!in_session(1_704_164_400, &windows));
    }

    // -- scoring ---------------------------------------------------------------

    #[test]
    fn test_full_bull_score_clamps_to_ten() {
        let b = score_direction(PositionDirection::Long, &full_bull_report(), &bullish_trend(), true);
        assert_eq!(b.raw_total(), 13);
        assert_eq!(clamp_confidence(&b), 10);
    }

    #[test]
    fn test_opposite_direction_scores_only_session() {
        let b = score_direction(PositionDirection::Short, &full_bull_report(), &bullish_trend(), true);
        assert_eq!(b.raw_total(), 1);
        assert_eq!(b.session, WEIGHT_SESSION);
    }

    #[test]
    fn test_weak_trend_earns_no_trend_points() {
        let weak = TrendReading {
            strong_trend: false,
            ..bullish_trend()
        };
        let b = score_direction(PositionDirection::Long, &full_bull_report(), &weak, false);
        assert_eq!(b.trend, 0);
        assert_eq!(b.ma_bias, WEIGHT_MA_BIAS);
        assert_eq!(b.session, 0);
    }

    // -- decision --------------------------------------------------------------

    #[test]
    fn test_decide_buy_when_all_gates_pass() {
        let scoring = ScoringConfig {
            require_displacement: true,
            ..ScoringConfig::default()
        };
        assert_eq!(decide(&scoring, &full_bull_report(), 10), Signal::Buy);
    }

    #[test]
    fn test_decide_range_is_hold() {
        let r = report(StructureLabel::Range, None, Some(BosType::BosUp), None);
        assert_eq!(decide(&ScoringConfig::default(), &r, 10), Signal::Hold);
    }

    #[test]
    fn test_decide_require_bos_gate() {
        let r = report(
            StructureLabel::Uptrend,
            Some(SweepType::BullishSweep { level: dec!(1) }),
            None,
            Some(DisplacementType::Bullish),
        );
        assert_eq!(decide(&ScoringConfig::default(), &r, 9), Signal::Hold);

        let relaxed = ScoringConfig {
            require_bos: false,
            ..ScoringConfig::default()
        };
        assert_eq!(decide(&relaxed, &r, 9), Signal::Buy);
    }

    #[test]
    fn test_decide_require_displacement_gate() {
        let scoring = ScoringConfig {
            require_displacement: true,
            ..ScoringConfig::default()
        };
        let r = report(StructureLabel::Downtrend, None, Some(BosType::BosDown), None);
        assert_eq!(decide(&scoring, &r, 8), Signal::Hold);

        let r = report(
            StructureLabel::Downtrend,
            None,
            Some(BosType::BosDown),
            Some(DisplacementType::Bearish),
        );
        assert_eq!(decide(&scoring, &r, 8), Signal::Sell);
    }

    #[test]
    fn test_decide_min_confidence_floor() {
        let r = report(StructureLabel::Uptrend, None, Some(BosType::BosUp), None);
        assert_eq!(decide(&ScoringConfig::default(), &r, 5), Signal::Hold);
        assert_eq!(decide(&ScoringConfig::default(), &r, 6), Signal::Buy);
    }

    #[test]
    fn test_spread_filter() {
        assert!(!spread_exceeds(dec!(0.0002), dec!(0.0010), dec!(0.5)));
        assert!(spread_exceeds(dec!(0.0006), dec!(0.0010), dec!(0.5)));
        assert!(spread_exceeds(dec!(0.0001), Decimal::ZERO, dec!(0.5)));
    }

    // -- analyzer --------------------------------------------------------------

    #[test]
    fn test_analyze_rejects_short_window() {
        let scorer = SignalScorer::new(SignalConfig::default());
        let candles = vec![
            Candle {
                timestamp: 0,
                open: dec!(1),
                high: dec!(1),
                low: dec!(1),
                close: dec!(1),
                volume: dec!(1),
            };
            50
        ];
        let quote = Quote {
            bid: dec!(1),
            ask: dec!(1.0001),
            server_time: 0,
        };
        let err = scorer.analyze("EURUSD", &candles, &quote).unwrap_err();
        assert!(matches!(err, BotError::DataUnavailable { .. }));
    }

    #[test]
    fn test_analyze_flat_market_holds() {
        let scorer = SignalScorer::new(SignalConfig::default());
        let candles: Vec<Candle> = (0..250)
            .map(|i| Candle {
                timestamp: i * 3600,
                open: dec!(1.1),
                high: dec!(1.1005),
                low: dec!(1.0995),
                close: dec!(1.1),
                volume: dec!(1000),
            })
            .collect();
        let quote = Quote {
            bid: dec!(1.1),
            ask: dec!(1.1001),
            server_time: 1_704_200_400,
        };
        let analysis = scorer.analyze("EURUSD", &candles, &quote).unwrap();
        assert_eq!(analysis.signal, Signal::Hold);
        assert_eq!(analysis.structure.label, StructureLabel::Range);
        assert!(analysis.confidence <= MAX_CONFIDENCE);
    }
}
