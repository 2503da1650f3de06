//! Market-structure analysis over a candle window.
//!
//! Pure computation, recomputed from scratch every cycle:
//!
//! 1. Swing points: bar `i` is a swing high when its high is `>=` every high
//!    within `strength` bars on each side (symmetric for lows). The newest
//!    bar never qualifies because it has no right-hand neighbours.
//! 2. Alternation: consecutive swings of the same kind collapse to the most
//!    extreme one, so the sequence strictly alternates HIGH/LOW. Equal highs
//!    keep the earliest, equal lows the latest, so reversing the series and
//!    negating its prices yields the same swings with the kinds swapped.
//! 3. Classification from the last two swing highs and lows.
//! 4. Liquidity sweep, break of structure and displacement on the current
//!    (newest) bar.

use rust_decimal::Decimal;

use crate::config::StructureConfig;
use crate::types::{
    BosType, Candle, DisplacementType, StructureLabel, StructureState, SweepType, SwingKind,
    SwingPoint,
};

// ═══════════════════════════════════════════════════════════════════════════
// Swing points
// ═══════════════════════════════════════════════════════════════════════════

/// Raw local extrema, in time order, before alternation is enforced.
fn raw_swings(candles: &[Candle], strength: usize) -> Vec<SwingPoint> {
    let n = candles.len();
    if strength == 0 || n < 2 * strength + 1 {
        return Vec::new();
    }

    let mut swings = Vec::new();
    for i in strength..n - strength {
        let neighbours = (i - strength..=i + strength).filter(|&j| j != i);

        let high = candles[i].high;
        if neighbours.clone().all(|j| high >= candles[j].high) {
            swings.push(SwingPoint {
                index: i,
                price: high,
                kind: SwingKind::High,
            });
        }

        let low = candles[i].low;
        if neighbours.into_iter().all(|j| low <= candles[j].low) {
            swings.push(SwingPoint {
                index: i,
                price: low,
                kind: SwingKind::Low,
            });
        }
    }
    swings
}

/// Collapse runs of same-kind swings to their most extreme member.
///
/// Tied highs keep the earliest, tied lows the latest.
fn enforce_alternation(raw: Vec<SwingPoint>) -> Vec<SwingPoint> {
    let mut out: Vec<SwingPoint> = Vec::with_capacity(raw.len());
    for swing in raw {
        match out.last_mut() {
            Some(last) if last.kind == swing.kind => {
                let more_extreme = match swing.kind {
                    SwingKind::High => swing.price > last.price,
                    SwingKind::Low => swing.price <= last.price,
                };
                if more_extreme {
                    *last = swing;
                }
            }
            _ => out.push(swing),
        }
    }
    out
}

/// Alternating swing points for the whole window.
pub fn find_swings(candles: &[Candle], strength: usize) -> Vec<SwingPoint> {
    enforce_alternation(raw_swings(candles, strength))
}

// ═══════════════════════════════════════════════════════════════════════════
// Classification
// ═══════════════════════════════════════════════════════════════════════════

/// UPTREND when the latest swing high and low are both strictly above the
/// prior ones, DOWNTREND when both strictly below, RANGE otherwise (including
/// when fewer than two of either kind exist).
pub fn classify_structure(swings: &[SwingPoint]) -> StructureState {
    let highs: Vec<&SwingPoint> = swings.iter().filter(|s| s.kind == SwingKind::High).collect();
    let lows: Vec<&SwingPoint> = swings.iter().filter(|s| s.kind == SwingKind::Low).collect();

    let last_swing_high = highs.last().map(|s| **s);
    let last_swing_low = lows.last().map(|s| **s);

    let label = match (highs.as_slice(), lows.as_slice()) {
        ([.., h1, h2], [.., l1, l2]) => {
            if h2.price > h1.price && l2.price > l1.price {
                StructureLabel::Uptrend
            } else if h2.price < h1.price && l2.price < l1.price {
                StructureLabel::Downtrend
            } else {
                StructureLabel::Range
            }
        }
        _ => StructureLabel::Range,
    };

    StructureState {
        label,
        last_swing_high,
        last_swing_low,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Current-bar events
// ═══════════════════════════════════════════════════════════════════════════

/// Liquidity sweep of the prior `lookback` bars' extreme by the newest bar.
///
/// Only a sweep in the direction of the trend counts: in an uptrend the low
/// must undercut the prior minimum by more than `sensitivity` (fraction of
/// that minimum) and close back above it.
pub fn detect_sweep(
    candles: &[Candle],
    label: StructureLabel,
    lookback: usize,
    sensitivity: Decimal,
) -> Option<SweepType> {
    let (current, history) = candles.split_last()?;
    if lookback == 0 || history.len() < lookback {
        return None;
    }
    let window = &history[history.len() - lookback..];

    match label {
        StructureLabel::Uptrend => {
            let prior_low = window.iter().map(|c| c.low).min()?;
            let threshold = prior_low * (Decimal::ONE - sensitivity);
            (current.low < threshold && current.close > prior_low)
                .then_some(SweepType::BullishSweep { level: prior_low })
        }
        StructureLabel::Downtrend => {
            let prior_high = window.iter().map(|c| c.high).max()?;
            let threshold = prior_high * (Decimal::ONE + sensitivity);
            (current.high > threshold && current.close < prior_high)
                .then_some(SweepType::BearishSweep { level: prior_high })
        }
        StructureLabel::Range => None,
    }
}

/// Break of the last swing extreme in the trend direction.
pub fn detect_bos(current: &Candle, structure: &StructureState) -> Option<BosType> {
    match structure.label {
        StructureLabel::Uptrend => structure
            .last_swing_high
            .filter(|h| current.high > h.price)
            .map(|_| BosType::BosUp),
        StructureLabel::Downtrend => structure
            .last_swing_low
            .filter(|l| current.low < l.price)
            .map(|_| BosType::BosDown),
        StructureLabel::Range => None,
    }
}

/// Momentum candle: body above `body_factor` and range above `range_factor`
/// times the average range of the preceding `window` bars.
pub fn detect_displacement(
    candles: &[Candle],
    window: usize,
    body_factor: Decimal,
    range_factor: Decimal,
) -> Option<DisplacementType> {
    let (current, history) = candles.split_last()?;
    if window == 0 || history.len() < window {
        return None;
    }
    let avg_range = history[history.len() - window..]
        .iter()
        .map(Candle::range)
        .sum::<Decimal>()
        / Decimal::from(window as u64);
    if avg_range <= Decimal::ZERO {
        return None;
    }

    let large = current.body() > avg_range * body_factor && current.range() > avg_range * range_factor;
    if !large {
        return None;
    }
    if current.is_bullish() {
        Some(DisplacementType::Bullish)
    } else if current.is_bearish() {
        Some(DisplacementType::Bearish)
    } else {
        None
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Analyzer
// ═══════════════════════════════════════════════════════════════════════════

/// Everything the structure layer knows about one window.
#[derive(Debug, Clone, PartialEq)]
pub struct StructureReport {
    pub structure: StructureState,
    /// Swing indices are relative to the full candle slice.
    pub swings: Vec<SwingPoint>,
    pub sweep: Option<SweepType>,
    pub bos: Option<BosType>,
    pub displacement: Option<DisplacementType>,
}

#[derive(Debug, Clone)]
pub struct MarketStructureAnalyzer {
    config: StructureConfig,
}

impl MarketStructureAnalyzer {
    pub fn new(config: StructureConfig) -> Self {
        Self { config }
    }

    pub fn analyze(&self, candles: &[Candle]) -> StructureReport {
        let cfg = &self.config;
        let offset = candles.len().saturating_sub(cfg.structure_window);

        let swings: Vec<SwingPoint> = find_swings(&candles[offset..], cfg.swing_strength)
            .into_iter()
            .map(|s| SwingPoint {
                index: s.index + offset,
                ..s
            })
            .collect();
        let structure = classify_structure(&swings);

        let sweep = detect_sweep(
            candles,
            structure.label,
            cfg.sweep_lookback,
            cfg.sweep_sensitivity,
        );
        let bos = candles.last().and_then(|c| detect_bos(c, &structure));
        let displacement = detect_displacement(
            candles,
            cfg.displacement_window,
            cfg.displacement_body_factor,
            cfg.displacement_range_factor,
        );

        StructureReport {
            structure,
            swings,
            sweep,
            bos,
            displacement,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn point(price: Decimal) -> Candle {
        Candle {
            timestamp: 0,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: dec!(1),
        }
    }

    fn series(prices: &[i64]) -> Vec<Candle> {
        prices.iter().map(|&p| point(Decimal::from(p))).collect()
    }

    fn ohlc(open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Candle {
        Candle {
            timestamp: 0,
            open,
            high,
            low,
            close,
            volume: dec!(1),
        }
    }

    fn swing(index: usize, price: i64, kind: SwingKind) -> SwingPoint {
        SwingPoint {
            index,
            price: Decimal::from(price),
            kind,
        }
    }

    // -- swings ----------------------------------------------------------------

    #[test]
    fn test_find_swings_zigzag() {
        //            0  1  2  3  4  5  6  7  8
        let c = series(&[1, 3, 2, 1, 4, 2, 0, 5, 6]);
        let swings = find_swings(&c, 1);
        assert_eq!(
            swings,
            vec![
                swing(1, 3, SwingKind::High),
                swing(3, 1, SwingKind::Low),
                swing(4, 4, SwingKind::High),
                swing(6, 0, SwingKind::Low),
            ]
        );
    }

    #[test]
    fn test_newest_bar_never_a_swing() {
        let c = series(&[5, 4, 3, 2, 1]);
        let swings = find_swings(&c, 1);
        assert!(swings.iter().all(|s| s.index < 4));
    }

    #[test]
    fn test_alternation_keeps_most_extreme() {
        let raw = vec![
            swing(1, 10, SwingKind::High),
            swing(3, 12, SwingKind::High),
            swing(5, 11, SwingKind::High),
            swing(7, 4, SwingKind::Low),
            swing(9, 3, SwingKind::Low),
        ];
        let out = enforce_alternation(raw);
        assert_eq!(
            out,
            vec![swing(3, 12, SwingKind::High), swing(9, 3, SwingKind::Low)]
        );
    }

    #[test]
    fn test_alternation_ties() {
        let raw = vec![
            swing(1, 5, SwingKind::High),
            swing(2, 5, SwingKind::High),
            swing(4, 1, SwingKind::Low),
            swing(6, 1, SwingKind::Low),
        ];
        assert_eq!(
            enforce_alternation(raw),
            vec![swing(1, 5, SwingKind::High), swing(6, 1, SwingKind::Low)]
        );
    }

    #[test]
    fn test_tied_swings_swap_under_reverse_and_negate() {
        let prices = [0, 3, 3, 0, 1, 0];
        let forward = find_swings(&series(&prices), 1);
        assert_eq!(
            forward,
            vec![
                swing(1, 3, SwingKind::High),
                swing(3, 0, SwingKind::Low),
                swing(4, 1, SwingKind::High),
            ]
        );

        let mirrored: Vec<i64> = prices.iter().rev().map(|p| -p).collect();
        assert_eq!(
            find_swings(&series(&mirrored), 1),
            vec![
                swing(1, -1, SwingKind::Low),
                swing(2, 0, SwingKind::High),
                swing(4, -3, SwingKind::Low),
            ]
        );
    }

    #[test]
    fn test_find_swings_short_input() {
        assert!(find_swings(&series(&[1, 2]), 3).is_empty());
        assert!(find_swings(&series(&[1, 2, 3]), 0).is_empty());
    }

    // -- classification --------------------------------------------------------

    #[test]
    fn test_classify_uptrend() {
        let swings = vec![
            swing(1, 10, SwingKind::High),
            swing(2, 5, SwingKind::Low),
            swing(3, 12, SwingKind::High),
            swing(4, 7, SwingKind::Low),
        ];
        let state = classify_structure(&swings);
        assert_eq!(state.label, StructureLabel::Uptrend);
        assert_eq!(state.last_swing_high.map(|s| s.price), Some(dec!(12)));
        assert_eq!(state.last_swing_low.map(|s| s.price), Some(dec!(7)));
    }

    #[test]
    fn test_classify_downtrend() {
        let swings = vec![
            swing(1, 12, SwingKind::High),
            swing(2, 7, SwingKind::Low),
            swing(3, 10, SwingKind::High),
            swing(4, 5, SwingKind::Low),
        ];
        assert_eq!(classify_structure(&swings).label, StructureLabel::Downtrend);
    }

    #[test]
    fn test_classify_mixed_is_range() {
        // Higher high, lower low: expansion, not a trend.
        let swings = vec![
            swing(1, 10, SwingKind::High),
            swing(2, 5, SwingKind::Low),
            swing(3, 12, SwingKind::High),
            swing(4, 4, SwingKind::Low),
        ];
        assert_eq!(classify_structure(&swings).label, StructureLabel::Range);
    }

    #[test]
    fn test_classify_equal_is_range() {
        let swings = vec![
            swing(1, 10, SwingKind::High),
            swing(2, 5, SwingKind::Low),
            swing(3, 10, SwingKind::High),
            swing(4, 6, SwingKind::Low),
        ];
        assert_eq!(classify_structure(&swings).label, StructureLabel::Range);
    }

    #[test]
    fn test_classify_too_few_swings() {
        let swings = vec![swing(1, 10, SwingKind::High), swing(2, 5, SwingKind::Low)];
        let state = classify_structure(&swings);
        assert_eq!(state.label, StructureLabel::Range);
        assert!(state.last_swing_high.is_some());
    }

    // -- sweep -----------------------------------------------------------------

    fn flat_history(n: usize, low: Decimal, high: Decimal) -> Vec<Candle> {
        (0..n)
            .map(|_| ohlc(low + dec!(0.5), high, low, low + dec!(0.5)))
            .collect()
    }

    #[test]
    fn test_bullish_sweep_detected() {
        let mut c = flat_history(20, dec!(100), dec!(102));
        // Undercut 100 by 0.5% and close back above.
        c.push(ohlc(dec!(100.5), dec!(101), dec!(99.5), dec!(100.8)));
        let sweep = detect_sweep(&c, StructureLabel::Uptrend, 20, dec!(0.002));
        assert_eq!(sweep, Some(SweepType::BullishSweep { level: dec!(100) }));
    }

    #[test]
    fn test_sweep_needs_recovery_close() {
        let mut c = flat_history(20, dec!(100), dec!(102));
        c.push(ohlc(dec!(100.5), dec!(101), dec!(99.5), dec!(99.7)));
        assert_eq!(detect_sweep(&c, StructureLabel::Uptrend, 20, dec!(0.002)), None);
    }

    #[test]
    fn test_sweep_needs_sensitivity_breach() {
        let mut c = flat_history(20, dec!(100), dec!(102));
        // 0.1% undercut, below the 0.2% threshold.
        c.push(ohlc(dec!(100.5), dec!(101), dec!(99.9), dec!(100.8)));
        assert_eq!(detect_sweep(&c, StructureLabel::Uptrend, 20, dec!(0.002)), None);
    }

    #[test]
    fn test_bearish_sweep_detected() {
        let mut c = flat_history(20, dec!(100), dec!(102));
        c.push(ohlc(dec!(101.5), dec!(102.6), dec!(101), dec!(101.2)));
        let sweep = detect_sweep(&c, StructureLabel::Downtrend, 20, dec!(0.002));
        assert_eq!(sweep, Some(SweepType::BearishSweep { level: dec!(102) }));
    }

    #[test]
    fn test_sweep_ignored_in_range() {
        let mut c = flat_history(20, dec!(100), dec!(102));
        c.push(ohlc(dec!(100.5), dec!(101), dec!(99.5), dec!(100.8)));
        assert_eq!(detect_sweep(&c, StructureLabel::Range, 20, dec!(0.002)), None);
    }

    // -- BOS -------------------------------------------------------------------

    #[test]
    fn test_bos_up_and_down() {
        let up = StructureState {
            label: StructureLabel::Uptrend,
            last_swing_high: Some(swing(5, 110, SwingKind::High)),
            last_swing_low: Some(swing(7, 100, SwingKind::Low)),
        };
        let bar = ohlc(dec!(108), dec!(111), dec!(107), dec!(110.5));
        assert_eq!(detect_bos(&bar, &up), Some(BosType::BosUp));
        let bar = ohlc(dec!(108), dec!(110), dec!(107), dec!(109));
        assert_eq!(detect_bos(&bar, &up), None);

        let down = StructureState {
            label: StructureLabel::Downtrend,
            ..up
        };
        let bar = ohlc(dec!(101), dec!(102), dec!(99), dec!(99.5));
        assert_eq!(detect_bos(&bar, &down), Some(BosType::BosDown));
    }

    // -- displacement ----------------------------------------------------------

    #[test]
    fn test_displacement_bullish() {
        // Average range 2.
        let mut c = flat_history(20, dec!(100), dec!(102));
        // Body 2.5 > 1.4, range 3 > 2.4.
        c.push(ohlc(dec!(100.2), dec!(103), dec!(100), dec!(102.7)));
        assert_eq!(
            detect_displacement(&c, 20, dec!(0.7), dec!(1.2)),
            Some(DisplacementType::Bullish)
        );
    }

    #[test]
    fn test_displacement_bearish() {
        let mut c = flat_history(20, dec!(100), dec!(102));
        c.push(ohlc(dec!(102.7), dec!(103), dec!(100), dec!(100.2)));
        assert_eq!(
            detect_displacement(&c, 20, dec!(0.7), dec!(1.2)),
            Some(DisplacementType::Bearish)
        );
    }

    #[test]
    fn test_displacement_small_body_rejected() {
        let mut c = flat_history(20, dec!(100), dec!(102));
        // Long wicks, tiny body.
        c.push(ohlc(dec!(101.4), dec!(103), dec!(100), dec!(101.6)));
        assert_eq!(detect_displacement(&c, 20, dec!(0.7), dec!(1.2)), None);
    }

    // -- analyzer --------------------------------------------------------------

    #[test]
    fn test_analyzer_offsets_swing_indices() {
        let prices: Vec<i64> = (0..60).map(|i| if i % 4 == 1 { 10 + i } else { i }).collect();
        let candles = series(&prices);
        let analyzer = MarketStructureAnalyzer::new(StructureConfig {
            swing_strength: 1,
            structure_window: 20,
            ..StructureConfig::default()
        });
        let report = analyzer.analyze(&candles);
        assert!(report.swings.iter().all(|s| s.index >= 40));
    }
}
