//! Trend-strength and bias indicators.
//!
//! No I/O, no side effects. Directional movement and true range are smoothed
//! with Wilder's method; +DI/-DI divide by the smoothed true range (guarded
//! against zero), and ADX is the Wilder average of DX. The moving-average
//! bias compares a fast and a slow simple moving average of closes.
//!
//! Optional entry filters carried over from the classic crossover bot live
//! here as well: RSI mean reversion and minimum-volume confirmation.
//!
//! References:
//!     Wilder (1978), "New Concepts in Technical Trading Systems".

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::config::{FilterConfig, TrendConfig};
use crate::types::{Candle, PositionDirection, TrendReading};

use super::volatility::{safe_divisor, true_ranges};

// ═══════════════════════════════════════════════════════════════════════════
// Moving averages
// ═══════════════════════════════════════════════════════════════════════════

/// Simple moving average of the last `period` values.
///
/// Returns `Decimal::ZERO` if insufficient data.
pub fn sma(values: &[Decimal], period: usize) -> Decimal {
    if period == 0 || values.len() < period {
        return Decimal::ZERO;
    }
    values[values.len() - period..].iter().copied().sum::<Decimal>()
        / Decimal::from(period as u64)
}

/// Wilder running average: seeded with the mean of the first `period`
/// values, then `avg = (avg × (period-1) + x) / period`.
///
/// Element `k` of the result covers `values[..period + k]`. Empty if
/// insufficient data.
fn wilder_average(values: &[Decimal], period: usize) -> Vec<Decimal> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }
    let period_d = Decimal::from(period as u64);
    let period_m1 = Decimal::from(period as u64 - 1);

    let mut avg = values[..period].iter().copied().sum::<Decimal>() / period_d;
    let mut out = Vec::with_capacity(values.len() - period + 1);
    out.push(avg);
    for &v in &values[period..] {
        avg = (avg * period_m1 + v) / period_d;
        out.push(avg);
    }
    out
}

// ═══════════════════════════════════════════════════════════════════════════
// Directional movement
// ═══════════════════════════════════════════════════════════════════════════

/// `(adx, plus_di, minus_di)` for the latest bar.
///
/// Needs at least `2 × period + 1` candles; returns zeros otherwise.
pub fn adx(candles: &[Candle], period: usize) -> (Decimal, Decimal, Decimal) {
    let zero = (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO);
    if period == 0 || candles.len() < 2 * period + 1 {
        return zero;
    }

    let mut plus_dm = Vec::with_capacity(candles.len() - 1);
    let mut minus_dm = Vec::with_capacity(candles.len() - 1);
    for w in candles.windows(2) {
        let up = w[1].high - w[0].high;
        let down = w[0].low - w[1].low;
        plus_dm.push(if up > down && up > Decimal::ZERO { up } else { Decimal::ZERO });
        minus_dm.push(if down > up && down > Decimal::ZERO { down } else { Decimal::ZERO });
    }
    let trs = true_ranges(candles);

    let s_tr = wilder_average(&trs, period);
    let s_plus = wilder_average(&plus_dm, period);
    let s_minus = wilder_average(&minus_dm, period);

    let hundred = dec!(100);
    let mut dx = Vec::with_capacity(s_tr.len());
    let mut last_di = (Decimal::ZERO, Decimal::ZERO);
    for ((tr, p), m) in s_tr.iter().zip(&s_plus).zip(&s_minus) {
        let atr = safe_divisor(*tr);
        let plus_di = hundred * p / atr;
        let minus_di = hundred * m / atr;
        let di_sum = plus_di + minus_di;
        dx.push(if di_sum > Decimal::ZERO {
            hundred * (plus_di - minus_di).abs() / di_sum
        } else {
            Decimal::ZERO
        });
        last_di = (plus_di, minus_di);
    }

    let adx_series = wilder_average(&dx, period);
    match adx_series.last() {
        Some(adx) => (*adx, last_di.0, last_di.1),
        None => zero,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Optional filters
// ═══════════════════════════════════════════════════════════════════════════

/// Relative Strength Index (Wilder's smoothing).
///
/// Returns 50 if insufficient data, 100 when there were no losses.
pub fn rsi(prices: &[Decimal], period: usize) -> Decimal {
    if period == 0 || prices.len() < period + 1 {
        return dec!(50);
    }

    let changes: Vec<Decimal> = prices.windows(2).map(|w| w[1] - w[0]).collect();
    let gains: Vec<Decimal> = changes.iter().map(|&c| c.max(Decimal::ZERO)).collect();
    let losses: Vec<Decimal> = changes.iter().map(|&c| (-c).max(Decimal::ZERO)).collect();

    let avg_gain = wilder_average(&gains, period).last().copied().unwrap_or(Decimal::ZERO);
    let avg_loss = wilder_average(&losses, period).last().copied().unwrap_or(Decimal::ZERO);

    if avg_loss == Decimal::ZERO {
        return dec!(100);
    }
    let rs = avg_gain / avg_loss;
    dec!(100) - (dec!(100) / (Decimal::ONE + rs))
}

/// RSI gate: buy only when oversold, sell only when overbought.
pub fn rsi_allows(rsi_value: Decimal, direction: PositionDirection, filters: &FilterConfig) -> bool {
    match direction {
        PositionDirection::Long => rsi_value < filters.rsi_oversold,
        PositionDirection::Short => rsi_value > filters.rsi_overbought,
    }
}

/// Volume gate: the current bar must clear `min_volume` and 80% of the
/// 20-bar average volume.
pub fn volume_allows(candles: &[Candle], min_volume: Decimal) -> bool {
    let Some(current) = candles.last().map(|c| c.volume) else {
        return false;
    };
    let volumes: Vec<Decimal> = candles.iter().map(|c| c.volume).collect();
    let avg = sma(&volumes, 20_usize.min(volumes.len()));
    current >= min_volume && current >= avg * dec!(0.8)
}

// ═══════════════════════════════════════════════════════════════════════════
// Trend filter
// ═══════════════════════════════════════════════════════════════════════════

/// ADX/DI strength plus moving-average bias for one candle window.
#[derive(Debug, Clone)]
pub struct TrendFilter {
    config: TrendConfig,
}

impl TrendFilter {
    pub fn new(config: TrendConfig) -> Self {
        Self { config }
    }

    pub fn evaluate(&self, candles: &[Candle]) -> TrendReading {
        let (adx, plus_di, minus_di) = adx(candles, self.config.adx_period);
        let closes: Vec<Decimal> = candles.iter().map(|c| c.close).collect();

        TrendReading {
            adx,
            plus_di,
            minus_di,
            strong_trend: adx > self.config.adx_minimum,
            fast_ma: sma(&closes, self.config.fast_ma),
            slow_ma: sma(&closes, self.config.slow_ma),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn bar(high: Decimal, low: Decimal, close: Decimal) -> Candle {
        Candle {
            timestamp: 0,
            open: close,
            high,
            low,
            close,
            volume: dec!(1000),
        }
    }

    /// Steadily rising bars: each high and low one unit above the last.
    fn rising(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let base = Decimal::from(100 + i as i64);
                bar(base + dec!(1), base - dec!(1), base + dec!(0.5))
            })
            .collect()
    }

    fn falling(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let base = Decimal::from(500 - i as i64);
                bar(base + dec!(1), base - dec!(1), base - dec!(0.5))
            })
            .collect()
    }

    // -- SMA -----------------------------------------------------------------

    #[test]
    fn test_sma_basic() {
        let values: Vec<Decimal> = (1..=10).map(Decimal::from).collect();
        assert_eq!(sma(&values, 4), d("8.5"));
        assert_eq!(sma(&values, 11), Decimal::ZERO);
    }

    // -- ADX -----------------------------------------------------------------

    #[test]
    fn test_adx_rising_series_plus_di_dominates() {
        let (adx_val, plus_di, minus_di) = adx(&rising(60), 14);
        assert!(plus_di > minus_di);
        assert_eq!(minus_di, Decimal::ZERO);
        assert!(adx_val > dec!(25), "adx = {adx_val}");
        assert!(adx_val <= dec!(100));
    }

    #[test]
    fn test_adx_falling_series_minus_di_dominates() {
        let (adx_val, plus_di, minus_di) = adx(&falling(60), 14);
        assert!(minus_di > plus_di);
        assert!(adx_val > dec!(25));
    }

    #[test]
    fn test_adx_insufficient_data() {
        assert_eq!(
            adx(&rising(20), 14),
            (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO)
        );
    }

    #[test]
    fn test_adx_flat_series_zero_range_guarded() {
        let flat: Vec<Candle> = (0..40).map(|_| bar(dec!(1), dec!(1), dec!(1))).collect();
        let (adx_val, plus_di, minus_di) = adx(&flat, 14);
        assert_eq!(adx_val, Decimal::ZERO);
        assert_eq!(plus_di, Decimal::ZERO);
        assert_eq!(minus_di, Decimal::ZERO);
    }

    // -- RSI -----------------------------------------------------------------

    #[test]
    fn test_rsi_all_gains() {
        let prices: Vec<Decimal> = (1..=20).map(Decimal::from).collect();
        assert_eq!(rsi(&prices, 14), dec!(100));
    }

    #[test]
    fn test_rsi_all_losses() {
        let prices: Vec<Decimal> = (1..=20).rev().map(Decimal::from).collect();
        assert_eq!(rsi(&prices, 14), Decimal::ZERO);
    }

    #[test]
    fn test_rsi_insufficient_data() {
        assert_eq!(rsi(&[dec!(1), dec!(2)], 14), dec!(50));
    }

    #[test]
    fn test_rsi_gate() {
        let filters = FilterConfig::default();
        assert!(rsi_allows(dec!(25), PositionDirection::Long, &filters));
        assert!(!rsi_allows(dec!(50), PositionDirection::Long, &filters));
        assert!(!rsi_allows(dec!(30), PositionDirection::Long, &filters));
        assert!(rsi_allows(dec!(75), PositionDirection::Short, &filters));
        assert!(!rsi_allows(dec!(50), PositionDirection::Short, &filters));
        assert!(!rsi_allows(dec!(70), PositionDirection::Short, &filters));
    }

    // -- Volume --------------------------------------------------------------

    #[test]
    fn test_volume_gate() {
        let mut candles = rising(25);
        assert!(volume_allows(&candles, dec!(500)));
        assert!(!volume_allows(&candles, dec!(5000)));

        // Current bar far below its 20-bar average.
        if let Some(last) = candles.last_mut() {
            last.volume = dec!(100);
        }
        assert!(!volume_allows(&candles, dec!(50)));
        assert!(!volume_allows(&[], dec!(0)));
    }

    // -- TrendFilter ---------------------------------------------------------

    #[test]
    fn test_trend_filter_bias_and_strength() {
        let filter = TrendFilter::new(TrendConfig {
            fast_ma: 10,
            slow_ma: 30,
            ..TrendConfig::default()
        });
        let reading = filter.evaluate(&rising(80));
        assert!(reading.strong_trend);
        assert_eq!(reading.ma_bias(), Some(PositionDirection::Long));
        assert!(reading.confirms(PositionDirection::Long));

        let reading = filter.evaluate(&falling(80));
        assert_eq!(reading.ma_bias(), Some(PositionDirection::Short));
        assert!(reading.confirms(PositionDirection::Short));
    }
}
