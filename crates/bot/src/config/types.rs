use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

use crate::types::timeframe::Timeframe;

// ---------------------------------------------------------------------------
// Top-level aggregate
// ---------------------------------------------------------------------------

/// Strongly-typed bot configuration, constructed once at startup and passed
/// by reference to each component.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BotConfig {
    pub app: AppConfig,
    pub trading: TradingConfig,
    pub signals: SignalConfig,
    pub risk: RiskConfig,
}

// ---------------------------------------------------------------------------
// app.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    /// Where final statistics and trade history are written on shutdown.
    pub stats_path: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            stats_path: Some("data/performance.json".into()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_dir: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: "logs".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// trading.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    pub instruments: Vec<InstrumentConfig>,
    pub timeframe: Timeframe,
    /// Bars requested per cycle.
    pub bars: usize,
    pub check_interval_seconds: u64,
    /// Magic number stamped on every order; positions without it are ignored.
    pub tag: u64,
    pub paper: PaperConfig,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            instruments: vec![InstrumentConfig::new("EURUSD")],
            timeframe: Timeframe::H1,
            bars: 300,
            check_interval_seconds: 300,
            tag: 234_000,
            paper: PaperConfig::default(),
        }
    }
}

/// Contract specification for one tradable instrument.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    pub symbol: String,
    /// Overrides the naming-convention pip size.
    #[serde(with = "rust_decimal::serde::str_option")]
    pub pip_size: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str")]
    pub contract_size: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub tick_value: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub min_lot: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub max_lot: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub lot_step: Decimal,
}

impl InstrumentConfig {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            ..Self::default()
        }
    }
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            symbol: String::new(),
            pip_size: None,
            contract_size: dec!(100000),
            tick_value: dec!(1),
            min_lot: dec!(0.01),
            max_lot: dec!(10),
            lot_step: dec!(0.01),
        }
    }
}

/// In-process simulated venue used by the binary.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaperConfig {
    /// Directory holding `<SYMBOL>.json` candle files.
    pub data_dir: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub starting_balance: Decimal,
    /// Simulated spread in pips applied around the last close.
    #[serde(with = "rust_decimal::serde::str")]
    pub spread_pips: Decimal,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".into(),
            starting_balance: dec!(10000),
            spread_pips: dec!(1),
        }
    }
}

// ---------------------------------------------------------------------------
// signals.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub structure: StructureConfig,
    pub trend: TrendConfig,
    pub scoring: ScoringConfig,
    pub sessions: SessionsConfig,
    pub filters: FilterConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StructureConfig {
    /// Bars on each side a swing extreme must dominate.
    pub swing_strength: usize,
    /// Trailing window scanned for swing points.
    pub structure_window: usize,
    pub sweep_lookback: usize,
    /// Fraction of the swept level the wick must exceed it by.
    #[serde(with = "rust_decimal::serde::str")]
    pub sweep_sensitivity: Decimal,
    pub displacement_window: usize,
    #[serde(with = "rust_decimal::serde::str")]
    pub displacement_body_factor: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub displacement_range_factor: Decimal,
}

impl Default for StructureConfig {
    fn default() -> Self {
        Self {
            swing_strength: 3,
            structure_window: 100,
            sweep_lookback: 20,
            sweep_sensitivity: dec!(0.0002),
            displacement_window: 20,
            displacement_body_factor: dec!(0.7),
            displacement_range_factor: dec!(1.2),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    pub atr_period: usize,
    pub adx_period: usize,
    #[serde(with = "rust_decimal::serde::str")]
    pub adx_minimum: Decimal,
    pub fast_ma: usize,
    pub slow_ma: usize,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            atr_period: 14,
            adx_period: 14,
            adx_minimum: dec!(25),
            fast_ma: 50,
            slow_ma: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub min_confidence: u8,
    pub require_bos: bool,
    pub require_displacement: bool,
    /// Candidates are forced to HOLD when spread > multiplier × ATR.
    #[serde(with = "rust_decimal::serde::str")]
    pub max_spread_multiplier: Decimal,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            min_confidence: 6,
            require_bos: true,
            require_displacement: false,
            max_spread_multiplier: dec!(0.5),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    pub windows: Vec<SessionWindow>,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            windows: vec![
                SessionWindow {
                    name: "london".into(),
                    start_hour: 7,
                    end_hour: 16,
                },
                SessionWindow {
                    name: "new_york".into(),
                    start_hour: 12,
                    end_hour: 21,
                },
            ],
        }
    }
}

/// UTC hour window `[start_hour, end_hour)`; wraps midnight when start > end.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionWindow {
    pub name: String,
    pub start_hour: u32,
    pub end_hour: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub use_rsi_filter: bool,
    pub rsi_period: usize,
    #[serde(with = "rust_decimal::serde::str")]
    pub rsi_overbought: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub rsi_oversold: Decimal,
    pub use_volume_filter: bool,
    #[serde(with = "rust_decimal::serde::str")]
    pub min_volume: Decimal,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            use_rsi_filter: false,
            rsi_period: 14,
            rsi_overbought: dec!(70),
            rsi_oversold: dec!(30),
            use_volume_filter: false,
            min_volume: dec!(1000),
        }
    }
}

// ---------------------------------------------------------------------------
// risk.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub base_risk: ClassRiskConfig,
    /// Cap on the scaled risk percentage.
    #[serde(with = "rust_decimal::serde::str")]
    pub max_risk_per_trade: Decimal,
    pub confidence_scaling: bool,
    #[serde(with = "rust_decimal::serde::str")]
    pub atr_stop_multiplier: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub atr_tp_multiplier: Decimal,
    pub trailing: TrailingConfig,
    pub cooldown_seconds: u64,
    /// Percent of the start-of-day balance.
    #[serde(with = "rust_decimal::serde::str")]
    pub daily_loss_limit_pct: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            base_risk: ClassRiskConfig::default(),
            max_risk_per_trade: dec!(2.0),
            confidence_scaling: true,
            atr_stop_multiplier: dec!(2.0),
            atr_tp_multiplier: dec!(3.0),
            trailing: TrailingConfig::default(),
            cooldown_seconds: 300,
            daily_loss_limit_pct: dec!(5.0),
        }
    }
}

/// Base risk percentage per instrument class.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassRiskConfig {
    #[serde(with = "rust_decimal::serde::str")]
    pub forex: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub jpy_forex: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub metal: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub crypto: Decimal,
}

impl Default for ClassRiskConfig {
    fn default() -> Self {
        Self {
            forex: dec!(1.0),
            jpy_forex: dec!(1.0),
            metal: dec!(0.75),
            crypto: dec!(0.5),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrailingConfig {
    pub enabled: bool,
    #[serde(with = "rust_decimal::serde::str")]
    pub activation_pips: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub trail_distance_pips: Decimal,
    /// Trail at ATR × multiplier instead of a fixed pip distance.
    pub atr_trailing: bool,
    #[serde(with = "rust_decimal::serde::str")]
    pub atr_trailing_multiplier: Decimal,
}

impl Default for TrailingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            activation_pips: dec!(20),
            trail_distance_pips: dec!(15),
            atr_trailing: false,
            atr_trailing_multiplier: dec!(1.5),
        }
    }
}
