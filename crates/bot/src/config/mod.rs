pub mod types;
pub mod validate;

pub use types::*;

use anyhow::Result;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

use crate::errors::BotError;
use crate::types::timeframe::Timeframe;

/// Load all config JSON files into a single [`BotConfig`], then apply
/// environment variable overrides, reset out-of-range values to their
/// defaults, and validate what remains.
///
/// Expected directory layout:
/// ```text
/// config/
///   app.json
///   trading.json
///   signals.json
///   risk.json
/// ```
///
/// A file that is missing or fails to parse is reported as
/// [`BotError::ConfigInvalid`] and that whole section falls back to its
/// documented defaults.
///
/// # Environment variable overrides
///
/// | Env Var                 | Config Field                          |
/// |-------------------------|---------------------------------------|
/// | `BOT_SYMBOLS`           | `trading.instruments` (comma list)    |
/// | `BOT_TIMEFRAME`         | `trading.timeframe`                   |
/// | `BOT_CHECK_INTERVAL`    | `trading.check_interval_seconds`      |
/// | `BOT_MIN_CONFIDENCE`    | `signals.scoring.min_confidence`      |
/// | `BOT_RISK_PERCENT`      | `risk.base_risk.*`                    |
/// | `BOT_DAILY_LOSS_LIMIT`  | `risk.daily_loss_limit_pct`           |
/// | `BOT_LOG_DIR`           | `app.logging.log_dir`                 |
pub fn load_config(config_dir: &Path) -> Result<BotConfig> {
    let mut config = BotConfig {
        app: read_section(config_dir, "app.json"),
        trading: read_section(config_dir, "trading.json"),
        signals: read_section(config_dir, "signals.json"),
        risk: read_section(config_dir, "risk.json"),
    };

    apply_env_overrides(&mut config);

    for issue in validate::sanitize_config(&mut config) {
        warn!(error = %issue, "config value out of range, using default");
    }
    validate::validate_config(&config)?;

    Ok(config)
}

/// Parse one section file, falling back to `T::default()` on any failure.
fn read_section<T: DeserializeOwned + Default>(config_dir: &Path, name: &str) -> T {
    match parse_section(config_dir, name) {
        Ok(section) => section,
        Err(e) => {
            warn!(file = name, error = %e, "config section unusable, using defaults");
            T::default()
        }
    }
}

fn parse_section<T: DeserializeOwned>(config_dir: &Path, name: &str) -> Result<T, BotError> {
    let path = config_dir.join(name);
    let contents = std::fs::read_to_string(&path).map_err(|e| BotError::ConfigInvalid {
        field: name.to_string(),
        reason: format!("failed to read {}: {e}", path.display()),
    })?;
    serde_json::from_str(&contents).map_err(|e| BotError::ConfigInvalid {
        field: name.to_string(),
        reason: format!("failed to parse: {e}"),
    })
}

// ---------------------------------------------------------------------------
// Environment variable overrides
// ---------------------------------------------------------------------------

/// Apply environment variable overrides to the loaded config.
///
/// Only non-empty env vars take effect. Parse failures are logged and skipped
/// (the JSON value remains).
fn apply_env_overrides(config: &mut BotConfig) {
    // -- Trading -------------------------------------------------------------
    if let Some(val) = env_string("BOT_SYMBOLS") {
        let symbols: Vec<String> = val
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        info!(symbols = ?symbols, "env override: BOT_SYMBOLS");
        // Keep contract specs for symbols already configured.
        let existing = std::mem::take(&mut config.trading.instruments);
        config.trading.instruments = symbols
            .iter()
            .map(|sym| {
                existing
                    .iter()
                    .find(|i| i.symbol.eq_ignore_ascii_case(sym))
                    .cloned()
                    .unwrap_or_else(|| InstrumentConfig::new(sym))
            })
            .collect();
    }

    if let Some(val) = env_string("BOT_TIMEFRAME") {
        match Timeframe::parse(&val) {
            Some(tf) => {
                info!(timeframe = %tf, "env override: BOT_TIMEFRAME");
                config.trading.timeframe = tf;
            }
            None => warn!(value = %val, "ignoring unparseable BOT_TIMEFRAME"),
        }
    }

    if let Some(val) = env_parse::<u64>("BOT_CHECK_INTERVAL") {
        info!(val, "env override: BOT_CHECK_INTERVAL");
        config.trading.check_interval_seconds = val;
    }

    // -- Signals -------------------------------------------------------------
    if let Some(val) = env_parse::<u8>("BOT_MIN_CONFIDENCE") {
        info!(val, "env override: BOT_MIN_CONFIDENCE");
        config.signals.scoring.min_confidence = val;
    }

    // -- Risk ----------------------------------------------------------------
    if let Some(val) = env_decimal("BOT_RISK_PERCENT") {
        info!(%val, "env override: BOT_RISK_PERCENT");
        let base = &mut config.risk.base_risk;
        base.forex = val;
        base.jpy_forex = val;
        base.metal = val;
        base.crypto = val;
    }

    if let Some(val) = env_decimal("BOT_DAILY_LOSS_LIMIT") {
        info!(%val, "env override: BOT_DAILY_LOSS_LIMIT");
        config.risk.daily_loss_limit_pct = val;
    }

    // -- Logging -------------------------------------------------------------
    if let Some(val) = env_string("BOT_LOG_DIR") {
        info!("env override: BOT_LOG_DIR");
        config.app.logging.log_dir = val;
    }
}

/// Read a non-empty env var as a `String`.
fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Read a non-empty env var and parse it as `T`.
fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.trim().parse().ok())
}

/// Read a non-empty env var and parse it as `Decimal`.
fn env_decimal(key: &str) -> Option<Decimal> {
    env_string(key).and_then(|v| Decimal::from_str(v.trim()).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serial_test::serial;
    use std::path::PathBuf;

    const ENV_KEYS: [&str; 7] = [
        "BOT_SYMBOLS",
        "BOT_TIMEFRAME",
        "BOT_CHECK_INTERVAL",
        "BOT_MIN_CONFIDENCE",
        "BOT_RISK_PERCENT",
        "BOT_DAILY_LOSS_LIMIT",
        "BOT_LOG_DIR",
    ];

    fn clear_env() {
        for key in ENV_KEYS {
            std::env::remove_var(key);
        }
    }

    fn project_config_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("config")
    }

    // -----------------------------------------------------------------------
    // Helper: write a minimal set of config JSON files to a temp dir.
    // -----------------------------------------------------------------------

    fn write_test_configs(dir: &Path) {
        std::fs::write(
            dir.join("app.json"),
            r#"{ "logging": { "log_dir": "test-logs" }, "stats_path": null }"#,
        )
        .unwrap();

        std::fs::write(
            dir.join("trading.json"),
            r#"{
                "instruments": [
                    { "symbol": "EURUSD" },
                    { "symbol": "XAUUSD", "contract_size": "100", "tick_value": "1", "pip_size": "0.1" }
                ],
                "timeframe": "M15",
                "bars": 400,
                "check_interval_seconds": 60,
                "tag": 99
            }"#,
        )
        .unwrap();

        std::fs::write(
            dir.join("signals.json"),
            r#"{
                "structure": { "swing_strength": 2, "sweep_sensitivity": "0.0005" },
                "scoring": { "min_confidence": 7, "require_bos": false, "require_displacement": true, "max_spread_multiplier": "0.3" },
                "sessions": { "windows": [ { "name": "tokyo", "start_hour": 0, "end_hour": 9 } ] }
            }"#,
        )
        .unwrap();

        std::fs::write(
            dir.join("risk.json"),
            r#"{
                "max_risk_per_trade": "1.5",
                "cooldown_seconds": 600,
                "daily_loss_limit_pct": "3.0",
                "trailing": { "activation_pips": "30", "trail_distance_pips": "10" }
            }"#,
        )
        .unwrap();
    }

    #[test]
    #[serial]
    fn test_load_full_config() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        write_test_configs(dir.path());

        let config = load_config(dir.path()).unwrap();
        assert_eq!(config.app.logging.log_dir, "test-logs");
        assert!(config.app.stats_path.is_none());
        assert_eq!(config.trading.instruments.len(), 2);
        assert_eq!(config.trading.instruments[1].pip_size, Some(dec!(0.1)));
        assert_eq!(config.trading.instruments[0].contract_size, dec!(100000));
        assert_eq!(config.trading.timeframe, Timeframe::M15);
        assert_eq!(config.trading.tag, 99);
        assert_eq!(config.signals.structure.swing_strength, 2);
        // Unspecified fields keep their defaults.
        assert_eq!(config.signals.structure.sweep_lookback, 20);
        assert_eq!(config.signals.scoring.min_confidence, 7);
        assert!(config.signals.scoring.require_displacement);
        assert_eq!(config.signals.sessions.windows[0].name, "tokyo");
        assert_eq!(config.risk.cooldown_seconds, 600);
        assert_eq!(config.risk.trailing.activation_pips, dec!(30));
        assert!(config.risk.trailing.enabled);
    }

    #[test]
    #[serial]
    fn test_missing_dir_falls_back_to_defaults() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("nope")).unwrap();
        assert_eq!(config.trading.instruments[0].symbol, "EURUSD");
        assert_eq!(config.trading.tag, 234_000);
        assert_eq!(config.signals.scoring.min_confidence, 6);
        assert_eq!(config.risk.daily_loss_limit_pct, dec!(5.0));
    }

    #[test]
    #[serial]
    fn test_malformed_section_uses_defaults() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        write_test_configs(dir.path());
        std::fs::write(dir.path().join("risk.json"), "{ not json").unwrap();

        let config = load_config(dir.path()).unwrap();
        // risk.json fell back, the others loaded.
        assert_eq!(config.risk.cooldown_seconds, 300);
        assert_eq!(config.trading.tag, 99);
    }

    #[test]
    #[serial]
    fn test_out_of_range_value_reset() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        write_test_configs(dir.path());
        std::fs::write(
            dir.path().join("signals.json"),
            r#"{ "scoring": { "min_confidence": 42 } }"#,
        )
        .unwrap();

        let config = load_config(dir.path()).unwrap();
        assert_eq!(config.signals.scoring.min_confidence, 6);
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        write_test_configs(dir.path());

        std::env::set_var("BOT_SYMBOLS", "xauusd, GBPJPY");
        std::env::set_var("BOT_TIMEFRAME", "h4");
        std::env::set_var("BOT_CHECK_INTERVAL", "30");
        std::env::set_var("BOT_MIN_CONFIDENCE", "8");
        std::env::set_var("BOT_RISK_PERCENT", "0.5");
        std::env::set_var("BOT_DAILY_LOSS_LIMIT", "2.5");
        std::env::set_var("BOT_LOG_DIR", "/tmp/bot-logs");

        let config = load_config(dir.path()).unwrap();
        clear_env();

        let symbols: Vec<&str> = config
            .trading
            .instruments
            .iter()
            .map(|i| i.symbol.as_str())
            .collect();
        assert_eq!(symbols, vec!["XAUUSD", "GBPJPY"]);
        // Existing XAUUSD spec is kept.
        assert_eq!(config.trading.instruments[0].pip_size, Some(dec!(0.1)));
        assert_eq!(config.trading.timeframe, Timeframe::H4);
        assert_eq!(config.trading.check_interval_seconds, 30);
        assert_eq!(config.signals.scoring.min_confidence, 8);
        assert_eq!(config.risk.base_risk.metal, dec!(0.5));
        assert_eq!(config.risk.daily_loss_limit_pct, dec!(2.5));
        assert_eq!(config.app.logging.log_dir, "/tmp/bot-logs");
    }

    #[test]
    #[serial]
    fn test_bad_env_value_ignored() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        write_test_configs(dir.path());
        std::env::set_var("BOT_TIMEFRAME", "2h");
        std::env::set_var("BOT_CHECK_INTERVAL", "soon");

        let config = load_config(dir.path()).unwrap();
        clear_env();
        assert_eq!(config.trading.timeframe, Timeframe::M15);
        assert_eq!(config.trading.check_interval_seconds, 60);
    }

    #[test]
    #[serial]
    fn test_project_config_loads() {
        clear_env();
        let config = load_config(&project_config_dir()).unwrap();
        assert!(!config.trading.instruments.is_empty());
    }
}
