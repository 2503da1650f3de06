//! Polling control loop.
//!
//! Reconciles open positions at startup, then once per `check_interval`
//! walks every instrument: fetch candles, fetch quote, analyze, hand the
//! analysis to the lifecycle manager. Instruments are processed serially, so
//! account-level state is only ever touched from one place at a time.
//!
//! Shutdown stops new entries, makes one close attempt per open position and
//! flushes final statistics.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::BotConfig;
use crate::errors::BotError;
use crate::execution::{Execution, MarketData};
use crate::types::Timeframe;

use super::lifecycle::{LifecycleAction, PositionLifecycleManager};
use super::signal_scorer::SignalScorer;
use super::volatility::InstrumentSpec;

pub struct Engine {
    market: Arc<dyn MarketData>,
    lifecycle: PositionLifecycleManager,
    scorer: SignalScorer,
    symbols: Vec<String>,
    timeframe: Timeframe,
    bars: usize,
    check_interval: Duration,
    stats_path: Option<PathBuf>,
    shutdown: CancellationToken,
    /// Latest venue clock seen; drives cooldown and day boundaries.
    last_server_time: Option<i64>,
    cycles: u64,
}

impl Engine {
    pub fn new(
        config: &BotConfig,
        market: Arc<dyn MarketData>,
        execution: Arc<dyn Execution>,
        shutdown: CancellationToken,
    ) -> Self {
        let specs: Vec<InstrumentSpec> = config
            .trading
            .instruments
            .iter()
            .map(InstrumentSpec::from_config)
            .collect();
        let symbols = specs.iter().map(|s| s.symbol.clone()).collect();

        Self {
            market,
            lifecycle: PositionLifecycleManager::new(
                execution,
                &config.risk,
                config.trading.tag,
                specs,
                config.trading.paper.starting_balance,
            ),
            scorer: SignalScorer::new(config.signals.clone()),
            symbols,
            timeframe: config.trading.timeframe,
            bars: config.trading.bars,
            check_interval: Duration::from_secs(config.trading.check_interval_seconds),
            stats_path: config.app.stats_path.as_ref().map(PathBuf::from),
            shutdown,
            last_server_time: None,
            cycles: 0,
        }
    }

    pub fn lifecycle(&self) -> &PositionLifecycleManager {
        &self.lifecycle
    }

    fn now(&self) -> i64 {
        self.last_server_time
            .unwrap_or_else(|| Utc::now().timestamp())
    }

    // -----------------------------------------------------------------------
    // Main loop
    // -----------------------------------------------------------------------

    /// Run until the shutdown token is cancelled, then close out.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            symbols = ?self.symbols,
            timeframe = self.timeframe.as_str(),
            bars = self.bars,
            interval_s = self.check_interval.as_secs(),
            "engine started"
        );

        self.lifecycle.reconcile().await;

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }
            self.run_cycle().await;

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("engine: shutdown signal received");
                    break;
                }
                _ = tokio::time::sleep(self.check_interval) => {}
            }
        }

        self.shutdown().await
    }

    /// One pass over every instrument.
    pub async fn run_cycle(&mut self) -> Vec<(String, LifecycleAction)> {
        self.cycles += 1;
        let now = self.now();
        self.lifecycle.begin_cycle(now).await;

        let mut actions = Vec::with_capacity(self.symbols.len());
        for symbol in self.symbols.clone() {
            match self.process_symbol(&symbol).await {
                Ok(action) => {
                    if action != LifecycleAction::Idle {
                        debug!(symbol = %symbol, action = ?action, "lifecycle action");
                    }
                    actions.push((symbol, action));
                }
                Err(e) if e.is_skippable() => {
                    warn!(symbol = %symbol, error = %e, "skipping instrument this cycle");
                }
                Err(e) => {
                    if e.is_connectivity() {
                        self.lifecycle.safety().set_degraded(&e.to_string());
                    }
                    warn!(symbol = %symbol, error = %e, "instrument processing failed");
                }
            }
        }

        if self.cycles % 12 == 0 {
            let balance: Decimal = self.lifecycle.performance().balance();
            info!(
                cycle = self.cycles,
                open_positions = self.lifecycle.open_positions(),
                trades = self.lifecycle.performance().trades().len(),
                balance = %balance.round_dp(2),
                degraded = self.lifecycle.safety().is_degraded(),
                daily_loss_pct = %self.lifecycle.safety().daily_loss_pct().round_dp(2),
                "engine heartbeat"
            );
        }
        actions
    }

    async fn process_symbol(&mut self, symbol: &str) -> Result<LifecycleAction, BotError> {
        let candles = self
            .market
            .fetch_candles(symbol, self.timeframe, self.bars)
            .await?;
        let quote = self.market.fetch_quote(symbol).await?;
        self.last_server_time = Some(
            self.last_server_time
                .map_or(quote.server_time, |t| t.max(quote.server_time)),
        );

        let analysis = self.scorer.analyze(symbol, &candles, &quote)?;
        Ok(self.lifecycle.process(&analysis, &quote, quote.server_time).await)
    }

    // -----------------------------------------------------------------------
    // Shutdown
    // -----------------------------------------------------------------------

    /// Close every open position once, then log and persist statistics.
    pub async fn shutdown(&mut self) -> Result<()> {
        let open = self.lifecycle.open_positions();
        if open > 0 {
            info!(open, "closing open positions");
        }
        let closed = self.lifecycle.close_all(self.now()).await;
        let left = self.lifecycle.open_positions();
        if left > 0 {
            error!(left, "positions still open after shutdown close attempt");
        } else if !closed.is_empty() {
            info!(closed = closed.len(), "all positions closed");
        }

        let performance = self.lifecycle.performance();
        performance.log_summary();
        if let Some(path) = &self.stats_path {
            if let Err(e) = performance.write_json(path) {
                error!(error = %e, "failed to write final statistics");
            }
        }
        info!("engine stopped");
        Ok(())
    }
}
