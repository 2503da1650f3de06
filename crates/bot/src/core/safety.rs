//! Entry gate: cooldown, daily-loss circuit breaker and degraded mode.
//!
//! Every new entry must pass `SafetyState::check_entry`. Management of
//! already-open positions (trailing, closing) never consults this gate. On any
//! internal error the gate blocks the entry (fail-closed, not fail-open).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{error, info, warn};

use crate::config::RiskConfig;
use crate::errors::BotError;

fn utc_day(unix_secs: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp(unix_secs, 0).map(|t| t.date_naive())
}

/// Seconds of cooldown left for a symbol closed at `last_close`.
pub fn cooldown_remaining(last_close: Option<i64>, now: i64, cooldown_seconds: u64) -> Option<u64> {
    let elapsed = now.saturating_sub(last_close?);
    let cooldown = i64::try_from(cooldown_seconds).unwrap_or(i64::MAX);
    (elapsed < cooldown).then(|| (cooldown - elapsed) as u64)
}

// ═══════════════════════════════════════════════════════════════════════════
// Daily-loss breaker
// ═══════════════════════════════════════════════════════════════════════════

/// Realized-loss tracker for the current UTC day.
///
/// The start-of-day balance is estimated at the first observation of the day
/// as `balance - realized_today`; when that observation is a closed trade the
/// trade's own profit is backed out. Once tripped the breaker stays latched
/// until the day rolls over.
#[derive(Debug, Clone)]
pub struct DailyLossBreaker {
    limit_pct: Decimal,
    day: Option<NaiveDate>,
    start_balance: Decimal,
    realized_today: Decimal,
    tripped: bool,
}

impl DailyLossBreaker {
    pub fn new(limit_pct: Decimal) -> Self {
        Self {
            limit_pct,
            day: None,
            start_balance: Decimal::ZERO,
            realized_today: Decimal::ZERO,
            tripped: false,
        }
    }

    fn roll(&mut self, now: i64, balance_before: Decimal) {
        let today = utc_day(now);
        if today.is_some() && self.day != today {
            if self.tripped {
                info!("new trading day, daily loss breaker reset");
            }
            self.day = today;
            self.realized_today = Decimal::ZERO;
            self.start_balance = balance_before;
            self.tripped = false;
        }
    }

    /// Note the current balance; starts a new day if the date changed.
    ///
    /// Nothing has been realized yet on a fresh day, so the observed balance
    /// is the start-of-day balance.
    pub fn observe(&mut self, now: i64, balance: Decimal) {
        self.roll(now, balance);
    }

    /// Add a closed trade's profit to today's total.
    pub fn record(&mut self, close_time: i64, profit: Decimal, balance_after: Decimal) {
        self.roll(close_time, balance_after - profit);
        self.realized_today += profit;
        if !self.tripped && self.loss_pct() > self.limit_pct {
            self.tripped = true;
            error!(
                loss_pct = %self.loss_pct().round_dp(2),
                limit_pct = %self.limit_pct,
                "daily loss limit breached, new entries suspended for today"
            );
        }
    }

    /// Today's realized loss as a percent of the start-of-day balance.
    pub fn loss_pct(&self) -> Decimal {
        if self.realized_today >= Decimal::ZERO || self.start_balance <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        -self.realized_today / self.start_balance * dec!(100)
    }

    pub fn realized_today(&self) -> Decimal {
        self.realized_today
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped
    }

    pub fn check(&self) -> Result<(), BotError> {
        if self.tripped {
            return Err(BotError::DailyLossBreached {
                loss_pct: self.loss_pct().to_f64().unwrap_or(0.0),
                limit_pct: self.limit_pct.to_f64().unwrap_or(0.0),
            });
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SafetyState
// ═══════════════════════════════════════════════════════════════════════════

/// Account-level entry controls shared by every instrument.
///
/// The breaker sits behind a single `Mutex` so that balance observations,
/// trade recording and the entry decision are serialized even if
/// instruments are processed concurrently.
pub struct SafetyState {
    cooldown_seconds: u64,
    degraded: AtomicBool,
    breaker: Mutex<DailyLossBreaker>,
}

impl SafetyState {
    pub fn from_config(config: &RiskConfig) -> Self {
        Self {
            cooldown_seconds: config.cooldown_seconds,
            degraded: AtomicBool::new(false),
            breaker: Mutex::new(DailyLossBreaker::new(config.daily_loss_limit_pct)),
        }
    }

    pub fn cooldown_seconds(&self) -> u64 {
        self.cooldown_seconds
    }

    // -----------------------------------------------------------------------
    // Entry validation
    // -----------------------------------------------------------------------

    /// Validate whether a new position may be opened for a symbol whose last
    /// close was at `last_close`.
    ///
    /// Checks (in order): degraded mode, cooldown, daily-loss breaker.
    pub fn check_entry(
        &self,
        last_close: Option<i64>,
        now: i64,
        balance: Decimal,
    ) -> Result<(), BotError> {
        self.check_degraded()?;
        if let Some(remaining) = cooldown_remaining(last_close, now, self.cooldown_seconds) {
            return Err(BotError::SafetyBlocked {
                reason: format!("cooldown: {remaining}s remaining"),
            });
        }
        self.check_breaker(now, balance)
    }

    /// Gate for the opposite-side entry of a reversal.
    ///
    /// The reversal close itself does not start a cooldown; degraded mode and
    /// the breaker (including the loss just realized) still apply.
    pub fn check_reversal_entry(&self, now: i64, balance: Decimal) -> Result<(), BotError> {
        self.check_degraded()?;
        self.check_breaker(now, balance)
    }

    fn check_degraded(&self) -> Result<(), BotError> {
        if self.is_degraded() {
            return Err(BotError::SafetyBlocked {
                reason: "degraded mode: execution venue unreachable".into(),
            });
        }
        Ok(())
    }

    fn check_breaker(&self, now: i64, balance: Decimal) -> Result<(), BotError> {
        let mut breaker = self.breaker.lock().map_err(|_| BotError::SafetyBlocked {
            reason: "breaker lock poisoned".into(),
        })?;
        breaker.observe(now, balance);
        breaker.check()
    }

    // -----------------------------------------------------------------------
    // Account updates
    // -----------------------------------------------------------------------

    pub fn observe_balance(&self, now: i64, balance: Decimal) {
        match self.breaker.lock() {
            Ok(mut breaker) => breaker.observe(now, balance),
            Err(_) => error!("breaker lock poisoned, balance observation dropped"),
        }
    }

    pub fn record_trade(&self, close_time: i64, profit: Decimal, balance_after: Decimal) {
        match self.breaker.lock() {
            Ok(mut breaker) => breaker.record(close_time, profit, balance_after),
            Err(_) => error!("breaker lock poisoned, trade not counted toward daily loss"),
        }
    }

    /// Tripped breaker, or `true` when its state cannot be read.
    pub fn is_breaker_tripped(&self) -> bool {
        self.breaker.lock().map(|b| b.is_tripped()).unwrap_or(true)
    }

    pub fn daily_loss_pct(&self) -> Decimal {
        self.breaker
            .lock()
            .map(|b| b.loss_pct())
            .unwrap_or(Decimal::ZERO)
    }

    // -----------------------------------------------------------------------
    // Degraded mode
    // -----------------------------------------------------------------------

    pub fn set_degraded(&self, reason: &str) {
        if !self.degraded.swap(true, Ordering::SeqCst) {
            warn!(reason, "entering degraded mode, new entries suspended");
        }
    }

    pub fn clear_degraded(&self) {
        if self.degraded.swap(false, Ordering::SeqCst) {
            info!("execution venue reachable again, degraded mode cleared");
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }
}
