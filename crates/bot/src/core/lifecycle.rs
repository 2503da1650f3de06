//! Per-symbol position lifecycle: FLAT / LONG / SHORT.
//!
//! Owns one [`SymbolRuntimeState`] and at most one [`PositionRecord`] per
//! instrument. Each cycle the engine hands over a fresh [`Analysis`] and
//! quote; the manager then:
//!
//! 1. refreshes the held position from the venue and finalizes it if it was
//!    closed by its stop or target;
//! 2. on an opposite signal closes the position and, only if the close is
//!    confirmed, opens the other side without waiting out the cooldown;
//! 3. otherwise ratchets the trailing stop;
//! 4. when flat, opens on a BUY/SELL that clears the safety gate.
//!
//! Execution failures leave in-memory state untouched and are retried on the
//! next cycle. Connectivity loss switches the manager into degraded mode.

use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use crate::config::{RiskConfig, TrailingConfig};
use crate::errors::BotError;
use crate::execution::Execution;
use crate::types::{
    Analysis, ExitReason, OrderRequest, PositionDirection, PositionRecord, Quote, Signal,
    TradeRecord,
};

use super::performance::PerformanceTracker;
use super::risk_sizer::RiskSizer;
use super::safety::SafetyState;
use super::volatility::InstrumentSpec;

// ═══════════════════════════════════════════════════════════════════════════
// State
// ═══════════════════════════════════════════════════════════════════════════

/// Cross-cycle state for one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolRuntimeState {
    pub in_position: bool,
    /// UNIX seconds of the last close, for the cooldown gate.
    pub last_trade_close_time: Option<i64>,
    pub last_signal: Signal,
    pub last_confidence: u8,
}

impl Default for SymbolRuntimeState {
    fn default() -> Self {
        Self {
            in_position: false,
            last_trade_close_time: None,
            last_signal: Signal::Hold,
            last_confidence: 0,
        }
    }
}

struct SymbolBook {
    spec: InstrumentSpec,
    runtime: SymbolRuntimeState,
    position: Option<PositionRecord>,
}

/// What the manager did for a symbol this cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleAction {
    Idle,
    Opened {
        ticket: u64,
        direction: PositionDirection,
        volume: Decimal,
    },
    /// A qualifying signal was refused by the safety gate.
    Blocked { reason: String },
    Trailed { ticket: u64, stop: Decimal },
    Closed { trade: TradeRecord },
    /// Closed on an opposite signal; `opened` is the new ticket if the
    /// opposite entry went through.
    Reversed {
        trade: TradeRecord,
        opened: Option<u64>,
    },
    /// The venue rejected an action; state was left unchanged.
    Failed { reason: String },
}

// ═══════════════════════════════════════════════════════════════════════════
// Trailing
// ═══════════════════════════════════════════════════════════════════════════

/// Candidate trailing stop, or `None` when the stop should stay put.
///
/// Requires unrealized profit of at least `activation_pips`, and the new stop
/// must tighten the current one by at least one pip.
pub fn trailing_candidate(
    direction: PositionDirection,
    entry: Decimal,
    price: Decimal,
    current_stop: Decimal,
    pip: Decimal,
    trail_distance: Decimal,
    activation_pips: Decimal,
) -> Option<Decimal> {
    if pip <= Decimal::ZERO {
        return None;
    }
    let sign = direction.sign();
    let profit_pips = (price - entry) * sign / pip;
    if profit_pips < activation_pips {
        return None;
    }
    let candidate = price - sign * trail_distance;
    let improvement = (candidate - current_stop) * sign;
    (improvement >= pip).then_some(candidate)
}

/// `(pips, profit)` of closing `position` at `exit`.
pub fn trade_outcome(
    position: &PositionRecord,
    exit: Decimal,
    spec: &InstrumentSpec,
) -> (Decimal, Decimal) {
    let pips = spec.to_pips((exit - position.entry_price) * position.direction.sign());
    let profit = pips * spec.value_per_pip() * position.volume;
    (pips, profit)
}

/// Price at which a position of `direction` would be closed now.
fn exit_side(direction: PositionDirection, quote: &Quote) -> Decimal {
    match direction {
        PositionDirection::Long => quote.bid,
        PositionDirection::Short => quote.ask,
    }
}

/// Protective level the current quote has reached, else the quote itself.
fn crossed_level(position: &PositionRecord, quote: &Quote) -> Decimal {
    let price = exit_side(position.direction, quote);
    let sign = position.direction.sign();
    if (price - position.stop_price) * sign <= Decimal::ZERO {
        return position.stop_price;
    }
    match position.target_price {
        Some(target) if (price - target) * sign >= Decimal::ZERO => target,
        _ => price,
    }
}

fn entry_side(direction: PositionDirection, quote: &Quote) -> Decimal {
    match direction {
        PositionDirection::Long => quote.ask,
        PositionDirection::Short => quote.bid,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// PositionLifecycleManager
// ═══════════════════════════════════════════════════════════════════════════

pub struct PositionLifecycleManager {
    execution: Arc<dyn Execution>,
    sizer: RiskSizer,
    safety: SafetyState,
    performance: PerformanceTracker,
    trailing: TrailingConfig,
    tag: u64,
    books: BTreeMap<String, SymbolBook>,
}

impl PositionLifecycleManager {
    pub fn new(
        execution: Arc<dyn Execution>,
        risk: &RiskConfig,
        tag: u64,
        instruments: Vec<InstrumentSpec>,
        initial_balance: Decimal,
    ) -> Self {
        let books = instruments
            .into_iter()
            .map(|spec| {
                (
                    spec.symbol.clone(),
                    SymbolBook {
                        spec,
                        runtime: SymbolRuntimeState::default(),
                        position: None,
                    },
                )
            })
            .collect();
        Self {
            execution,
            sizer: RiskSizer::new(risk.clone()),
            safety: SafetyState::from_config(risk),
            performance: PerformanceTracker::new(initial_balance),
            trailing: risk.trailing.clone(),
            tag,
            books,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn symbols(&self) -> Vec<String> {
        self.books.keys().cloned().collect()
    }

    pub fn runtime(&self, symbol: &str) -> Option<&SymbolRuntimeState> {
        self.books.get(symbol).map(|b| &b.runtime)
    }

    pub fn position(&self, symbol: &str) -> Option<&PositionRecord> {
        self.books.get(symbol).and_then(|b| b.position.as_ref())
    }

    pub fn open_positions(&self) -> usize {
        self.books.values().filter(|b| b.position.is_some()).count()
    }

    pub fn performance(&self) -> &PerformanceTracker {
        &self.performance
    }

    pub fn safety(&self) -> &SafetyState {
        &self.safety
    }

    fn note_error(&self, context: &str, err: &BotError) {
        if err.is_connectivity() {
            self.safety.set_degraded(&err.to_string());
        }
        warn!(error = %err, "{context}");
    }

    // -----------------------------------------------------------------------
    // Startup / cycle bookkeeping
    // -----------------------------------------------------------------------

    /// Rebuild in-position state from the venue instead of assuming FLAT.
    pub async fn reconcile(&mut self) {
        match self.execution.account_balance().await {
            Ok(balance) => self.performance.set_initial_balance(balance),
            Err(e) => self.note_error("balance unavailable during reconcile", &e),
        }

        for symbol in self.symbols() {
            let result = self.execution.get_open_position(&symbol, self.tag).await;
            let Some(book) = self.books.get_mut(&symbol) else {
                continue;
            };
            match result {
                Ok(Some(position)) => {
                    info!(
                        symbol = %symbol,
                        ticket = position.ticket,
                        direction = position.direction.as_str(),
                        entry = %position.entry_price,
                        stop = %position.stop_price,
                        "reconciled open position"
                    );
                    book.runtime.in_position = true;
                    book.position = Some(position);
                }
                Ok(None) => {
                    book.runtime.in_position = false;
                    book.position = None;
                }
                Err(e) => {
                    self.note_error("position reconcile failed", &e);
                }
            }
        }
    }

    /// Once per cycle, before any symbol: retry the venue if degraded and
    /// feed the current balance to the daily-loss breaker.
    pub async fn begin_cycle(&mut self, now: i64) {
        if self.safety.is_degraded() {
            match self.execution.reconnect().await {
                Ok(()) => self.safety.clear_degraded(),
                Err(e) => {
                    warn!(error = %e, "reconnect failed, still degraded");
                    return;
                }
            }
        }
        match self.execution.account_balance().await {
            Ok(balance) => self.safety.observe_balance(now, balance),
            Err(e) => self.note_error("balance unavailable", &e),
        }
    }

    // -----------------------------------------------------------------------
    // Per-symbol processing
    // -----------------------------------------------------------------------

    /// Apply one cycle's analysis for a symbol.
    pub async fn process(&mut self, analysis: &Analysis, quote: &Quote, now: i64) -> LifecycleAction {
        let symbol = analysis.symbol.as_str();
        let Some(book) = self.books.get_mut(symbol) else {
            warn!(symbol, "analysis for unconfigured symbol ignored");
            return LifecycleAction::Idle;
        };
        book.runtime.last_signal = analysis.signal;
        book.runtime.last_confidence = analysis.confidence;

        if let Some(trade) = self.sync_position(symbol, quote, now).await {
            return LifecycleAction::Closed { trade };
        }

        let held = self.position(symbol).map(|p| p.direction);
        match (held, analysis.signal.direction()) {
            (Some(current), Some(wanted)) if wanted != current => {
                self.reverse(analysis, quote, now).await
            }
            (Some(_), _) => self.trail(symbol, quote, analysis.atr).await,
            (None, Some(direction)) => self.open(analysis, direction, quote, now, false).await,
            (None, None) => LifecycleAction::Idle,
        }
    }

    /// Detect a position closed at the venue by its stop or target.
    ///
    /// The trade is booked at the venue's reported fill; without one, at
    /// whichever protective level the quote has crossed.
    async fn sync_position(&mut self, symbol: &str, quote: &Quote, now: i64) -> Option<TradeRecord> {
        let held = self.position(symbol)?.ticket;
        match self.execution.get_open_position(symbol, self.tag).await {
            Ok(Some(p)) if p.ticket == held => None,
            Ok(_) => {
                let fallback = crossed_level(self.position(symbol)?, quote);
                let exit = match self.execution.closed_fill(held).await {
                    Ok(Some(fill)) => fill,
                    Ok(None) => fallback,
                    Err(e) => {
                        self.note_error("close fill unavailable", &e);
                        fallback
                    }
                };
                info!(symbol, ticket = held, exit = %exit, "position closed at venue");
                self.finalize(symbol, exit, ExitReason::StopOrTarget, now).await
            }
            Err(e) => {
                self.note_error("position refresh failed", &e);
                None
            }
        }
    }

    async fn reverse(&mut self, analysis: &Analysis, quote: &Quote, now: i64) -> LifecycleAction {
        let symbol = analysis.symbol.as_str();
        let trade = match self.close(symbol, ExitReason::SignalReversal, now).await {
            Ok(trade) => trade,
            Err(e) => {
                self.note_error("reversal close failed, not opening opposite side", &e);
                return LifecycleAction::Failed {
                    reason: e.to_string(),
                };
            }
        };

        let Some(direction) = analysis.signal.direction() else {
            return LifecycleAction::Closed { trade };
        };
        let opened = match self.open(analysis, direction, quote, now, true).await {
            LifecycleAction::Opened { ticket, .. } => Some(ticket),
            _ => None,
        };
        LifecycleAction::Reversed { trade, opened }
    }

    async fn trail(&mut self, symbol: &str, quote: &Quote, atr: Decimal) -> LifecycleAction {
        if !self.trailing.enabled {
            return LifecycleAction::Idle;
        }
        let Some(book) = self.books.get(symbol) else {
            return LifecycleAction::Idle;
        };
        let Some(position) = book.position.as_ref() else {
            return LifecycleAction::Idle;
        };

        let distance = if self.trailing.atr_trailing {
            atr * self.trailing.atr_trailing_multiplier
        } else {
            book.spec.to_price(self.trailing.trail_distance_pips)
        };
        let Some(stop) = trailing_candidate(
            position.direction,
            position.entry_price,
            exit_side(position.direction, quote),
            position.stop_price,
            book.spec.pip,
            distance,
            self.trailing.activation_pips,
        ) else {
            return LifecycleAction::Idle;
        };
        let ticket = position.ticket;
        let previous = position.stop_price;

        match self.execution.modify_stop(ticket, stop).await {
            Ok(()) => {
                if let Some(p) = self.books.get_mut(symbol).and_then(|b| b.position.as_mut()) {
                    p.stop_price = stop;
                }
                info!(symbol, ticket, from = %previous, to = %stop, "trailing stop moved");
                LifecycleAction::Trailed { ticket, stop }
            }
            Err(e) => {
                self.note_error("trailing stop update failed", &e);
                LifecycleAction::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn open(
        &mut self,
        analysis: &Analysis,
        direction: PositionDirection,
        quote: &Quote,
        now: i64,
        reversal: bool,
    ) -> LifecycleAction {
        let symbol = analysis.symbol.as_str();
        let Some(last_close) = self.runtime(symbol).map(|r| r.last_trade_close_time) else {
            return LifecycleAction::Idle;
        };

        let balance = match self.execution.account_balance().await {
            Ok(b) => b,
            Err(e) => {
                self.note_error("balance unavailable, entry skipped", &e);
                return LifecycleAction::Failed {
                    reason: e.to_string(),
                };
            }
        };
        let gate = if reversal {
            self.safety.check_reversal_entry(now, balance)
        } else {
            self.safety.check_entry(last_close, now, balance)
        };
        if let Err(e) = gate {
            debug!(symbol, reason = %e, "entry blocked");
            return LifecycleAction::Blocked {
                reason: e.to_string(),
            };
        }
        if analysis.atr <= Decimal::ZERO {
            return LifecycleAction::Blocked {
                reason: "zero volatility, no stop distance".into(),
            };
        }

        let Some(spec) = self.books.get(symbol).map(|b| b.spec.clone()) else {
            return LifecycleAction::Idle;
        };
        let entry = entry_side(direction, quote);
        let sized = self.sizer.size_entry(
            direction,
            entry,
            analysis.atr,
            balance,
            analysis.confidence,
            &spec,
        );
        let order = OrderRequest {
            symbol: symbol.to_string(),
            direction,
            volume: sized.lots,
            stop: sized.plan.stop,
            target: sized.plan.target,
            tag: self.tag,
            comment: format!("trend-bot c{}", analysis.confidence),
        };

        match self.execution.place_order(&order).await {
            Ok(fill) => {
                info!(
                    symbol,
                    ticket = fill.ticket,
                    direction = direction.as_str(),
                    volume = %sized.lots,
                    entry = %fill.fill_price,
                    stop = %sized.plan.stop,
                    target = %sized.plan.target,
                    risk_pct = %sized.risk_percent,
                    confidence = analysis.confidence,
                    "position opened"
                );
                if let Some(book) = self.books.get_mut(symbol) {
                    book.runtime.in_position = true;
                    book.position = Some(PositionRecord {
                        ticket: fill.ticket,
                        symbol: symbol.to_string(),
                        direction,
                        entry_price: fill.fill_price,
                        volume: sized.lots,
                        stop_price: sized.plan.stop,
                        target_price: Some(sized.plan.target),
                        open_time: now,
                        confidence_at_entry: analysis.confidence,
                        structure_at_entry: analysis.structure.label,
                        entry_flags: analysis.entry_flags(),
                    });
                }
                LifecycleAction::Opened {
                    ticket: fill.ticket,
                    direction,
                    volume: sized.lots,
                }
            }
            Err(e) => {
                self.note_error("order rejected", &e);
                LifecycleAction::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Closing
    // -----------------------------------------------------------------------

    /// Close the held position at market and record the trade.
    pub async fn close(
        &mut self,
        symbol: &str,
        reason: ExitReason,
        now: i64,
    ) -> Result<TradeRecord, BotError> {
        let Some(ticket) = self.position(symbol).map(|p| p.ticket) else {
            return Err(BotError::CloseRejected {
                ticket: 0,
                reason: format!("no open position for {symbol}"),
            });
        };
        let fill = self.execution.close_position(ticket).await?;
        self.finalize(symbol, fill, reason, now)
            .await
            .ok_or_else(|| BotError::CloseRejected {
                ticket,
                reason: "position vanished while closing".into(),
            })
    }

    /// Turn the held position into a `TradeRecord` and go FLAT.
    async fn finalize(
        &mut self,
        symbol: &str,
        exit: Decimal,
        reason: ExitReason,
        now: i64,
    ) -> Option<TradeRecord> {
        let (position, spec) = {
            let book = self.books.get_mut(symbol)?;
            (book.position.take()?, book.spec.clone())
        };
        let (pips, profit) = trade_outcome(&position, exit, &spec);

        let balance_after = match self.execution.account_balance().await {
            Ok(b) => b,
            Err(e) => {
                self.note_error("balance unavailable after close", &e);
                self.performance.balance() + profit
            }
        };

        let trade = TradeRecord {
            symbol: symbol.to_string(),
            direction: position.direction,
            entry: position.entry_price,
            exit,
            profit,
            pips,
            duration_minutes: (now - position.open_time).max(0) / 60,
            confidence: position.confidence_at_entry,
            structure: position.structure_at_entry,
            sweep_detected: position.entry_flags.sweep,
            bos_detected: position.entry_flags.bos,
            displacement_detected: position.entry_flags.displacement,
            balance_after,
            exit_reason: reason,
            close_time: now,
        };

        if let Some(book) = self.books.get_mut(symbol) {
            book.runtime.in_position = false;
            book.runtime.last_trade_close_time = Some(now);
        }
        self.safety.record_trade(now, profit, balance_after);
        self.performance.record(trade.clone());

        info!(
            symbol,
            ticket = position.ticket,
            direction = position.direction.as_str(),
            entry = %position.entry_price,
            exit = %exit,
            pips = %pips.round_dp(1),
            profit = %profit.round_dp(2),
            reason = reason.as_str(),
            "position closed"
        );
        Some(trade)
    }

    /// Shutdown path: one close attempt per open position.
    pub async fn close_all(&mut self, now: i64) -> Vec<TradeRecord> {
        let mut closed = Vec::new();
        for symbol in self.symbols() {
            if self.position(&symbol).is_none() {
                continue;
            }
            match self.close(&symbol, ExitReason::Shutdown, now).await {
                Ok(trade) => closed.push(trade),
                Err(e) => error!(symbol = %symbol, error = %e, "failed to close position on shutdown"),
            }
        }
        closed
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════
