//! In-process simulated venue.
//!
//! Replays recorded candles per symbol, revealing one more bar on every
//! `fetch_candles` call. Quotes sit half the configured spread either side
//! of the last visible close. Each newly revealed bar is checked against open
//! stops and targets (stop first when a bar touches both), and realized
//! profit is booked into the simulated balance.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::PaperConfig;
use crate::core::lifecycle::trade_outcome;
use crate::core::volatility::InstrumentSpec;
use crate::errors::BotError;
use crate::types::{
    Candle, OrderFill, OrderRequest, PositionDirection, PositionRecord, Quote, StructureLabel,
    Timeframe,
};

use super::broker::{Execution, MarketData};

/// Read a JSON array of candles from disk.
pub fn load_candles(path: &Path) -> Result<Vec<Candle>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read candle file {}", path.display()))?;
    let candles: Vec<Candle> = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse candle file {}", path.display()))?;
    Ok(candles)
}

struct Feed {
    candles: Vec<Candle>,
    /// Exclusive end of the visible window; `None` before the first fetch.
    end: Option<usize>,
}

impl Feed {
    fn visible(&self) -> &[Candle] {
        &self.candles[..self.end.unwrap_or(0)]
    }

    fn exhausted(&self) -> bool {
        self.end.is_some_and(|e| e >= self.candles.len())
    }
}

struct PaperPosition {
    record: PositionRecord,
    tag: u64,
}

struct PaperState {
    feeds: HashMap<String, Feed>,
    positions: HashMap<u64, PaperPosition>,
    /// Fill price of every closed ticket.
    closed: HashMap<u64, Decimal>,
    balance: Decimal,
    next_ticket: u64,
}

pub struct PaperBroker {
    specs: HashMap<String, InstrumentSpec>,
    spread_pips: Decimal,
    state: Mutex<PaperState>,
}

impl PaperBroker {
    pub fn new(
        config: &PaperConfig,
        specs: Vec<InstrumentSpec>,
        candles: HashMap<String, Vec<Candle>>,
    ) -> Self {
        let feeds = candles
            .into_iter()
            .map(|(symbol, candles)| (symbol, Feed { candles, end: None }))
            .collect();
        Self {
            specs: specs.into_iter().map(|s| (s.symbol.clone(), s)).collect(),
            spread_pips: config.spread_pips,
            state: Mutex::new(PaperState {
                feeds,
                positions: HashMap::new(),
                closed: HashMap::new(),
                balance: config.starting_balance,
                next_ticket: 1,
            }),
        }
    }

    /// Load `<data_dir>/<SYMBOL>.json` for every instrument.
    pub fn from_data_dir(config: &PaperConfig, specs: Vec<InstrumentSpec>) -> Result<Self> {
        let dir = Path::new(&config.data_dir);
        let mut candles = HashMap::new();
        for spec in &specs {
            let path = dir.join(format!("{}.json", spec.symbol));
            let bars = load_candles(&path)?;
            info!(symbol = %spec.symbol, bars = bars.len(), path = %path.display(), "paper feed loaded");
            candles.insert(spec.symbol.clone(), bars);
        }
        Ok(Self::new(config, specs, candles))
    }

    /// Every feed has revealed its final bar.
    pub async fn exhausted(&self) -> bool {
        let state = self.state.lock().await;
        state.feeds.values().all(Feed::exhausted)
    }

    fn spec(&self, symbol: &str) -> Result<&InstrumentSpec, BotError> {
        self.specs.get(symbol).ok_or_else(|| BotError::DataUnavailable {
            symbol: symbol.to_string(),
            reason: "unknown instrument".into(),
        })
    }

    fn half_spread(&self, spec: &InstrumentSpec) -> Decimal {
        spec.to_price(self.spread_pips) / Decimal::TWO
    }

    fn quote_for(&self, state: &PaperState, symbol: &str) -> Result<Quote, BotError> {
        let spec = self.spec(symbol)?;
        let last = state
            .feeds
            .get(symbol)
            .and_then(|f| f.visible().last())
            .ok_or_else(|| BotError::QuoteUnavailable {
                symbol: symbol.to_string(),
            })?;
        let half = self.half_spread(spec);
        Ok(Quote {
            bid: last.close - half,
            ask: last.close + half,
            server_time: last.timestamp,
        })
    }

    /// Fill any stop or target touched by the newest bar of `symbol`.
    fn check_protective_levels(&self, state: &mut PaperState, symbol: &str) {
        let Some(bar) = state.feeds.get(symbol).and_then(|f| f.visible().last()).copied() else {
            return;
        };
        let Ok(spec) = self.spec(symbol) else {
            return;
        };

        let hits: Vec<(u64, Decimal, &'static str)> = state
            .positions
            .iter()
            .filter(|(_, p)| p.record.symbol == symbol)
            .filter_map(|(ticket, p)| {
                let r = &p.record;
                let (stop_hit, target_hit) = match r.direction {
                    PositionDirection::Long => (
                        bar.low <= r.stop_price,
                        r.target_price.is_some_and(|t| bar.high >= t),
                    ),
                    PositionDirection::Short => (
                        bar.high >= r.stop_price,
                        r.target_price.is_some_and(|t| bar.low <= t),
                    ),
                };
                if stop_hit {
                    Some((*ticket, r.stop_price, "stop"))
                } else if target_hit {
                    r.target_price.map(|t| (*ticket, t, "target"))
                } else {
                    None
                }
            })
            .collect();

        for (ticket, price, kind) in hits {
            if let Some(p) = state.positions.remove(&ticket) {
                let (pips, profit) = trade_outcome(&p.record, price, spec);
                state.balance += profit;
                state.closed.insert(ticket, price);
                info!(
                    symbol,
                    ticket,
                    price = %price,
                    pips = %pips.round_dp(1),
                    profit = %profit.round_dp(2),
                    kind,
                    "paper {kind} filled"
                );
            }
        }
    }
}

#[async_trait]
impl MarketData for PaperBroker {
    async fn fetch_candles(
        &self,
        symbol: &str,
        _timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Candle>, BotError> {
        let mut state = self.state.lock().await;
        let feed = state
            .feeds
            .get_mut(symbol)
            .ok_or_else(|| BotError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: "no feed loaded".into(),
            })?;

        let len = feed.candles.len();
        let advanced = match feed.end {
            None => {
                feed.end = Some(count.min(len));
                true
            }
            Some(e) if e < len => {
                feed.end = Some(e + 1);
                true
            }
            Some(_) => false,
        };
        let visible = feed.visible();
        let window = visible[visible.len().saturating_sub(count)..].to_vec();
        if advanced {
            self.check_protective_levels(&mut state, symbol);
        }
        Ok(window)
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, BotError> {
        let state = self.state.lock().await;
        self.quote_for(&state, symbol)
    }
}

#[async_trait]
impl Execution for PaperBroker {
    async fn get_open_position(
        &self,
        symbol: &str,
        tag: u64,
    ) -> Result<Option<PositionRecord>, BotError> {
        let state = self.state.lock().await;
        Ok(state
            .positions
            .values()
            .find(|p| p.record.symbol == symbol && p.tag == tag)
            .map(|p| p.record.clone()))
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderFill, BotError> {
        let mut state = self.state.lock().await;
        if order.volume <= Decimal::ZERO {
            return Err(BotError::OrderRejected {
                reason: format!("invalid volume {}", order.volume),
            });
        }
        if state.positions.values().any(|p| p.record.symbol == order.symbol) {
            return Err(BotError::OrderRejected {
                reason: format!("{} already has an open position", order.symbol),
            });
        }
        let quote = self.quote_for(&state, &order.symbol).map_err(|e| BotError::OrderRejected {
            reason: e.to_string(),
        })?;
        let fill_price = match order.direction {
            PositionDirection::Long => quote.ask,
            PositionDirection::Short => quote.bid,
        };

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.positions.insert(
            ticket,
            PaperPosition {
                record: PositionRecord {
                    ticket,
                    symbol: order.symbol.clone(),
                    direction: order.direction,
                    entry_price: fill_price,
                    volume: order.volume,
                    stop_price: order.stop,
                    target_price: Some(order.target),
                    open_time: quote.server_time,
                    confidence_at_entry: 0,
                    structure_at_entry: StructureLabel::Range,
                    entry_flags: Default::default(),
                },
                tag: order.tag,
            },
        );
        debug!(
            symbol = %order.symbol,
            ticket,
            direction = order.direction.as_str(),
            volume = %order.volume,
            price = %fill_price,
            comment = %order.comment,
            "paper order filled"
        );
        Ok(OrderFill { ticket, fill_price })
    }

    async fn close_position(&self, ticket: u64) -> Result<Decimal, BotError> {
        let mut state = self.state.lock().await;
        let Some(symbol) = state.positions.get(&ticket).map(|p| p.record.symbol.clone()) else {
            return Err(BotError::CloseRejected {
                ticket,
                reason: "unknown ticket".into(),
            });
        };
        let quote = self.quote_for(&state, &symbol).map_err(|e| BotError::CloseRejected {
            ticket,
            reason: e.to_string(),
        })?;
        let spec = self.spec(&symbol).map_err(|e| BotError::CloseRejected {
            ticket,
            reason: e.to_string(),
        })?;

        let Some(position) = state.positions.remove(&ticket) else {
            return Err(BotError::CloseRejected {
                ticket,
                reason: "unknown ticket".into(),
            });
        };
        let price = match position.record.direction {
            PositionDirection::Long => quote.bid,
            PositionDirection::Short => quote.ask,
        };
        let (_, profit) = trade_outcome(&position.record, price, spec);
        state.balance += profit;
        state.closed.insert(ticket, price);
        Ok(price)
    }

    async fn modify_stop(&self, ticket: u64, stop: Decimal) -> Result<(), BotError> {
        let mut state = self.state.lock().await;
        let Some(symbol) = state.positions.get(&ticket).map(|p| p.record.symbol.clone()) else {
            return Err(BotError::ModifyRejected {
                ticket,
                reason: "unknown ticket".into(),
            });
        };
        let quote = self.quote_for(&state, &symbol).map_err(|e| BotError::ModifyRejected {
            ticket,
            reason: e.to_string(),
        })?;
        let Some(position) = state.positions.get_mut(&ticket) else {
            return Err(BotError::ModifyRejected {
                ticket,
                reason: "unknown ticket".into(),
            });
        };
        let valid = match position.record.direction {
            PositionDirection::Long => stop < quote.bid,
            PositionDirection::Short => stop > quote.ask,
        };
        if !valid {
            warn!(ticket, stop = %stop, "paper stop beyond market rejected");
            return Err(BotError::ModifyRejected {
                ticket,
                reason: format!("stop {stop} beyond market"),
            });
        }
        position.record.stop_price = stop;
        Ok(())
    }

    async fn closed_fill(&self, ticket: u64) -> Result<Option<Decimal>, BotError> {
        Ok(self.state.lock().await.closed.get(&ticket).copied())
    }

    async fn account_balance(&self) -> Result<Decimal, BotError> {
        Ok(self.state.lock().await.balance)
    }

    async fn account_equity(&self) -> Result<Decimal, BotError> {
        let state = self.state.lock().await;
        let mut equity = state.balance;
        for p in state.positions.values() {
            let (Ok(quote), Ok(spec)) = (self.quote_for(&state, &p.record.symbol), self.spec(&p.record.symbol)) else {
                continue;
            };
            let price = match p.record.direction {
                PositionDirection::Long => quote.bid,
                PositionDirection::Short => quote.ask,
            };
            equity += trade_outcome(&p.record, price, spec).1;
        }
        Ok(equity)
    }

    async fn reconnect(&self) -> Result<(), BotError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstrumentConfig;
    use rust_decimal_macros::dec;

    fn bar(ts: i64, low: Decimal, high: Decimal, close: Decimal) -> Candle {
        Candle {
            timestamp: ts,
            open: close,
            high,
            low,
            close,
            volume: dec!(1000),
        }
    }

    fn broker(bars: Vec<Candle>) -> PaperBroker {
        let spec = InstrumentSpec::from_config(&InstrumentConfig::new("EURUSD"));
        let mut feeds = HashMap::new();
        feeds.insert("EURUSD".to_string(), bars);
        PaperBroker::new(&PaperConfig::default(), vec![spec], feeds)
    }

    fn flat_bars(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| bar(i as i64 * 3600, dec!(1.0990), dec!(1.1010), dec!(1.1000)))
            .collect()
    }

    fn order(direction: PositionDirection, stop: Decimal, target: Decimal) -> OrderRequest {
        OrderRequest {
            symbol: "EURUSD".into(),
            direction,
            volume: dec!(1),
            stop,
            target,
            tag: 7,
            comment: "test".into(),
        }
    }

    #[tokio::test]
    async fn test_replay_advances_one_bar_per_fetch() {
        let b = broker(flat_bars(10));
        assert_eq!(b.fetch_candles("EURUSD", Timeframe::H1, 5).await.unwrap().len(), 5);
        let w = b.fetch_candles("EURUSD", Timeframe::H1, 5).await.unwrap();
        assert_eq!(w.len(), 5);
        assert_eq!(w.last().unwrap().timestamp, 5 * 3600);
        assert!(!b.exhausted().await);

        for _ in 0..4 {
            b.fetch_candles("EURUSD", Timeframe::H1, 5).await.unwrap();
        }
        assert!(b.exhausted().await);
    }

    #[tokio::test]
    async fn test_quote_around_last_close() {
        let b = broker(flat_bars(3));
        assert!(matches!(
            b.fetch_quote("EURUSD").await,
            Err(BotError::QuoteUnavailable { .. })
        ));
        b.fetch_candles("EURUSD", Timeframe::H1, 3).await.unwrap();
        let q = b.fetch_quote("EURUSD").await.unwrap();
        assert_eq!(q.bid, dec!(1.09995));
        assert_eq!(q.ask, dec!(1.10005));
        assert_eq!(q.server_time, 2 * 3600);
    }

    #[tokio::test]
    async fn test_tag_filters_positions() {
        let b = broker(flat_bars(3));
        b.fetch_candles("EURUSD", Timeframe::H1, 3).await.unwrap();
        b.place_order(&order(PositionDirection::Long, dec!(1.09), dec!(1.12)))
            .await
            .unwrap();
        assert!(b.get_open_position("EURUSD", 7).await.unwrap().is_some());
        assert!(b.get_open_position("EURUSD", 8).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stop_filled_on_next_bar() {
        let mut bars = flat_bars(3);
        bars.push(bar(3 * 3600, dec!(1.0950), dec!(1.1000), dec!(1.0960)));
        let b = broker(bars);
        b.fetch_candles("EURUSD", Timeframe::H1, 3).await.unwrap();
        let fill = b
            .place_order(&order(PositionDirection::Long, dec!(1.0970), dec!(1.1100)))
            .await
            .unwrap();
        assert_eq!(fill.fill_price, dec!(1.10005));

        assert_eq!(b.closed_fill(fill.ticket).await.unwrap(), None);

        b.fetch_candles("EURUSD", Timeframe::H1, 3).await.unwrap();
        assert!(b.get_open_position("EURUSD", 7).await.unwrap().is_none());
        // (1.0970 - 1.10005) = -30.5 pips × $10 × 1 lot
        assert_eq!(b.account_balance().await.unwrap(), dec!(9695));
        // Filled at the stop, not at the bar's close of 1.0960.
        assert_eq!(b.closed_fill(fill.ticket).await.unwrap(), Some(dec!(1.0970)));
    }

    #[tokio::test]
    async fn test_target_fill_recorded() {
        let mut bars = flat_bars(3);
        bars.push(bar(3 * 3600, dec!(1.0880), dec!(1.1000), dec!(1.0890)));
        let b = broker(bars);
        b.fetch_candles("EURUSD", Timeframe::H1, 3).await.unwrap();
        let fill = b
            .place_order(&order(PositionDirection::Short, dec!(1.1100), dec!(1.0900)))
            .await
            .unwrap();

        b.fetch_candles("EURUSD", Timeframe::H1, 3).await.unwrap();
        assert_eq!(b.closed_fill(fill.ticket).await.unwrap(), Some(dec!(1.0900)));
        // Short from 1.09995 to 1.0900: +99.5 pips
        assert_eq!(b.account_balance().await.unwrap(), dec!(10995));
    }

    #[tokio::test]
    async fn test_close_books_profit() {
        let mut bars = flat_bars(3);
        bars.push(bar(3 * 3600, dec!(1.1000), dec!(1.1030), dec!(1.1020)));
        let b = broker(bars);
        b.fetch_candles("EURUSD", Timeframe::H1, 3).await.unwrap();
        let fill = b
            .place_order(&order(PositionDirection::Short, dec!(1.1100), dec!(1.0900)))
            .await
            .unwrap();
        b.fetch_candles("EURUSD", Timeframe::H1, 3).await.unwrap();

        let price = b.close_position(fill.ticket).await.unwrap();
        assert_eq!(price, dec!(1.10205));
        // Short from 1.09995 to 1.10205: -21 pips
        assert_eq!(b.account_balance().await.unwrap(), dec!(9790));
        assert_eq!(b.closed_fill(fill.ticket).await.unwrap(), Some(dec!(1.10205)));
        assert!(b.close_position(fill.ticket).await.is_err());
    }

    #[tokio::test]
    async fn test_modify_stop_validation() {
        let b = broker(flat_bars(3));
        b.fetch_candles("EURUSD", Timeframe::H1, 3).await.unwrap();
        let fill = b
            .place_order(&order(PositionDirection::Long, dec!(1.0950), dec!(1.1100)))
            .await
            .unwrap();
        assert!(b.modify_stop(fill.ticket, dec!(1.0980)).await.is_ok());
        assert!(matches!(
            b.modify_stop(fill.ticket, dec!(1.1050)).await,
            Err(BotError::ModifyRejected { .. })
        ));
        assert!(b.modify_stop(99, dec!(1.0)).await.is_err());
    }

    #[tokio::test]
    async fn test_one_position_per_symbol() {
        let b = broker(flat_bars(3));
        b.fetch_candles("EURUSD", Timeframe::H1, 3).await.unwrap();
        b.place_order(&order(PositionDirection::Long, dec!(1.09), dec!(1.12)))
            .await
            .unwrap();
        let err = b
            .place_order(&order(PositionDirection::Short, dec!(1.12), dec!(1.09)))
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::OrderRejected { .. }));
    }

    #[test]
    fn test_load_candles_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("EURUSD.json");
        std::fs::write(&path, serde_json::to_string(&flat_bars(4)).unwrap()).unwrap();
        assert_eq!(load_candles(&path).unwrap().len(), 4);
        assert!(load_candles(&dir.path().join("missing.json")).is_err());
    }
}
