//! Venue-facing collaborator contracts.
//!
//! The core never talks to a terminal directly; it consumes these traits.
//! Implementations return the typed [`BotError`] variants so callers can tell
//! skip-and-retry failures from connectivity loss.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::errors::BotError;
use crate::types::{Candle, OrderFill, OrderRequest, PositionRecord, Quote, Timeframe};

/// Historical bars and live quotes.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Up to `count` bars, oldest first.
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Candle>, BotError>;

    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, BotError>;
}

/// Order routing and account queries.
#[async_trait]
pub trait Execution: Send + Sync {
    /// The bot's open position for `symbol`, ignoring positions that do not
    /// carry `tag`. Venue-reported records carry no signal context, so
    /// `confidence_at_entry` and `structure_at_entry` are neutral.
    async fn get_open_position(
        &self,
        symbol: &str,
        tag: u64,
    ) -> Result<Option<PositionRecord>, BotError>;

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderFill, BotError>;

    /// Close at market; returns the fill price.
    async fn close_position(&self, ticket: u64) -> Result<Decimal, BotError>;

    async fn modify_stop(&self, ticket: u64, stop: Decimal) -> Result<(), BotError>;

    /// Fill price of a position the venue closed on its own (stop or
    /// target), if the venue still knows it.
    async fn closed_fill(&self, ticket: u64) -> Result<Option<Decimal>, BotError>;

    async fn account_balance(&self) -> Result<Decimal, BotError>;

    async fn account_equity(&self) -> Result<Decimal, BotError>;

    /// Re-establish the venue session after a `ConnectionLost`.
    async fn reconnect(&self) -> Result<(), BotError>;
}
