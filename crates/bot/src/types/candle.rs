use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single OHLCV bar. Immutable once fetched; windows are ordered
/// oldest to newest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bar open time, UNIX seconds.
    pub timestamp: i64,
    #[serde(with = "rust_decimal::serde::str")]
    pub open: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub high: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub low: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub close: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub volume: Decimal,
}

impl Candle {
    /// Absolute open-to-close distance.
    pub fn body(&self) -> Decimal {
        (self.close - self.open).abs()
    }

    /// High-to-low distance.
    pub fn range(&self) -> Decimal {
        self.high - self.low
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }
}

/// Top-of-book quote from the venue.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    #[serde(with = "rust_decimal::serde::str")]
    pub bid: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub ask: Decimal,
    /// Venue clock, UNIX seconds.
    pub server_time: i64,
}

impl Quote {
    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }

    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }
}
