use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::analysis::StructureLabel;

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionDirection {
    Long,
    Short,
}

impl PositionDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Long => "LONG",
            Self::Short => "SHORT",
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
        }
    }

    /// `+1` for long, `-1` for short.
    pub fn sign(&self) -> Decimal {
        match self {
            Self::Long => Decimal::ONE,
            Self::Short => Decimal::NEGATIVE_ONE,
        }
    }
}

/// Signal context present when a position was opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryFlags {
    pub sweep: bool,
    pub bos: bool,
    pub displacement: bool,
}

/// An open position owned by the lifecycle manager for one symbol.
///
/// Only the stop is ever mutated after entry (trailing updates).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub ticket: u64,
    pub symbol: String,
    pub direction: PositionDirection,
    #[serde(with = "rust_decimal::serde::str")]
    pub entry_price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub volume: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub stop_price: Decimal,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub target_price: Option<Decimal>,
    /// UNIX seconds.
    pub open_time: i64,
    pub confidence_at_entry: u8,
    pub structure_at_entry: StructureLabel,
    #[serde(default)]
    pub entry_flags: EntryFlags,
}

/// Order sent to the execution venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub direction: PositionDirection,
    #[serde(with = "rust_decimal::serde::str")]
    pub volume: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub stop: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub target: Decimal,
    /// Bot identifier so foreign positions can be told apart.
    pub tag: u64,
    pub comment: String,
}

/// Venue acknowledgement of a filled order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderFill {
    pub ticket: u64,
    #[serde(with = "rust_decimal::serde::str")]
    pub fill_price: Decimal,
}
