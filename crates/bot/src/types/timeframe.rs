//! Candle timeframes used when requesting bars from the market-data venue.
//!
//! Names follow the common terminal convention (`M1` … `MN1`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported bar timeframes.
///
/// Ordered from shortest to longest for iteration purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum Timeframe {
    /// 1-minute bars
    M1,
    /// 5-minute bars
    M5,
    /// 15-minute bars
    M15,
    /// 30-minute bars
    M30,
    /// 1-hour bars
    H1,
    /// 4-hour bars
    H4,
    /// Daily bars
    D1,
    /// Weekly bars
    W1,
    /// Monthly bars
    MN1,
}

impl Timeframe {
    /// All timeframes in ascending order (shortest to longest).
    pub const ALL: [Timeframe; 9] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
        Timeframe::W1,
        Timeframe::MN1,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::M1 => "M1",
            Self::M5 => "M5",
            Self::M15 => "M15",
            Self::M30 => "M30",
            Self::H1 => "H1",
            Self::H4 => "H4",
            Self::D1 => "D1",
            Self::W1 => "W1",
            Self::MN1 => "MN1",
        }
    }

    /// Parse a terminal-style timeframe name (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|tf| tf.as_str().eq_ignore_ascii_case(s.trim()))
    }

    /// Bar duration in seconds. Months are scheduled as 30 days.
    #[must_use]
    pub const fn duration_secs(&self) -> u64 {
        match self {
            Self::M1 => 60,
            Self::M5 => 300,
            Self::M15 => 900,
            Self::M30 => 1800,
            Self::H1 => 3600,
            Self::H4 => 14_400,
            Self::D1 => 86_400,
            Self::W1 => 604_800,
            Self::MN1 => 2_592_000,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeframe_parse_roundtrip() {
        for tf in Timeframe::ALL {
            assert_eq!(Timeframe::parse(tf.as_str()), Some(tf));
        }
        assert_eq!(Timeframe::parse("h1"), Some(Timeframe::H1));
        assert_eq!(Timeframe::parse("2h"), None);
    }

    #[test]
    fn test_timeframe_duration() {
        assert_eq!(Timeframe::M1.duration_secs(), 60);
        assert_eq!(Timeframe::H1.duration_secs(), 3600);
        assert_eq!(Timeframe::D1.duration_secs(), 86_400);
    }

    #[test]
    fn test_timeframe_ordering() {
        assert!(Timeframe::M1 < Timeframe::H1);
        assert!(Timeframe::W1 < Timeframe::MN1);
    }

    #[test]
    fn test_timeframe_serde_uppercase() {
        let tf: Timeframe = serde_json::from_str("\"H4\"").unwrap();
        assert_eq!(tf, Timeframe::H4);
        assert_eq!(serde_json::to_string(&Timeframe::MN1).unwrap(), "\"MN1\"");
    }
}
