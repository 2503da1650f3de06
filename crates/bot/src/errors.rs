use thiserror::Error;

/// Typed error hierarchy for the trend bot.
///
/// Library-internal errors use specific variants; application code wraps with
/// `anyhow::Context` for propagation. No variant is fatal to the control loop:
/// each is either skip-and-retry or a soft degrade.
#[derive(Error, Debug)]
pub enum BotError {
    // -- Market data --------------------------------------------------------
    #[error("candle data unavailable for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    #[error("quote unavailable for {symbol}")]
    QuoteUnavailable { symbol: String },

    #[error("spread {spread} exceeds limit {limit} for {symbol}")]
    SpreadTooWide {
        symbol: String,
        spread: String,
        limit: String,
    },

    // -- Execution ----------------------------------------------------------
    #[error("order rejected: {reason}")]
    OrderRejected { reason: String },

    #[error("close rejected for ticket {ticket}: {reason}")]
    CloseRejected { ticket: u64, reason: String },

    #[error("stop modification rejected for ticket {ticket}: {reason}")]
    ModifyRejected { ticket: u64, reason: String },

    #[error("execution venue connection lost: {reason}")]
    ConnectionLost { reason: String },

    // -- Risk ---------------------------------------------------------------
    #[error("daily loss limit breached: {loss_pct:.2}% (limit {limit_pct:.2}%)")]
    DailyLossBreached { loss_pct: f64, limit_pct: f64 },

    #[error("safety gate blocked: {reason}")]
    SafetyBlocked { reason: String },

    // -- Configuration ------------------------------------------------------
    #[error("invalid configuration for {field}: {reason}")]
    ConfigInvalid { field: String, reason: String },

    // -- Forwarded errors ---------------------------------------------------
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BotError {
    /// Errors that mean the execution venue is unreachable and the bot should
    /// enter degraded mode.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::ConnectionLost { .. })
    }

    /// Errors that only cost the current cycle for one instrument.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            Self::DataUnavailable { .. } | Self::QuoteUnavailable { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connectivity_classification() {
        let e = BotError::ConnectionLost {
            reason: "socket closed".into(),
        };
        assert!(e.is_connectivity());
        assert!(!e.is_skippable());

        let e = BotError::OrderRejected {
            reason: "no money".into(),
        };
        assert!(!e.is_connectivity());
    }

    #[test]
    fn test_display_messages() {
        let e = BotError::DailyLossBreached {
            loss_pct: 5.5,
            limit_pct: 5.0,
        };
        assert_eq!(
            e.to_string(),
            "daily loss limit breached: 5.50% (limit 5.00%)"
        );

        let e = BotError::QuoteUnavailable {
            symbol: "EURUSD".into(),
        };
        assert!(e.is_skippable());
        assert!(e.to_string().contains("EURUSD"));
    }
}
