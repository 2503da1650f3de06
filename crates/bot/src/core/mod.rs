pub mod engine;
pub mod lifecycle;
pub mod market_structure;
pub mod performance;
pub mod risk_sizer;
pub mod safety;
pub mod signal_scorer;
pub mod trend_filter;
pub mod volatility;
