pub mod broker;
pub mod paper;

pub use broker::{Execution, MarketData};
pub use paper::PaperBroker;
