pub mod analysis;
pub mod candle;
pub mod position;
pub mod timeframe;
pub mod trade;

pub use analysis::*;
pub use candle::*;
pub use position::*;
pub use timeframe::Timeframe;
pub use trade::*;
