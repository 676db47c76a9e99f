pub mod bar;
pub mod date_key;
pub mod instrument;
pub mod timeframe;

pub use bar::{Bar, OutOfHoursTick};
pub use date_key::DateKey;
pub use instrument::{Instrument, MarketKind, StockCode, TradingStatus};
pub use timeframe::Timeframe;
