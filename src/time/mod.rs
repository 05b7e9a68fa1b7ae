pub mod calendar;
pub mod manager;

pub use calendar::{AssetClass, CalendarStore, ExchangeGroup, ExchangeId, Holiday, MarketHours, TradingSession};
pub use manager::TimeManager;
