pub mod interval;
pub mod model;
pub mod session;

pub use interval::Interval;
pub use model::{Bar, DataArrival, GapInfo, QualitySnapshot, Quote, QuoteSource, StreamKind, Symbol, Tick};
pub use session::SessionData;
