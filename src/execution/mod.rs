// Live order management and event routing
pub mod candle_window;
pub mod position_book;
pub mod router;
pub mod supervisor;
pub mod ticker;

#[cfg(test)]
pub(crate) mod test_support;

pub use candle_window::{CandleUpdate, CandleWindow};
pub use position_book::PositionBook;
pub use router::EventRouter;
pub use supervisor::{EventHandler, StreamSupervisor};
pub use ticker::SymbolTicker;
