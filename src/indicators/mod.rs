// Technical indicators module
// Pure functions over price series, oldest first

pub mod bollinger;
pub mod macd;
pub mod moving_average;
pub mod rsi;

pub use bollinger::{calculate_bollinger, BollingerBands};
pub use macd::{calculate_macd, calculate_macd_series, Macd};
pub use moving_average::{calculate_ema, calculate_ema_series, calculate_sma};
pub use rsi::{calculate_rsi, calculate_rsi_series};
