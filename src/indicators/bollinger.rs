use super::moving_average::calculate_sma;

/// Bollinger bands around a simple moving average
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerBands {
    pub middle: f64,
    pub upper: f64,
    pub lower: f64,
}

/// Calculate Bollinger bands over the last `period` prices
///
/// # Arguments
/// * `prices` - Price series, oldest first
/// * `period` - Moving average window
/// * `num_std` - Band width in population standard deviations
pub fn calculate_bollinger(prices: &[f64], period: usize, num_std: f64) -> Option<BollingerBands> {
    let middle = calculate_sma(prices, period)?;

    let variance = prices
        .iter()
        .rev()
        .take(period)
        .map(|p| (p - middle).powi(2))
        .sum::<f64>()
        / period as f64;
    let width = variance.sqrt() * num_std;

    Some(BollingerBands {
        middle,
        upper: middle + width,
        lower: middle - width,
    })
}
