/// Calculate Relative Strength Index (RSI) series with Wilder smoothing
///
/// The first value averages the first `period` changes; each later value
/// smooths as `(prev * (period - 1) + current) / period`.
///
/// Values:
/// - RSI > 70: Overbought
/// - RSI < 30: Oversold
///
/// Returns one value per price from index `period` on.
pub fn calculate_rsi_series(prices: &[f64], period: usize) -> Option<Vec<f64>> {
    if period == 0 || prices.len() < period + 1 {
        return None;
    }

    let changes: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();
    let gain = |change: f64| change.max(0.0);
    let loss = |change: f64| (-change).max(0.0);

    let period_f = period as f64;
    let mut avg_gain = changes[..period].iter().map(|&c| gain(c)).sum::<f64>() / period_f;
    let mut avg_loss = changes[..period].iter().map(|&c| loss(c)).sum::<f64>() / period_f;

    let mut series = Vec::with_capacity(changes.len() - period + 1);
    series.push(rsi_value(avg_gain, avg_loss));

    for &change in &changes[period..] {
        avg_gain = (avg_gain * (period_f - 1.0) + gain(change)) / period_f;
        avg_loss = (avg_loss * (period_f - 1.0) + loss(change)) / period_f;
        series.push(rsi_value(avg_gain, avg_loss));
    }

    Some(series)
}

/// RSI of the latest price
pub fn calculate_rsi(prices: &[f64], period: usize) -> Option<f64> {
    calculate_rsi_series(prices, period)?.last().copied()
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - (100.0 / (1.0 + rs))
}
