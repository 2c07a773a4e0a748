use super::moving_average::calculate_ema_series;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Macd {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// Calculate MACD for the latest price
///
/// # Arguments
/// * `fast` / `slow` - EMA periods for the MACD line
/// * `signal` - EMA period applied to the MACD line
pub fn calculate_macd(prices: &[f64], fast: usize, slow: usize, signal: usize) -> Option<Macd> {
    calculate_macd_series(prices, fast, slow, signal)?.last().copied()
}

/// MACD for every price from index `slow + signal - 2` on
pub fn calculate_macd_series(
    prices: &[f64],
    fast: usize,
    slow: usize,
    signal: usize,
) -> Option<Vec<Macd>> {
    if fast >= slow {
        return None;
    }

    let fast_series = calculate_ema_series(prices, fast)?;
    let slow_series = calculate_ema_series(prices, slow)?;

    // Align both series on the slow EMA's first value
    let offset = slow - fast;
    let macd_line: Vec<f64> = slow_series
        .iter()
        .zip(&fast_series[offset..])
        .map(|(slow_ema, fast_ema)| fast_ema - slow_ema)
        .collect();

    let signal_series = calculate_ema_series(&macd_line, signal)?;
    let skip = macd_line.len() - signal_series.len();

    Some(
        macd_line[skip..]
            .iter()
            .zip(&signal_series)
            .map(|(&macd, &signal)| Macd {
                macd,
                signal,
                histogram: macd - signal,
            })
            .collect(),
    )
}
