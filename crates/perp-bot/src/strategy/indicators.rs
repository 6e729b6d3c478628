//! Technical indicators over f64 price series.
//!
//! Money stays in `Decimal` everywhere else; indicator math is dimensionless
//! and runs on plain floats.

/// Relative Strength Index over the last `period` price changes.
///
/// Returns 50.0 (neutral) when there is not enough data, 100.0 when there
/// are no losses in the window.
pub fn rsi(prices: &[f64], period: usize) -> f64 {
    if period == 0 || prices.len() < period + 1 {
        return 50.0;
    }

    let mut gains = 0.0;
    let mut losses = 0.0;
    for i in (prices.len() - period)..prices.len() {
        let change = prices[i] - prices[i - 1];
        if change > 0.0 {
            gains += change;
        } else {
            losses += -change;
        }
    }

    let avg_gain = gains / period as f64;
    let avg_loss = losses / period as f64;
    if avg_loss == 0.0 {
        return 100.0;
    }

    let rs = avg_gain / avg_loss;
    100.0 - (100.0 / (1.0 + rs))
}

/// Bollinger band levels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Bollinger bands: SMA +/- `std_dev_mult` standard deviations.
///
/// With fewer than `period` prices all bands collapse to the last price.
pub fn bollinger_bands(prices: &[f64], period: usize, std_dev_mult: f64) -> BollingerBands {
    let Some(&last) = prices.last() else {
        return BollingerBands {
            upper: 0.0,
            middle: 0.0,
            lower: 0.0,
        };
    };
    if period == 0 || prices.len() < period {
        return BollingerBands {
            upper: last,
            middle: last,
            lower: last,
        };
    }

    let window = &prices[prices.len() - period..];
    let mean = window.iter().sum::<f64>() / period as f64;
    let variance = window.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / period as f64;
    let std_dev = variance.sqrt();

    BollingerBands {
        upper: mean + std_dev_mult * std_dev,
        middle: mean,
        lower: mean - std_dev_mult * std_dev,
    }
}

/// Simple moving average of the last `period` prices (or all of them when
/// fewer are available).
pub fn sma(prices: &[f64], period: usize) -> f64 {
    if prices.is_empty() {
        return 0.0;
    }
    let period = period.min(prices.len()).max(1);
    let window = &prices[prices.len() - period..];
    window.iter().sum::<f64>() / period as f64
}

/// Exponential moving average seeded with the SMA of the first `period`
/// prices.
pub fn ema(prices: &[f64], period: usize) -> f64 {
    if prices.is_empty() {
        return 0.0;
    }
    if period == 0 || prices.len() < period {
        return sma(prices, prices.len());
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut value = sma(&prices[..period], period);
    for price in &prices[period..] {
        value = (price - value) * multiplier + value;
    }
    value
}

/// Average True Range over the last `period` bars.
pub fn atr(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> f64 {
    let len = highs.len().min(lows.len()).min(closes.len());
    if len < 2 {
        return 0.0;
    }

    let start = if len > period { len - period } else { 1 };
    let mut sum = 0.0;
    let mut count = 0;
    for i in start..len {
        let tr = (highs[i] - lows[i])
            .max((highs[i] - closes[i - 1]).abs())
            .max((lows[i] - closes[i - 1]).abs());
        sum += tr;
        count += 1;
    }

    if count == 0 {
        return 0.0;
    }
    sum / count as f64
}
