//! Technical indicators over close-price series
//!
//! All functions return a vector the same length as the input with NaN in
//! positions where the indicator is not yet defined (talib layout). Callers
//! treat NaN as "condition not satisfied".

/// Simple moving average. NaN until `period` values are available, and
/// wherever the window contains a NaN.
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    for i in (period - 1)..values.len() {
        let window = &values[i + 1 - period..=i];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        out[i] = window.iter().sum::<f64>() / period as f64;
    }
    out
}

/// Rolling population standard deviation, matching the Bollinger Band
/// convention.
pub fn stddev(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    for i in (period - 1)..values.len() {
        let window = &values[i + 1 - period..=i];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        let mean = window.iter().sum::<f64>() / period as f64;
        let variance = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / period as f64;
        out[i] = variance.sqrt();
    }
    out
}

/// Bollinger Bands: (upper, middle, lower) at `std_dev` deviations around
/// the SMA.
pub fn bbands(values: &[f64], period: usize, std_dev: f64) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let middle = sma(values, period);
    let sd = stddev(values, period);
    let upper = middle
        .iter()
        .zip(&sd)
        .map(|(m, s)| m + std_dev * s)
        .collect();
    let lower = middle
        .iter()
        .zip(&sd)
        .map(|(m, s)| m - std_dev * s)
        .collect();
    (upper, middle, lower)
}

/// Relative Strength Index with classic Wilder smoothing. First defined
/// value sits at index `period`. A window with no losses reads 100.
pub fn rsi(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.len() <= period {
        return out;
    }

    let to_rsi = |avg_gain: f64, avg_loss: f64| {
        if avg_loss == 0.0 {
            100.0
        } else {
            let rs = avg_gain / avg_loss;
            100.0 - 100.0 / (1.0 + rs)
        }
    };

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let change = values[i] - values[i - 1];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss -= change;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    out[period] = to_rsi(avg_gain, avg_loss);

    for i in (period + 1)..values.len() {
        let change = values[i] - values[i - 1];
        let (gain, loss) = if change > 0.0 {
            (change, 0.0)
        } else {
            (0.0, -change)
        };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
        out[i] = to_rsi(avg_gain, avg_loss);
    }
    out
}

/// Fractional rate of change over `period`: `(v_t - v_{t-n}) / v_{t-n}`.
/// NaN where either endpoint is NaN or the reference value is zero.
pub fn roc(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 {
        return out;
    }
    for i in period..values.len() {
        let prev = values[i - period];
        let cur = values[i];
        if prev.is_nan() || cur.is_nan() || prev == 0.0 {
            continue;
        }
        out[i] = (cur - prev) / prev;
    }
    out
}
