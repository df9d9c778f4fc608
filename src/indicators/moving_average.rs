/// Simple moving average over the trailing `period` prices.
pub fn sma(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let window = &prices[prices.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// Exponential moving average over the full price slice.
///
/// Seeded with the simple average of the first `period` prices rather than
/// the first price alone, then smoothed forward over the remainder.
pub fn ema(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let seed = prices[..period].iter().sum::<f64>() / period as f64;

    Some(
        prices[period..]
            .iter()
            .fold(seed, |current, price| (price - current) * alpha + current),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma_trailing_window() {
        let prices = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        // Uses the last 3 prices, not the first 3.
        assert_eq!(sma(&prices, 3), Some(5.0));
        assert_eq!(sma(&prices, 6), Some(3.5));
    }

    #[test]
    fn test_sma_insufficient_data() {
        assert_eq!(sma(&[100.0, 101.0], 3), None);
        assert_eq!(sma(&[], 1), None);
        assert_eq!(sma(&[100.0], 0), None);
    }

    #[test]
    fn test_ema_seeds_from_simple_average() {
        // With exactly `period` prices the EMA is the seed itself.
        let prices = vec![10.0, 20.0, 30.0];
        assert_eq!(ema(&prices, 3), Some(20.0));
    }

    #[test]
    fn test_ema_hand_computed() {
        // period = 2, alpha = 2/3. seed = (2 + 4) / 2 = 3.
        // step 6: 3 + (6 - 3) * 2/3 = 5.
        // step 9: 5 + (9 - 5) * 2/3 = 7.666...
        let prices = vec![2.0, 4.0, 6.0, 9.0];
        let value = ema(&prices, 2).unwrap();
        assert!((value - (5.0 + 4.0 * 2.0 / 3.0)).abs() < 1e-12);
    }

    #[test]
    fn test_ema_insufficient_data() {
        assert_eq!(ema(&[100.0, 102.0], 5), None);
    }

    #[test]
    fn test_ema_tracks_rising_prices_above_sma_seed() {
        let prices = vec![100.0, 102.0, 104.0, 106.0, 108.0, 110.0];
        let value = ema(&prices, 5).unwrap();
        // Seed (SMA of first 5) is 104; later prices pull the EMA above it.
        assert!(value > 104.0);
        assert!(value < 110.0);
    }
}
