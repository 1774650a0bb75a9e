use crate::data::types::{PriceMetrics, PriceSample};
use tracing::{debug, warn};

/// Major units (dollars) to integer minor units (cents), rounding half away from zero
pub fn to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// Mean of the last `count` sale prices, in cents.
///
/// Uses every sample when the history is shorter than `count`.
/// Returns `None` for an empty history.
pub fn average_price_cents(prices: &[PriceSample], count: usize) -> Option<i64> {
    if prices.is_empty() || count == 0 {
        warn!("Price history is empty");
        return None;
    }

    let window = &prices[prices.len().saturating_sub(count)..];
    let sum: f64 = window.iter().map(PriceSample::price).sum();
    let average = sum / window.len() as f64;
    let cents = to_cents(average);

    debug!(
        total_prices = prices.len(),
        used_for_average = window.len(),
        configured_count = count,
        average,
        cents,
        "Average price calculated"
    );

    Some(cents)
}

/// Price of the most recent sale. History is chronologically ascending.
pub fn last_sale_price_cents(prices: &[PriceSample]) -> Option<i64> {
    let Some(last) = prices.last() else {
        warn!("Price history is empty, cannot get last sale price");
        return None;
    };

    let cents = to_cents(last.price());
    debug!(price = last.price(), cents, date = last.date(), "Last sale price extracted");
    Some(cents)
}

impl PriceMetrics {
    pub fn from_history(prices: &[PriceSample], average_count: usize) -> Self {
        Self {
            average_price: average_price_cents(prices, average_count),
            last_sale_price: last_sale_price_cents(prices),
            lowest_buy_order_price: None,
        }
    }

    pub fn with_buy_order(mut self, cents: Option<i64>) -> Self {
        self.lowest_buy_order_price = cents;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(prices: &[f64]) -> Vec<PriceSample> {
        prices
            .iter()
            .enumerate()
            .map(|(i, p)| PriceSample(format!("day {}", i), *p, 1))
            .collect()
    }

    #[test]
    fn test_average_of_three() {
        assert_eq!(average_price_cents(&history(&[10.0, 12.0, 14.0]), 3), Some(1200));
        assert_eq!(average_price_cents(&history(&[10.0, 12.0, 14.0]), 10), Some(1200));
    }

    #[test]
    fn test_average_uses_only_most_recent_entries() {
        // Last two: 20.0 and 30.0
        assert_eq!(average_price_cents(&history(&[1.0, 20.0, 30.0]), 2), Some(2500));
    }

    #[test]
    fn test_average_rounds_to_nearest_cent() {
        // (1.0 + 2.0) / 2 = 1.5 -> 150 cents
        assert_eq!(average_price_cents(&history(&[1.0, 2.0]), 10), Some(150));
        // (1.0 + 1.0 + 1.01) / 3 = 1.00333 -> 100 cents
        assert_eq!(average_price_cents(&history(&[1.0, 1.0, 1.01]), 10), Some(100));
    }

    #[test]
    fn test_average_of_empty_history() {
        assert_eq!(average_price_cents(&[], 10), None);
    }

    #[test]
    fn test_last_sale() {
        let samples = vec![
            PriceSample("d1".to_string(), 5.00, 2),
            PriceSample("d2".to_string(), 7.50, 1),
        ];
        assert_eq!(last_sale_price_cents(&samples), Some(750));
        assert_eq!(last_sale_price_cents(&[]), None);
    }

    #[test]
    fn test_to_cents() {
        assert_eq!(to_cents(12.34), 1234);
        assert_eq!(to_cents(0.999), 100);
        assert_eq!(to_cents(0.0), 0);
    }

    #[test]
    fn test_metrics_from_history() {
        let metrics = PriceMetrics::from_history(&history(&[10.0, 12.0, 14.0]), 10)
            .with_buy_order(Some(990));

        assert_eq!(metrics.average_price, Some(1200));
        assert_eq!(metrics.last_sale_price, Some(1400));
        assert_eq!(metrics.lowest_buy_order_price, Some(990));
    }
}
