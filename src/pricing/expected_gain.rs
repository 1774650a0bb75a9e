//! Expected gain shown next to each listing on the dashboard.
//!
//! The exchange rates here are fixed approximations (BRL/5, EUR*1.1), not live
//! quotes. The figure is a display heuristic only.

/// Steam keeps 15% of every sale
pub const STEAM_SELLER_FEE: f64 = 0.15;

const BRL_PER_USD: f64 = 5.0;
const USD_PER_EUR: f64 = 1.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Currency {
    Usd,
    Brl,
    Eur,
}

impl Currency {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "USD" => Some(Currency::Usd),
            "BRL" => Some(Currency::Brl),
            "EUR" => Some(Currency::Eur),
            _ => None,
        }
    }

    /// Approximate conversion of minor units into USD cents
    pub fn to_usd_cents(&self, amount: i64) -> i64 {
        match self {
            Currency::Usd => amount,
            Currency::Brl => (amount as f64 / BRL_PER_USD).round() as i64,
            Currency::Eur => (amount as f64 * USD_PER_EUR).round() as i64,
        }
    }
}

/// What a seller would pocket on Steam minus what the item costs on the marketplace.
///
/// `market_price` is in minor units of `market_currency`; unknown currencies are
/// treated as USD. `steam_price` is in USD cents. Returns `None` without a Steam price.
pub fn expected_gain_cents(
    market_price: i64,
    market_currency: &str,
    steam_price: Option<i64>,
) -> Option<i64> {
    let steam_price = steam_price?;

    let market_price_usd = Currency::from_code(market_currency)
        .unwrap_or(Currency::Usd)
        .to_usd_cents(market_price);

    let steam_after_fee = (steam_price as f64 * (1.0 - STEAM_SELLER_FEE)).round() as i64;

    Some(steam_after_fee - market_price_usd)
}
