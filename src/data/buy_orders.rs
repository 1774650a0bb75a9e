use crate::error::{ApiError, CollectorError};
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const STEAM_HISTOGRAM_URL: &str = "https://steamcommunity.com/market/itemordershistogram";

const HISTOGRAM_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// `[price, quantity, description]`
pub type OrderGraphPoint = (f64, u64, String);

/// Order-book snapshot returned by `itemordershistogram`.
#[derive(Debug, Clone, Deserialize)]
pub struct HistogramResponse {
    #[serde(deserialize_with = "deserialize_success")]
    pub success: bool,
    #[serde(default)]
    pub highest_buy_order: Option<String>,
    #[serde(default)]
    pub lowest_sell_order: Option<String>,
    #[serde(default)]
    pub buy_order_graph: Vec<OrderGraphPoint>,
    #[serde(default)]
    pub sell_order_graph: Vec<OrderGraphPoint>,
    #[serde(default)]
    pub price_prefix: Option<String>,
    #[serde(default)]
    pub price_suffix: Option<String>,
}

/// Steam sends `1`/`0` here; accept booleans as well.
fn deserialize_success<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(n) => n != 0,
    })
}

pub fn histogram_url(base: &str, item_nameid: u64) -> String {
    format!(
        "{}?country=PK&language=english&currency=1&item_nameid={}&two_factor=0&norender=1",
        base, item_nameid
    )
}

/// The first buy-order entry is the best bid; its price in cents.
pub fn highest_buy_order_cents(histogram: &HistogramResponse) -> Option<i64> {
    histogram
        .buy_order_graph
        .first()
        .map(|(price, _, _)| (price * 100.0).round() as i64)
}

pub fn parse_histogram(body: &str) -> Result<HistogramResponse, CollectorError> {
    serde_json::from_str(body)
        .map_err(|e| CollectorError::Parse(format!("invalid order histogram: {}", e)))
}

/// Direct HTTP client for the order histogram; never goes through the browser.
pub struct BuyOrderClient {
    client: Client,
    base_url: String,
}

impl BuyOrderClient {
    pub fn new() -> Result<Self, CollectorError> {
        Self::with_base_url(STEAM_HISTOGRAM_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, CollectorError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(HISTOGRAM_USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    async fn request(&self, item_nameid: u64) -> Result<HistogramResponse, CollectorError> {
        let url = histogram_url(&self.base_url, item_nameid);
        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        debug!(method = "GET", url = %url, status = status.as_u16(), "Histogram response");
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                url,
            }
            .into());
        }

        parse_histogram(&response.text().await?)
    }

    /// Best current bid in cents. Errors, `success=false` and an empty book yield `None`.
    pub async fn fetch_highest_buy_order(&self, item_nameid: u64) -> Option<i64> {
        debug!(item_nameid, "Fetching buy orders for item");

        let histogram = match self.request(item_nameid).await {
            Ok(histogram) => histogram,
            Err(e) => {
                error!(item_nameid, error = %e, "Failed to fetch buy orders");
                return None;
            }
        };

        if !histogram.success {
            warn!(item_nameid, "Buy order request was not successful");
            return None;
        }

        let Some((price, quantity, _)) = histogram.buy_order_graph.first() else {
            warn!(item_nameid, "No buy orders found for item");
            return None;
        };

        let cents = highest_buy_order_cents(&histogram)?;
        info!(
            item_nameid,
            price_usd = price,
            price_in_cents = cents,
            quantity,
            "Successfully retrieved highest buy order"
        );
        Some(cents)
    }

    /// Raw histogram, for diagnostics.
    pub async fn fetch_full_histogram(&self, item_nameid: u64) -> Option<HistogramResponse> {
        match self.request(item_nameid).await {
            Ok(histogram) => Some(histogram),
            Err(e) => {
                error!(item_nameid, error = %e, "Failed to fetch full histogram");
                None
            }
        }
    }
}
