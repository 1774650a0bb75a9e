use crate::browser::session::{BrowserSession, NavigateOptions};
use crate::browser::PageHandle;
use crate::data::types::{PriceHistory, Wear};
use crate::error::CollectorError;
use tracing::{error, info, warn};

pub const STEAM_PRICE_HISTORY_BASE: &str = "https://steamcommunity.com/market/pricehistory/";
pub const CS2_APP_ID: u32 = 730;

/// `FIELD_TESTED` -> `Field-Tested`; unknown codes pass through unchanged
pub fn wear_to_steam_format(wear: &str) -> String {
    Wear::from_code(wear)
        .map(|w| w.display_name().to_string())
        .unwrap_or_else(|| wear.to_string())
}

/// Strip trailing parenthesized groups: `"AK-47 | Redline (Field-Tested)"` -> `"AK-47 | Redline"`
pub fn clean_skin_name(skin_name: &str) -> String {
    let mut name = skin_name.trim();
    while let Some(stripped) = strip_trailing_group(name) {
        name = stripped;
    }
    name.to_string()
}

fn strip_trailing_group(name: &str) -> Option<&str> {
    let inner = name.strip_suffix(')')?;
    // Final group may not itself contain ')'
    let group_start = inner.rfind(')').map_or(0, |i| i + 1);
    let open = inner[group_start..].find('(')?;
    Some(inner[..group_start + open].trim_end())
}

/// `"AK-47 | Redline (Field-Tested)"`
pub fn market_hash_name(skin_name: &str, wear: &str) -> String {
    format!("{} ({})", clean_skin_name(skin_name), wear_to_steam_format(wear))
}

pub fn price_history_url(base: &str, app_id: u32, market_hash_name: &str) -> String {
    format!(
        "{}?appid={}&market_hash_name={}",
        base,
        app_id,
        urlencoding::encode(market_hash_name)
    )
}

/// Validate the JSON envelope Steam renders as the page body.
pub fn parse_price_history(body: &str) -> Result<PriceHistory, CollectorError> {
    serde_json::from_str(body.trim())
        .map_err(|e| CollectorError::Parse(format!("invalid price history body: {}", e)))
}

pub struct PriceHistoryService {
    base_url: String,
    app_id: u32,
}

impl PriceHistoryService {
    pub fn new() -> Self {
        Self::with_base_url(STEAM_PRICE_HISTORY_BASE.to_string(), CS2_APP_ID)
    }

    pub fn with_base_url(base_url: String, app_id: u32) -> Self {
        Self { base_url, app_id }
    }

    /// Fetch through the logged-in browser session.
    ///
    /// Navigation failures, `success=false` and malformed bodies all yield `None`.
    pub async fn fetch_price_history(
        &self,
        session: &BrowserSession,
        page: &PageHandle,
        skin_name: &str,
        wear: &str,
    ) -> Option<PriceHistory> {
        let cleaned = clean_skin_name(skin_name);
        let hash_name = market_hash_name(skin_name, wear);
        let url = price_history_url(&self.base_url, self.app_id, &hash_name);

        info!(
            original_skin_name = skin_name,
            cleaned_skin_name = %cleaned,
            wear,
            market_hash_name = %hash_name,
            url = %url,
            "Fetching price history from Steam"
        );

        if let Err(e) = session.navigate(page, &url, NavigateOptions::default()).await {
            error!(error = %e, skin_name, wear, "Error fetching price history");
            return None;
        }

        let body = match page.body_text().await {
            Ok(body) => body,
            Err(e) => {
                error!(error = %e, skin_name, wear, "Error reading price history page");
                return None;
            }
        };

        let history = match parse_price_history(&body) {
            Ok(history) => history,
            Err(e) => {
                error!(error = %e, skin_name, wear, "Error parsing price history");
                return None;
            }
        };

        if !history.success {
            warn!(skin_name, wear, "Steam returned success=false");
            return None;
        }

        info!(
            skin_name,
            wear,
            price_count = history.prices.len(),
            "Price history fetched successfully"
        );
        Some(history)
    }
}

impl Default for PriceHistoryService {
    fn default() -> Self {
        Self::new()
    }
}
