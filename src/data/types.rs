use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Work item owned by the backend; read here and reported back once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryUpdateTask {
    pub id: i64,
    pub skin_name: String,
    pub wear: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub finished_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Waiting,
    Processing,
    Completed,
    Failed,
}

/// Condition grade of a skin, as sent by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Wear {
    FactoryNew,
    MinimalWear,
    FieldTested,
    WellWorn,
    BattleScarred,
}

impl Wear {
    pub const ALL: [Wear; 5] = [
        Wear::FactoryNew,
        Wear::MinimalWear,
        Wear::FieldTested,
        Wear::WellWorn,
        Wear::BattleScarred,
    ];

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "FACTORY_NEW" => Some(Wear::FactoryNew),
            "MINIMAL_WEAR" => Some(Wear::MinimalWear),
            "FIELD_TESTED" => Some(Wear::FieldTested),
            "WELL_WORN" => Some(Wear::WellWorn),
            "BATTLE_SCARRED" => Some(Wear::BattleScarred),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Wear::FactoryNew => "FACTORY_NEW",
            Wear::MinimalWear => "MINIMAL_WEAR",
            Wear::FieldTested => "FIELD_TESTED",
            Wear::WellWorn => "WELL_WORN",
            Wear::BattleScarred => "BATTLE_SCARRED",
        }
    }

    /// Spelling used inside Steam market hash names
    pub fn display_name(&self) -> &'static str {
        match self {
            Wear::FactoryNew => "Factory New",
            Wear::MinimalWear => "Minimal Wear",
            Wear::FieldTested => "Field-Tested",
            Wear::WellWorn => "Well-Worn",
            Wear::BattleScarred => "Battle-Scarred",
        }
    }

    pub fn abbreviation(&self) -> &'static str {
        match self {
            Wear::FactoryNew => "FN",
            Wear::MinimalWear => "MW",
            Wear::FieldTested => "FT",
            Wear::WellWorn => "WW",
            Wear::BattleScarred => "BS",
        }
    }
}

impl fmt::Display for Wear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// One `[date, price, volume]` row of a Steam price history.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PriceSample(
    pub String,
    pub f64,
    #[serde(deserialize_with = "deserialize_volume")] pub u64,
);

impl PriceSample {
    pub fn date(&self) -> &str {
        &self.0
    }

    pub fn price(&self) -> f64 {
        self.1
    }

    pub fn volume(&self) -> u64 {
        self.2
    }
}

/// Steam reports volume as a quoted string ("12"); accept numbers too.
fn deserialize_volume<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Volume {
        Number(u64),
        Text(String),
    }

    match Volume::deserialize(deserializer)? {
        Volume::Number(n) => Ok(n),
        Volume::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Envelope returned by `/market/pricehistory/`.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceHistory {
    pub success: bool,
    #[serde(default)]
    pub price_prefix: String,
    #[serde(default)]
    pub price_suffix: String,
    #[serde(default)]
    pub prices: Vec<PriceSample>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
}

/// Derived from live cookies on demand; never stored.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub is_logged_in: bool,
    pub session_id: Option<String>,
    pub steam_id: Option<String>,
    pub cookies: Vec<SessionCookie>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemSource {
    Steam,
    Bitskins,
}

/// One listing scrape, forwarded to the backend and then dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemData {
    pub name: String,
    pub price: f64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub market_hash_name: String,
    pub app_id: u32,
    pub timestamp: DateTime<Utc>,
    pub source: ItemSource,
    pub url: String,
}

#[derive(Debug, Clone)]
pub enum ScrapeResult {
    Success(ItemData),
    Failure(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub app_id: u32,
    pub market_hash_name: String,
    pub name: String,
}

/// Minor-unit metrics computed for one task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PriceMetrics {
    pub average_price: Option<i64>,
    pub last_sale_price: Option<i64>,
    pub lowest_buy_order_price: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteTaskPayload {
    pub skin_name: String,
    pub wear: String,
    pub average_price: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sale_price: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lowest_buy_order_price: Option<i64>,
}
