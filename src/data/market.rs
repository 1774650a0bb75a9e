//! Everything the collector needs from the Steam market, behind one seam.

use crate::browser::session::BrowserSession;
use crate::browser::PageHandle;
use crate::clock::Clock;
use crate::config::WatchlistEntry;
use crate::data::buy_orders::BuyOrderClient;
use crate::data::item_nameid::ItemNameIdResolver;
use crate::data::listings::ListingScraper;
use crate::data::price_history::PriceHistoryService;
use crate::data::types::{ItemData, PriceHistory};
use crate::error::CollectorError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

#[async_trait]
pub trait MarketData: Send {
    /// Load whatever must exist before the first task (item_nameid snapshot).
    async fn initialize(&mut self) -> Result<(), CollectorError>;

    async fn price_history(
        &mut self,
        session: &BrowserSession,
        page: &PageHandle,
        skin_name: &str,
        wear: &str,
    ) -> Option<PriceHistory>;

    /// Best buy order in cents; `None` when the item or its book is unknown.
    async fn lowest_buy_order(&mut self, skin_name: &str, wear: &str) -> Option<i64>;

    async fn scrape_items(
        &mut self,
        session: &BrowserSession,
        page: &PageHandle,
        items: &[WatchlistEntry],
    ) -> Vec<ItemData>;
}

pub struct SteamMarketData {
    history: PriceHistoryService,
    item_ids: ItemNameIdResolver,
    buy_orders: BuyOrderClient,
    listings: ListingScraper,
}

impl SteamMarketData {
    pub fn new(
        history: PriceHistoryService,
        item_ids: ItemNameIdResolver,
        buy_orders: BuyOrderClient,
        listings: ListingScraper,
    ) -> Self {
        Self {
            history,
            item_ids,
            buy_orders,
            listings,
        }
    }

    /// Production wiring against the public Steam endpoints.
    pub fn connect(clock: Arc<dyn Clock>, rate_limit_delay: Duration) -> Result<Self, CollectorError> {
        Ok(Self::new(
            PriceHistoryService::new(),
            ItemNameIdResolver::http(clock.clone())?,
            BuyOrderClient::new()?,
            ListingScraper::new(clock, rate_limit_delay),
        ))
    }
}

#[async_trait]
impl MarketData for SteamMarketData {
    async fn initialize(&mut self) -> Result<(), CollectorError> {
        self.item_ids.initialize().await
    }

    async fn price_history(
        &mut self,
        session: &BrowserSession,
        page: &PageHandle,
        skin_name: &str,
        wear: &str,
    ) -> Option<PriceHistory> {
        self.history.fetch_price_history(session, page, skin_name, wear).await
    }

    async fn lowest_buy_order(&mut self, skin_name: &str, wear: &str) -> Option<i64> {
        let item_nameid = match self.item_ids.resolve(skin_name, wear).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                debug!(skin_name, wear, "No item_nameid, skipping buy order lookup");
                return None;
            }
            Err(e) => {
                error!(error = %e, skin_name, wear, "Item name ID lookup failed");
                return None;
            }
        };

        self.buy_orders.fetch_highest_buy_order(item_nameid).await
    }

    async fn scrape_items(
        &mut self,
        session: &BrowserSession,
        page: &PageHandle,
        items: &[WatchlistEntry],
    ) -> Vec<ItemData> {
        self.listings.scrape_multiple_items(session, page, items).await
    }
}
