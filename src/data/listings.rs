use crate::browser::extract::{extract_structured_data, first, selector, text_of, Extractor};
use crate::browser::session::{BrowserSession, NavigateOptions};
use crate::browser::PageHandle;
use crate::clock::Clock;
use crate::config::WatchlistEntry;
use crate::data::price_history::CS2_APP_ID;
use crate::data::types::{ItemData, ItemSource, ScrapeResult, SearchResult};
use chrono::Utc;
use regex::Regex;
use scraper::Html;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{error, info, warn};

pub const STEAM_LISTINGS_BASE: &str = "https://steamcommunity.com/market/listings/";
pub const STEAM_SEARCH_BASE: &str = "https://steamcommunity.com/market/search";

static LISTING_HREF: OnceLock<Option<Regex>> = OnceLock::new();
static PRICE_NUMBER: OnceLock<Option<Regex>> = OnceLock::new();
static ISO_CODE: OnceLock<Option<Regex>> = OnceLock::new();

fn listing_href_re() -> Option<&'static Regex> {
    LISTING_HREF
        .get_or_init(|| Regex::new(r"/market/listings/(\d+)/([^?]+)").ok())
        .as_ref()
}

fn price_number_re() -> Option<&'static Regex> {
    PRICE_NUMBER.get_or_init(|| Regex::new(r"\d[\d.,]*").ok()).as_ref()
}

fn iso_code_re() -> Option<&'static Regex> {
    ISO_CODE.get_or_init(|| Regex::new(r"\b([A-Z]{3})\b").ok()).as_ref()
}

pub fn listing_url(app_id: u32, market_hash_name: &str) -> String {
    format!("{}{}/{}", STEAM_LISTINGS_BASE, app_id, urlencoding::encode(market_hash_name))
}

pub fn search_url(query: &str) -> String {
    format!("{}?q={}", STEAM_SEARCH_BASE, urlencoding::encode(query))
}

pub fn popular_url(app_id: u32) -> String {
    format!("{}?appid={}", STEAM_SEARCH_BASE, app_id)
}

/// Raw fields of a listing page before validation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingFields {
    pub name: Option<String>,
    pub price_text: Option<String>,
    pub image_url: Option<String>,
}

pub struct ListingExtractor;

impl Extractor for ListingExtractor {
    type Output = ListingFields;

    fn extract(&self, document: &Html) -> ListingFields {
        ListingFields {
            name: first(document, ".market_listing_item_name")
                .map(text_of)
                .filter(|s| !s.is_empty()),
            price_text: first(document, ".market_listing_price.market_listing_price_with_fee")
                .map(text_of)
                .filter(|s| !s.is_empty()),
            image_url: first(document, ".market_listing_item_img")
                .and_then(|img| img.value().attr("src"))
                .map(str::to_string)
                .filter(|s| !s.is_empty()),
        }
    }
}

pub struct SearchResultsExtractor;

impl Extractor for SearchResultsExtractor {
    type Output = Vec<SearchResult>;

    fn extract(&self, document: &Html) -> Vec<SearchResult> {
        let (Some(links), Some(href_re)) = (
            selector(".market_listing_row a.market_listing_item_name_link"),
            listing_href_re(),
        ) else {
            return Vec::new();
        };

        document
            .select(&links)
            .filter_map(|link| {
                let href = link.value().attr("href")?;
                let cap = href_re.captures(href)?;
                let app_id = cap[1].parse().ok()?;
                let market_hash_name = urlencoding::decode(&cap[2]).ok()?.into_owned();
                Some(SearchResult {
                    app_id,
                    market_hash_name,
                    name: text_of(link),
                })
            })
            .collect()
    }
}

/// Parse a rendered price such as `$1,234.56`, `1.234,56€`, `R$ 5,20` or `12.50 USD`.
///
/// Returns the amount in major units and an ISO currency code.
pub fn parse_price_text(text: &str) -> Option<(f64, String)> {
    let number = price_number_re()?.find(text)?;

    let amount = normalize_amount(number.as_str())?;
    let symbol = format!("{} {}", &text[..number.start()], &text[number.end()..]);
    Some((amount, currency_code(symbol.trim())))
}

fn normalize_amount(raw: &str) -> Option<f64> {
    let raw = raw.trim_end_matches(['.', ',']);
    let last_dot = raw.rfind('.');
    let last_comma = raw.rfind(',');

    let normalized = match (last_dot, last_comma) {
        // Whichever separator comes last is the decimal point
        (Some(dot), Some(comma)) if dot > comma => raw.replace(',', ""),
        (Some(_), Some(_)) => raw.replace('.', "").replace(',', "."),
        (None, Some(comma)) => {
            let decimals = raw.len() - comma - 1;
            if raw.matches(',').count() == 1 && decimals <= 2 {
                raw.replace(',', ".")
            } else {
                raw.replace(',', "")
            }
        }
        (Some(_), None) if raw.matches('.').count() > 1 => raw.replace('.', ""),
        _ => raw.to_string(),
    };

    normalized.parse().ok()
}

fn currency_code(symbol: &str) -> String {
    let iso = iso_code_re().and_then(|re| re.captures(symbol).map(|cap| cap[1].to_string()));

    if symbol.contains("R$") {
        "BRL".to_string()
    } else if symbol.contains('€') {
        "EUR".to_string()
    } else if symbol.contains('£') {
        "GBP".to_string()
    } else if let Some(code) = iso {
        code
    } else {
        "USD".to_string()
    }
}

/// Validate extracted fields into an `ItemData`. A missing name or a zero
/// price is a failed scrape.
pub fn build_item(fields: ListingFields, app_id: u32, market_hash_name: &str, url: &str) -> ScrapeResult {
    let name = fields.name.unwrap_or_else(|| market_hash_name.to_string());
    let (price, currency) = fields
        .price_text
        .as_deref()
        .and_then(parse_price_text)
        .unwrap_or((0.0, "USD".to_string()));

    if name.is_empty() || price == 0.0 {
        return ScrapeResult::Failure("Incomplete item data".to_string());
    }

    ScrapeResult::Success(ItemData {
        name,
        price,
        currency,
        image_url: fields.image_url,
        market_hash_name: market_hash_name.to_string(),
        app_id,
        timestamp: Utc::now(),
        source: ItemSource::Steam,
        url: url.to_string(),
    })
}

/// Listing and search pages, scraped through the shared browser page.
pub struct ListingScraper {
    clock: Arc<dyn Clock>,
    rate_limit_delay: Duration,
}

impl ListingScraper {
    pub fn new(clock: Arc<dyn Clock>, rate_limit_delay: Duration) -> Self {
        Self {
            clock,
            rate_limit_delay,
        }
    }

    pub async fn scrape_item(
        &self,
        session: &BrowserSession,
        page: &PageHandle,
        app_id: u32,
        market_hash_name: &str,
    ) -> ScrapeResult {
        let url = listing_url(app_id, market_hash_name);
        info!(url = %url, "Scraping item: {}", market_hash_name);

        let fields = match self.extract(session, page, &url, &ListingExtractor).await {
            Ok(fields) => fields,
            Err(e) => {
                error!(error = %e, app_id, market_hash_name, "Error scraping item");
                return ScrapeResult::Failure(e);
            }
        };

        let result = build_item(fields, app_id, market_hash_name, &url);
        match &result {
            ScrapeResult::Success(item) => info!(
                name = %item.name,
                price = item.price,
                currency = %item.currency,
                "Item scraped successfully"
            ),
            ScrapeResult::Failure(reason) => {
                warn!(app_id, market_hash_name, reason = %reason, "Failed to extract complete item data")
            }
        }
        result
    }

    /// Scrape sequentially, waiting the rate-limit delay after each item.
    /// Only successful scrapes are returned.
    pub async fn scrape_multiple_items(
        &self,
        session: &BrowserSession,
        page: &PageHandle,
        items: &[WatchlistEntry],
    ) -> Vec<ItemData> {
        info!("Scraping {} items...", items.len());

        let mut scraped = Vec::with_capacity(items.len());
        for item in items {
            if let ScrapeResult::Success(data) =
                self.scrape_item(session, page, item.app_id, &item.market_hash_name).await
            {
                scraped.push(data);
            }
            self.clock.sleep(self.rate_limit_delay).await;
        }

        info!("Scraped {}/{} items successfully", scraped.len(), items.len());
        scraped
    }

    pub async fn search_items(&self, session: &BrowserSession, page: &PageHandle, query: &str) -> Vec<SearchResult> {
        info!("Searching for items: {}", query);
        match self.extract(session, page, &search_url(query), &SearchResultsExtractor).await {
            Ok(items) => {
                info!("Found {} items matching \"{}\"", items.len(), query);
                items
            }
            Err(e) => {
                error!(error = %e, query, "Error searching items");
                Vec::new()
            }
        }
    }

    pub async fn popular_items(
        &self,
        session: &BrowserSession,
        page: &PageHandle,
        app_id: Option<u32>,
    ) -> Vec<SearchResult> {
        let app_id = app_id.unwrap_or(CS2_APP_ID);
        info!("Getting popular items for app {}", app_id);
        match self.extract(session, page, &popular_url(app_id), &SearchResultsExtractor).await {
            Ok(items) => {
                info!("Found {} popular items", items.len());
                items
            }
            Err(e) => {
                error!(error = %e, app_id, "Error getting popular items");
                Vec::new()
            }
        }
    }

    async fn extract<E: Extractor>(
        &self,
        session: &BrowserSession,
        page: &PageHandle,
        url: &str,
        extractor: &E,
    ) -> Result<E::Output, String> {
        session
            .navigate(page, url, NavigateOptions::default())
            .await
            .map_err(|e| e.to_string())?;
        extract_structured_data(page.as_ref(), extractor)
            .await
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{FakeLauncher, FakePage};
    use crate::browser::BrowserOptions;
    use crate::clock::ManualClock;

    const LISTING_HTML: &str = r#"
        <html><body>
          <div id="largeiteminfo">
            <img class="market_listing_item_img" src="https://community.cloudflare.steamstatic.com/economy/image/abc/360fx360f">
            <h1 class="market_listing_item_name">AK-47 | Redline (Field-Tested)</h1>
          </div>
          <div class="market_listing_row">
            <span class="market_listing_price market_listing_price_with_fee">
              $12.34 USD
            </span>
          </div>
        </body></html>
    "#;

    const SEARCH_HTML: &str = r#"
        <html><body>
          <div class="market_listing_row">
            <a class="market_listing_item_name_link"
               href="https://steamcommunity.com/market/listings/730/AK-47%20%7C%20Redline%20%28Field-Tested%29?filter=x">
              AK-47 | Redline (Field-Tested)
            </a>
          </div>
          <div class="market_listing_row">
            <a class="market_listing_item_name_link" href="/market/listings/570/Dragonclaw%20Hook">Dragonclaw Hook</a>
          </div>
          <div class="market_listing_row">
            <a class="market_listing_item_name_link" href="/market/search?q=broken">Broken</a>
          </div>
        </body></html>
    "#;

    async fn session_with(page: Arc<FakePage>, clock: Arc<ManualClock>) -> (BrowserSession, PageHandle) {
        let mut session = BrowserSession::new(Box::new(FakeLauncher::with_pages(vec![page])), clock);
        session
            .initialize(&BrowserOptions {
                headless: true,
                user_data_dir: std::env::temp_dir(),
                viewport: Default::default(),
            })
            .await
            .unwrap();
        let handle = session.create_page().await.unwrap();
        (session, handle)
    }

    #[test]
    fn test_parse_price_text() {
        assert_eq!(parse_price_text("$12.34"), Some((12.34, "USD".to_string())));
        assert_eq!(parse_price_text("$1,234.56 USD"), Some((1234.56, "USD".to_string())));
        assert_eq!(parse_price_text("1.234,56€"), Some((1234.56, "EUR".to_string())));
        assert_eq!(parse_price_text("R$ 5,20"), Some((5.2, "BRL".to_string())));
        assert_eq!(parse_price_text("£3.10"), Some((3.1, "GBP".to_string())));
        assert_eq!(parse_price_text("--"), None);
    }

    #[test]
    fn test_patterns_compiled_once() {
        assert!(std::ptr::eq(price_number_re().unwrap(), price_number_re().unwrap()));
        assert!(std::ptr::eq(iso_code_re().unwrap(), iso_code_re().unwrap()));
        assert!(listing_href_re().is_some());
        assert_eq!(parse_price_text("12.50 CAD"), Some((12.5, "CAD".to_string())));
    }

    #[test]
    fn test_build_item_rejects_zero_price() {
        let fields = ListingFields {
            name: Some("AK-47 | Redline".to_string()),
            price_text: Some("Sold!".to_string()),
            image_url: None,
        };
        assert!(matches!(
            build_item(fields, 730, "AK-47 | Redline", "u"),
            ScrapeResult::Failure(_)
        ));
    }

    #[test]
    fn test_search_results_extraction() {
        let document = Html::parse_document(SEARCH_HTML);
        let results = SearchResultsExtractor.extract(&document);

        assert_eq!(
            results,
            vec![
                SearchResult {
                    app_id: 730,
                    market_hash_name: "AK-47 | Redline (Field-Tested)".to_string(),
                    name: "AK-47 | Redline (Field-Tested)".to_string(),
                },
                SearchResult {
                    app_id: 570,
                    market_hash_name: "Dragonclaw Hook".to_string(),
                    name: "Dragonclaw Hook".to_string(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_scrape_item() {
        let page = Arc::new(FakePage::default());
        *page.html.lock().unwrap() = LISTING_HTML.to_string();
        let clock = Arc::new(ManualClock::new());
        let (session, handle) = session_with(page.clone(), clock.clone()).await;

        let scraper = ListingScraper::new(clock, Duration::from_millis(3000));
        let ScrapeResult::Success(item) = scraper
            .scrape_item(&session, &handle, 730, "AK-47 | Redline (Field-Tested)")
            .await
        else {
            panic!("expected a successful scrape");
        };

        assert_eq!(item.name, "AK-47 | Redline (Field-Tested)");
        assert_eq!(item.price, 12.34);
        assert_eq!(item.currency, "USD");
        assert_eq!(item.source, ItemSource::Steam);
        assert!(item.image_url.is_some());
        assert_eq!(
            page.visited(),
            vec!["https://steamcommunity.com/market/listings/730/AK-47%20%7C%20Redline%20%28Field-Tested%29"]
        );
    }

    #[tokio::test]
    async fn test_scrape_multiple_items_waits_between_items() {
        let page = Arc::new(FakePage::default());
        *page.html.lock().unwrap() = LISTING_HTML.to_string();
        let clock = Arc::new(ManualClock::new());
        let (session, handle) = session_with(page.clone(), clock.clone()).await;

        let items = vec![
            WatchlistEntry {
                app_id: 730,
                market_hash_name: "AK-47 | Redline (Field-Tested)".to_string(),
            },
            WatchlistEntry {
                app_id: 730,
                market_hash_name: "AWP | Asiimov (Field-Tested)".to_string(),
            },
        ];
        let scraper = ListingScraper::new(clock.clone(), Duration::from_millis(3000));
        let scraped = scraper.scrape_multiple_items(&session, &handle, &items).await;

        assert_eq!(scraped.len(), 2);
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(3000); 2]);
    }

    #[tokio::test]
    async fn test_search_navigation_failure_yields_empty() {
        let page = Arc::new(FakePage::default());
        for _ in 0..3 {
            page.goto_results.lock().unwrap().push_back(Err("net::ERR_TIMED_OUT".to_string()));
        }
        let clock = Arc::new(ManualClock::new());
        let (session, handle) = session_with(page, clock.clone()).await;

        let scraper = ListingScraper::new(clock, Duration::from_millis(3000));
        assert!(scraper.search_items(&session, &handle, "redline").await.is_empty());
    }
}
