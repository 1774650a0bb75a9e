use crate::clock::Clock;
use crate::data::cache::{CacheStats, ItemNameIdCache};
use crate::data::price_history::{clean_skin_name, market_hash_name};
use crate::data::types::Wear;
use crate::error::{ApiError, CollectorError};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const ITEM_NAMEID_SNAPSHOT_URL: &str =
    "https://raw.githubusercontent.com/somespecialone/steam-item-name-ids/refs/heads/master/data/cs2.json";

const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(30);

/// Where the name -> item_nameid mapping comes from
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self) -> Result<HashMap<String, u64>, CollectorError>;
}

pub struct HttpSnapshotSource {
    client: Client,
    url: String,
}

impl HttpSnapshotSource {
    pub fn new(url: impl Into<String>) -> Result<Self, CollectorError> {
        let client = Client::builder().timeout(SNAPSHOT_TIMEOUT).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    async fn fetch(&self) -> Result<HashMap<String, u64>, CollectorError> {
        info!("Fetching item name IDs from GitHub...");

        let response = self
            .client
            .get(&self.url)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                url: self.url.clone(),
            }
            .into());
        }

        parse_snapshot(&response.text().await?)
    }
}

/// Schema check for the snapshot: a non-empty object of non-negative integers.
pub fn parse_snapshot(body: &str) -> Result<HashMap<String, u64>, CollectorError> {
    let ids: HashMap<String, u64> = serde_json::from_str(body)
        .map_err(|e| CollectorError::Parse(format!("invalid item name ID snapshot: {}", e)))?;

    if ids.is_empty() {
        return Err(CollectorError::Parse("item name ID snapshot is empty".to_string()));
    }
    Ok(ids)
}

/// Names tried after the canonical one: every wear spelling, then the abbreviations.
fn alternative_names(skin_name: &str) -> Vec<String> {
    let cleaned = clean_skin_name(skin_name);
    Wear::ALL
        .iter()
        .map(|w| w.display_name())
        .chain(Wear::ALL.iter().map(|w| w.abbreviation()))
        .map(|wear| format!("{} ({})", cleaned, wear))
        .collect()
}

pub struct ItemNameIdResolver {
    source: Box<dyn SnapshotSource>,
    cache: ItemNameIdCache,
    clock: Arc<dyn Clock>,
}

impl ItemNameIdResolver {
    pub fn new(source: Box<dyn SnapshotSource>, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            cache: ItemNameIdCache::default(),
            clock,
        }
    }

    pub fn http(clock: Arc<dyn Clock>) -> Result<Self, CollectorError> {
        Ok(Self::new(
            Box::new(HttpSnapshotSource::new(ITEM_NAMEID_SNAPSHOT_URL)?),
            clock,
        ))
    }

    /// Initial load. Failing here leaves nothing to fall back to.
    pub async fn initialize(&mut self) -> Result<(), CollectorError> {
        self.refresh_if_stale().await
    }

    /// Refresh when the cache is missing or older than its TTL.
    ///
    /// A failed refresh keeps serving the previous snapshot; it is only an error
    /// when no snapshot was ever loaded.
    pub async fn refresh_if_stale(&mut self) -> Result<(), CollectorError> {
        let now = self.clock.now();
        if self.cache.is_fresh(now) {
            debug!("Item name ID cache is still valid, skipping update");
            return Ok(());
        }

        match self.source.fetch().await {
            Ok(snapshot) => {
                let count = snapshot.len();
                self.cache.replace(snapshot, now);
                info!(item_count = count, "Successfully loaded item name IDs");
                Ok(())
            }
            Err(e) if self.cache.is_populated() => {
                error!(error = %e, "Failed to fetch item name IDs");
                warn!("Using old cache due to fetch error");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Failed to fetch item name IDs");
                Err(CollectorError::FatalInitialization(format!(
                    "item name ID cache has no fallback: {}",
                    e
                )))
            }
        }
    }

    /// Look up the `item_nameid` for a skin, trying alternative wear spellings
    /// when the canonical name is missing.
    pub async fn resolve(&mut self, skin_name: &str, wear: &str) -> Result<Option<u64>, CollectorError> {
        self.refresh_if_stale().await?;

        let full_name = market_hash_name(skin_name, wear);
        debug!(skin_name, wear, full_name = %full_name, "Looking up item name ID");

        if let Some(id) = self.cache.get(&full_name) {
            debug!(full_name = %full_name, item_nameid = id, "Found item name ID");
            return Ok(Some(id));
        }

        warn!(full_name = %full_name, "Item name ID not found for skin");

        for alternative in alternative_names(skin_name) {
            if let Some(id) = self.cache.get(&alternative) {
                info!(
                    full_name = %full_name,
                    alternative = %alternative,
                    "Found item name ID using alternative name"
                );
                return Ok(Some(id));
            }
        }

        Ok(None)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats(self.clock.now())
    }
}
