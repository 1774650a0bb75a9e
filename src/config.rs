use crate::error::ConfigError;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub browser: BrowserSettings,
    pub scraping: ScrapingConfig,
    pub logging: LoggingConfig,
    pub steam: SteamConfig,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub url: String,
    pub key: String,
}

#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub data_dir: PathBuf,
    pub headless: bool,
}

#[derive(Debug, Clone)]
pub struct ScrapingConfig {
    pub poll_interval_ms: u64,
    pub rate_limit_delay_ms: u64,
    pub price_history_average_count: usize,
    /// Listings scraped each cycle and forwarded in bulk
    pub watchlist: Vec<WatchlistEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchlistEntry {
    pub app_id: u32,
    pub market_hash_name: String,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct SteamConfig {
    pub login_timeout_ms: u64,
}

fn default_api_url() -> String { "https://api.thetruemarket.com".to_string() }
fn default_poll_interval_ms() -> u64 { 60_000 }
fn default_rate_limit_delay_ms() -> u64 { 3_000 }
fn default_average_count() -> usize { 10 }
fn default_login_timeout_ms() -> u64 { 300_000 }

impl Config {
    /// Load from `.env` (if present) and the process environment, then validate.
    pub fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup };

        let config = Self {
            api: ApiConfig {
                url: env.string("API_URL", default_api_url()),
                key: env.string("API_KEY", String::new()),
            },
            browser: BrowserSettings {
                data_dir: absolute(env.string("BROWSER_DATA_DIR", "./browser-data".to_string())),
                headless: env.boolean("HEADLESS", false),
            },
            scraping: ScrapingConfig {
                poll_interval_ms: env.number("POLL_INTERVAL_MS", default_poll_interval_ms())?,
                rate_limit_delay_ms: env.number("RATE_LIMIT_DELAY_MS", default_rate_limit_delay_ms())?,
                price_history_average_count: env
                    .number("PRICE_HISTORY_AVERAGE_COUNT", default_average_count() as u64)?
                    as usize,
                watchlist: parse_watchlist(&env.string("LISTING_WATCHLIST", String::new()))?,
            },
            logging: LoggingConfig {
                level: env.string("LOG_LEVEL", "info".to_string()),
                dir: absolute(env.string("LOG_DIR", "./logs".to_string())),
            },
            steam: SteamConfig {
                login_timeout_ms: env.number("STEAM_LOGIN_TIMEOUT_MS", default_login_timeout_ms())?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scraping.poll_interval_ms < 1000 {
            return Err(ConfigError::Invalid(
                "POLL_INTERVAL_MS must be at least 1000ms".to_string(),
            ));
        }
        if self.scraping.rate_limit_delay_ms < 500 {
            return Err(ConfigError::Invalid(
                "RATE_LIMIT_DELAY_MS must be at least 500ms".to_string(),
            ));
        }
        if self.scraping.price_history_average_count == 0 {
            return Err(ConfigError::Invalid(
                "PRICE_HISTORY_AVERAGE_COUNT must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str, default: String) -> String {
        (self.lookup)(key)
            .filter(|v| !v.is_empty())
            .unwrap_or(default)
    }

    fn number(&self, key: &str, default: u64) -> Result<u64, ConfigError> {
        match (self.lookup)(key) {
            None => Ok(default),
            Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidNumber {
                key: key.to_string(),
                value,
            }),
        }
    }

    fn boolean(&self, key: &str, default: bool) -> bool {
        match (self.lookup)(key) {
            None => default,
            Some(value) => value.eq_ignore_ascii_case("true") || value == "1",
        }
    }
}

fn absolute(path: String) -> PathBuf {
    let path = PathBuf::from(path);
    if path.is_absolute() {
        return path;
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(&path))
        .unwrap_or(path)
}

/// `730:AK-47 | Redline (Field-Tested),730:AWP | Asiimov (Battle-Scarred)`
fn parse_watchlist(raw: &str) -> Result<Vec<WatchlistEntry>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (app_id, name) = entry.split_once(':').ok_or_else(|| {
                ConfigError::Invalid(format!("LISTING_WATCHLIST entry '{}' must be appid:name", entry))
            })?;
            let app_id = app_id.trim().parse().map_err(|_| ConfigError::InvalidNumber {
                key: "LISTING_WATCHLIST".to_string(),
                value: app_id.to_string(),
            })?;
            Ok(WatchlistEntry {
                app_id,
                market_hash_name: name.trim().to_string(),
            })
        })
        .collect()
}
