use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("Browser not initialized. Call initialize() first.")]
    NotInitialized,

    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("Page operation failed: {0}")]
    Page(String),

    #[error("Failed to navigate to {url} after {attempts} attempts: {last_error}")]
    Navigation {
        url: String,
        attempts: u32,
        last_error: String,
    },
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Request rejected by API: {0}")]
    Rejected(String),

    #[error("Malformed response from {url}: {message}")]
    Decode { url: String, message: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid number for environment variable {key}: {value}")]
    InvalidNumber { key: String, value: String },

    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Steam login not completed within {0}s")]
    AuthenticationTimeout(u64),

    #[error("Initialization failed: {0}")]
    FatalInitialization(String),

    #[error("Shutdown requested")]
    ShutdownRequested,

    #[error("Parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

pub type Result<T, E = CollectorError> = std::result::Result<T, E>;
