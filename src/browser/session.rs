use super::{stealth, BrowserEngine, BrowserLauncher, BrowserOptions, PageHandle, WaitUntil};
use crate::clock::Clock;
use crate::data::retry::{with_retry, RetryPolicy};
use crate::error::BrowserError;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy)]
pub struct NavigateOptions {
    pub wait_until: WaitUntil,
    pub retries: u32,
}

impl Default for NavigateOptions {
    fn default() -> Self {
        Self {
            wait_until: WaitUntil::NetworkIdle,
            retries: 3,
        }
    }
}

/// Owns the single browser instance and every page created from it.
pub struct BrowserSession {
    launcher: Box<dyn BrowserLauncher>,
    clock: Arc<dyn Clock>,
    engine: Option<Box<dyn BrowserEngine>>,
    pages: Vec<PageHandle>,
}

impl BrowserSession {
    pub fn new(launcher: Box<dyn BrowserLauncher>, clock: Arc<dyn Clock>) -> Self {
        Self {
            launcher,
            clock,
            engine: None,
            pages: Vec::new(),
        }
    }

    /// Launch the browser with a persistent profile directory.
    pub async fn initialize(&mut self, options: &BrowserOptions) -> Result<(), BrowserError> {
        if self.engine.is_some() {
            warn!("Browser already initialized");
            return Ok(());
        }

        info!("Initializing browser with persistent profile...");

        if !options.user_data_dir.exists() {
            tokio::fs::create_dir_all(&options.user_data_dir).await.map_err(|e| {
                BrowserError::Launch(format!(
                    "cannot create {}: {}",
                    options.user_data_dir.display(),
                    e
                ))
            })?;
            info!("Created browser data directory: {}", options.user_data_dir.display());
        }

        let engine = self.launcher.launch(options).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to initialize browser");
            e
        })?;
        self.engine = Some(engine);

        info!(
            headless = options.headless,
            user_data_dir = %options.user_data_dir.display(),
            "Browser initialized successfully"
        );
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.engine.as_ref().is_some_and(|e| e.is_connected())
    }

    /// Open a tracked page with stealth settings applied.
    pub async fn create_page(&mut self) -> Result<PageHandle, BrowserError> {
        let engine = self.engine.as_ref().ok_or(BrowserError::NotInitialized)?;

        let page = engine.new_page().await?;
        stealth::apply(page.as_ref()).await?;

        self.pages.push(page.clone());
        info!("New page created");
        Ok(page)
    }

    /// Navigate with linear backoff (2s, 4s, ...) between attempts.
    pub async fn navigate(
        &self,
        page: &PageHandle,
        url: &str,
        options: NavigateOptions,
    ) -> Result<(), BrowserError> {
        let policy = RetryPolicy::navigation(options.retries);
        let attempts = policy.max_attempts;

        with_retry(&policy, self.clock.as_ref(), "navigation", |attempt| {
            let page = page.clone();
            async move {
                info!("Navigating to {} (attempt {}/{})", url, attempt, attempts);
                page.goto(url, options.wait_until).await?;
                info!("Successfully navigated to {}", url);
                Ok::<_, BrowserError>(())
            }
        })
        .await
        .map_err(|last| BrowserError::Navigation {
            url: url.to_string(),
            attempts,
            last_error: last.to_string(),
        })
    }

    /// Close one tracked page and stop tracking it.
    pub async fn close_page(&mut self, page: &PageHandle) -> Result<(), BrowserError> {
        self.pages.retain(|p| !Arc::ptr_eq(p, page));
        page.close().await
    }

    async fn close_all_pages(&mut self) {
        info!("Closing all pages...");
        for page in self.pages.drain(..) {
            if let Err(e) = page.close().await {
                warn!(error = %e, "Error closing page");
            }
        }
    }

    /// Close every tracked page, then the browser. A page that fails to close is skipped.
    pub async fn close(&mut self) -> Result<(), BrowserError> {
        if self.engine.is_none() {
            warn!("Browser not initialized, nothing to close");
            return Ok(());
        }

        info!("Closing browser...");
        self.close_all_pages().await;

        if let Some(mut engine) = self.engine.take() {
            engine.close().await.map_err(|e| {
                tracing::error!(error = %e, "Error closing browser");
                e
            })?;
        }

        info!("Browser closed successfully");
        Ok(())
    }
}
