use super::{BrowserEngine, BrowserLauncher, BrowserOptions, PageDriver, PageHandle, WaitUntil};
use super::stealth::LAUNCH_ARGS;
use crate::data::types::SessionCookie;
use crate::error::BrowserError;
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::{GetCookiesParams, SetUserAgentOverrideParams};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);
/// Extra settle time standing in for "network idle"
const NETWORK_IDLE_SETTLE: Duration = Duration::from_millis(500);

/// Origins whose cookies make up the Steam session
const STEAM_COOKIE_URLS: [&str; 3] = [
    "https://steamcommunity.com",
    "https://store.steampowered.com",
    "https://login.steampowered.com",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct ChromiumLauncher;

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self, options: &BrowserOptions) -> Result<Box<dyn BrowserEngine>, BrowserError> {
        let mut builder = BrowserConfig::builder()
            .user_data_dir(&options.user_data_dir)
            .window_size(options.viewport.width, options.viewport.height)
            .request_timeout(NAVIGATION_TIMEOUT)
            .args(LAUNCH_ARGS);

        if !options.headless {
            builder = builder.with_head();
        }

        let config = builder.build().map_err(BrowserError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        // The CDP connection only makes progress while the handler is polled
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "Browser handler stopped");
                    break;
                }
            }
        });

        Ok(Box::new(ChromiumEngine {
            browser,
            handler_task: Some(handler_task),
        }))
    }
}

pub struct ChromiumEngine {
    browser: Browser,
    handler_task: Option<JoinHandle<()>>,
}

#[async_trait]
impl BrowserEngine for ChromiumEngine {
    async fn new_page(&self) -> Result<PageHandle, BrowserError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::Page(e.to_string()))?;
        let handle: PageHandle = Arc::new(ChromiumPage { page });
        Ok(handle)
    }

    fn is_connected(&self) -> bool {
        self.handler_task.as_ref().is_some_and(|task| !task.is_finished())
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        let result = self
            .browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| BrowserError::Page(e.to_string()));
        let _ = self.browser.wait().await;

        if let Some(task) = self.handler_task.take() {
            task.abort();
        }
        result
    }
}

pub struct ChromiumPage {
    page: Page,
}

fn page_err(e: impl std::fmt::Display) -> BrowserError {
    BrowserError::Page(e.to_string())
}

#[async_trait]
impl PageDriver for ChromiumPage {
    async fn set_user_agent(&self, user_agent: &str) -> Result<(), BrowserError> {
        self.page
            .set_user_agent(SetUserAgentOverrideParams::new(user_agent))
            .await
            .map_err(page_err)?;
        Ok(())
    }

    async fn add_init_script(&self, source: &str) -> Result<(), BrowserError> {
        self.page
            .evaluate_on_new_document(AddScriptToEvaluateOnNewDocumentParams::new(source))
            .await
            .map_err(page_err)?;
        Ok(())
    }

    async fn goto(&self, url: &str, wait_until: WaitUntil) -> Result<(), BrowserError> {
        // `goto` resolves once the frame has finished loading
        tokio::time::timeout(NAVIGATION_TIMEOUT, self.page.goto(url))
            .await
            .map_err(|_| {
                BrowserError::Page(format!(
                    "Navigation timeout of {}s exceeded",
                    NAVIGATION_TIMEOUT.as_secs()
                ))
            })?
            .map_err(page_err)?;

        if wait_until == WaitUntil::NetworkIdle {
            tokio::time::sleep(NETWORK_IDLE_SETTLE).await;
        }
        Ok(())
    }

    async fn body_text(&self) -> Result<String, BrowserError> {
        self.page
            .evaluate("document.body ? document.body.innerText : ''")
            .await
            .map_err(page_err)?
            .into_value::<String>()
            .map_err(page_err)
    }

    async fn content(&self) -> Result<String, BrowserError> {
        self.page.content().await.map_err(page_err)
    }

    async fn cookies(&self) -> Result<Vec<SessionCookie>, BrowserError> {
        let params = GetCookiesParams::builder()
            .urls(STEAM_COOKIE_URLS.iter().map(|u| u.to_string()))
            .build();
        let response = self.page.execute(params).await.map_err(page_err)?;

        Ok(response
            .result
            .cookies
            .into_iter()
            .map(|c| SessionCookie {
                name: c.name,
                value: c.value,
                domain: c.domain,
            })
            .collect())
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.page.clone().close().await.map_err(page_err)
    }
}
