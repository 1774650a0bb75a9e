//! Browser automation seam.
//!
//! The rest of the crate only sees [`BrowserLauncher`], [`BrowserEngine`] and
//! [`PageDriver`]. `chromium` provides the production implementation.

pub mod auth;
pub mod chromium;
pub mod extract;
pub mod session;
pub mod stealth;

use crate::data::types::SessionCookie;
use crate::error::BrowserError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

pub type PageHandle = Arc<dyn PageDriver>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitUntil {
    Load,
    DomContentLoaded,
    #[default]
    NetworkIdle,
}

#[derive(Debug, Clone)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self { width: 1920, height: 1080 }
    }
}

#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub headless: bool,
    /// Persistent profile so the Steam login survives restarts
    pub user_data_dir: PathBuf,
    pub viewport: Viewport,
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, options: &BrowserOptions) -> Result<Box<dyn BrowserEngine>, BrowserError>;
}

#[async_trait]
pub trait BrowserEngine: Send + Sync {
    async fn new_page(&self) -> Result<PageHandle, BrowserError>;

    fn is_connected(&self) -> bool;

    async fn close(&mut self) -> Result<(), BrowserError>;
}

#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn set_user_agent(&self, user_agent: &str) -> Result<(), BrowserError>;

    /// Script evaluated before any page script on every future document
    async fn add_init_script(&self, source: &str) -> Result<(), BrowserError>;

    async fn goto(&self, url: &str, wait_until: WaitUntil) -> Result<(), BrowserError>;

    /// `document.body.innerText`
    async fn body_text(&self) -> Result<String, BrowserError>;

    /// Serialized DOM of the current document
    async fn content(&self) -> Result<String, BrowserError>;

    async fn cookies(&self) -> Result<Vec<SessionCookie>, BrowserError>;

    async fn close(&self) -> Result<(), BrowserError>;
}
