//! Passive stealth settings applied to every page.
//!
//! These only hide the most obvious automation markers. They do not attempt to
//! defeat Steam's anti-automation checks.

use super::PageDriver;
use crate::error::BrowserError;

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Overrides `navigator.webdriver`, `navigator.plugins` and `navigator.languages`.
pub const INIT_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => false });
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
"#;

pub const LAUNCH_ARGS: [&str; 4] = [
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-blink-features=AutomationControlled",
];

pub async fn apply(page: &dyn PageDriver) -> Result<(), BrowserError> {
    page.set_user_agent(USER_AGENT).await?;
    page.add_init_script(INIT_SCRIPT).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::FakePage;

    #[tokio::test]
    async fn test_apply_sets_user_agent_and_script() {
        let page = FakePage::default();
        apply(&page).await.unwrap();

        let ua = page.user_agent.lock().unwrap().clone().unwrap();
        assert!(ua.contains("Chrome/131"));
        assert!(!ua.contains("Headless"));

        let scripts = page.init_scripts.lock().unwrap().clone();
        assert_eq!(scripts.len(), 1);
        assert!(scripts[0].contains("webdriver"));
        assert!(scripts[0].contains("languages"));
    }
}
