use super::session::{BrowserSession, NavigateOptions};
use super::PageHandle;
use crate::clock::Clock;
use crate::data::types::{SessionCookie, SessionState};
use crate::error::BrowserError;
use crate::execution::types::wait_for_shutdown;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

pub const STEAM_LOGIN_URL: &str = "https://store.steampowered.com/login/";

const LOGIN_COOKIE: &str = "steamLoginSecure";
const SESSION_COOKIE: &str = "sessionid";
const LOGIN_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unknown,
    Checking,
    LoggedIn,
    LoggedOut,
    WaitingForManualLogin,
    TimedOut,
    /// Login wait abandoned because shutdown was requested
    Interrupted,
}

/// Logged in iff both the secure login cookie and the session cookie are present.
pub fn is_logged_in(cookies: &[SessionCookie]) -> bool {
    let has = |name: &str| cookies.iter().any(|c| c.name == name);
    has(LOGIN_COOKIE) && has(SESSION_COOKIE)
}

pub struct SteamAuthService {
    clock: Arc<dyn Clock>,
    login_timeout: Duration,
    state: AuthState,
    shutdown: Option<watch::Receiver<bool>>,
}

impl SteamAuthService {
    pub fn new(clock: Arc<dyn Clock>, login_timeout: Duration) -> Self {
        Self {
            clock,
            login_timeout,
            state: AuthState::Unknown,
            shutdown: None,
        }
    }

    /// Let a shutdown request cut the manual-login wait short.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    fn shutdown_pending(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    async fn pause(&self, duration: Duration) {
        match &self.shutdown {
            Some(rx) => tokio::select! {
                _ = self.clock.sleep(duration) => {}
                _ = wait_for_shutdown(rx.clone()) => {}
            },
            None => self.clock.sleep(duration).await,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    /// Cookie inspection only; never navigates.
    pub async fn check_login_status(&mut self, page: &PageHandle) -> bool {
        let previous = self.state;
        self.state = AuthState::Checking;

        let logged_in = match page.cookies().await {
            Ok(cookies) => is_logged_in(&cookies),
            Err(e) => {
                error!(error = %e, "Error checking login status");
                false
            }
        };

        self.state = match (logged_in, previous) {
            (true, _) => AuthState::LoggedIn,
            (false, AuthState::WaitingForManualLogin) => AuthState::WaitingForManualLogin,
            (false, _) => AuthState::LoggedOut,
        };
        logged_in
    }

    /// Open the login page and poll every 2s until the operator has logged in,
    /// `timeout` elapses or shutdown is requested.
    pub async fn wait_for_login(
        &mut self,
        session: &BrowserSession,
        page: &PageHandle,
        timeout: Option<Duration>,
    ) -> bool {
        let timeout = timeout.unwrap_or(self.login_timeout);

        info!("Navigating to Steam login page...");
        info!("Please log in manually within {} seconds", timeout.as_secs());

        if let Err(e) = session
            .navigate(page, STEAM_LOGIN_URL, NavigateOptions::default())
            .await
        {
            error!(error = %e, "Error during login wait");
            self.state = AuthState::LoggedOut;
            return false;
        }

        self.state = AuthState::WaitingForManualLogin;
        let started = self.clock.now();

        while self.clock.now().duration_since(started) < timeout {
            if self.shutdown_pending() {
                warn!("Shutdown requested, abandoning login wait");
                self.state = AuthState::Interrupted;
                return false;
            }
            if self.check_login_status(page).await {
                info!("Login successful!");
                return true;
            }
            self.pause(LOGIN_POLL_INTERVAL).await;
        }

        error!("Login timeout - user did not complete login");
        self.state = AuthState::TimedOut;
        false
    }

    /// Check once; only fall back to the manual-login wait when logged out.
    pub async fn ensure_logged_in(&mut self, session: &BrowserSession, page: &PageHandle) -> bool {
        if self.check_login_status(page).await {
            info!("Already logged in to Steam");
            return true;
        }

        warn!("Not logged in, waiting for manual login...");
        self.wait_for_login(session, page, None).await
    }

    pub async fn session_info(&mut self, page: &PageHandle) -> SessionState {
        let cookies = match page.cookies().await {
            Ok(cookies) => cookies,
            Err(e) => {
                error!(error = %e, "Error getting session info");
                return SessionState::default();
            }
        };

        let session_id = cookies
            .iter()
            .find(|c| c.name == SESSION_COOKIE)
            .map(|c| c.value.clone());
        let steam_id = cookies
            .iter()
            .find(|c| c.name == LOGIN_COOKIE)
            .and_then(|c| steam_id_from_login_cookie(&c.value));

        let logged_in = is_logged_in(&cookies);
        self.state = if logged_in { AuthState::LoggedIn } else { AuthState::LoggedOut };

        SessionState {
            is_logged_in: logged_in,
            session_id,
            steam_id,
            cookies,
        }
    }

    /// Cookies scoped to Steam domains
    pub async fn login_cookies(&self, page: &PageHandle) -> Result<Vec<SessionCookie>, BrowserError> {
        Ok(page
            .cookies()
            .await?
            .into_iter()
            .filter(|c| c.domain.contains("steam"))
            .collect())
    }
}

/// `steamLoginSecure` starts with the 64-bit SteamID
fn steam_id_from_login_cookie(value: &str) -> Option<String> {
    static STEAM_ID: OnceLock<Option<Regex>> = OnceLock::new();
    let re = STEAM_ID.get_or_init(|| Regex::new(r"^(\d+)").ok()).as_ref()?;
    re.captures(value).map(|cap| cap[1].to_string())
}
