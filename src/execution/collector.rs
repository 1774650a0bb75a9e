//! Top-level driver: initialize, poll for history tasks, process them one at a
//! time, shut down on request.

use crate::browser::auth::{AuthState, SteamAuthService};
use crate::browser::session::BrowserSession;
use crate::browser::{BrowserOptions, PageHandle, Viewport};
use crate::clock::Clock;
use crate::config::{Config, WatchlistEntry};
use crate::data::backend_api::TaskGateway;
use crate::data::market::MarketData;
use crate::data::types::{CompleteTaskPayload, HistoryUpdateTask, PriceMetrics, TaskStatus};
use crate::error::{BrowserError, CollectorError};
use crate::execution::types::{wait_for_shutdown, CollectorState, TaskOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Wait after a cycle-level error before polling again
const ERROR_RETRY_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct CollectorSettings {
    pub browser: BrowserOptions,
    pub poll_interval: Duration,
    pub rate_limit_delay: Duration,
    pub average_count: usize,
    pub login_timeout: Duration,
    pub watchlist: Vec<WatchlistEntry>,
}

impl CollectorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            browser: BrowserOptions {
                headless: config.browser.headless,
                user_data_dir: config.browser.data_dir.clone(),
                viewport: Viewport::default(),
            },
            poll_interval: Duration::from_millis(config.scraping.poll_interval_ms),
            rate_limit_delay: Duration::from_millis(config.scraping.rate_limit_delay_ms),
            average_count: config.scraping.price_history_average_count,
            login_timeout: Duration::from_millis(config.steam.login_timeout_ms),
            watchlist: config.scraping.watchlist.clone(),
        }
    }
}

/// Owns the browser session and page; collaborators only borrow them.
pub struct Collector {
    settings: CollectorSettings,
    session: BrowserSession,
    page: Option<PageHandle>,
    auth: SteamAuthService,
    api: Box<dyn TaskGateway>,
    market: Box<dyn MarketData>,
    clock: Arc<dyn Clock>,
    shutdown: watch::Receiver<bool>,
    state: CollectorState,
}

impl Collector {
    pub fn new(
        settings: CollectorSettings,
        session: BrowserSession,
        api: Box<dyn TaskGateway>,
        market: Box<dyn MarketData>,
        clock: Arc<dyn Clock>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let auth = SteamAuthService::new(clock.clone(), settings.login_timeout).with_shutdown(shutdown.clone());
        Self {
            settings,
            session,
            page: None,
            auth,
            api,
            market,
            clock,
            shutdown,
            state: CollectorState::Uninitialized,
        }
    }

    pub fn state(&self) -> CollectorState {
        self.state
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Launch the browser, log in and load the item_nameid snapshot.
    ///
    /// Any failure leaves the collector in `Failed`, except a shutdown request during
    /// the login wait, which returns `ShutdownRequested`. The caller should `stop()` either way.
    pub async fn initialize(&mut self) -> Result<(), CollectorError> {
        self.state = CollectorState::Initializing;
        info!("=== Steam Price Collector Starting ===");
        info!(
            poll_interval_ms = self.settings.poll_interval.as_millis() as u64,
            rate_limit_delay_ms = self.settings.rate_limit_delay.as_millis() as u64,
            headless = self.settings.browser.headless,
            watchlist = self.settings.watchlist.len(),
            "Configuration"
        );

        match self.bootstrap().await {
            Ok(()) => {
                self.state = CollectorState::Ready;
                info!("=== Initialization Complete ===");
                Ok(())
            }
            Err(CollectorError::ShutdownRequested) => {
                info!("Shutdown requested during initialization");
                self.state = CollectorState::ShuttingDown;
                Err(CollectorError::ShutdownRequested)
            }
            Err(e) => {
                error!(error = %e, "Initialization failed");
                self.state = CollectorState::Failed;
                Err(e)
            }
        }
    }

    async fn bootstrap(&mut self) -> Result<(), CollectorError> {
        self.session
            .initialize(&self.settings.browser)
            .await
            .map_err(|e| CollectorError::FatalInitialization(e.to_string()))?;
        info!("Browser initialized successfully");

        let page = self
            .session
            .create_page()
            .await
            .map_err(|e| CollectorError::FatalInitialization(e.to_string()))?;
        self.page = Some(page.clone());
        info!("Page created successfully");

        self.market.initialize().await?;

        if !self.auth.ensure_logged_in(&self.session, &page).await {
            if self.auth.state() == AuthState::Interrupted {
                return Err(CollectorError::ShutdownRequested);
            }
            return Err(CollectorError::AuthenticationTimeout(
                self.settings.login_timeout.as_secs(),
            ));
        }

        if !self.api.health_check().await {
            warn!("API health check failed - continuing anyway");
        }
        Ok(())
    }

    /// Poll until shutdown is requested. Cycle errors only lengthen the wait.
    pub async fn start(&mut self) -> Result<(), CollectorError> {
        let page = self.page.clone().ok_or(BrowserError::NotInitialized)?;

        info!(
            "Starting history task polling loop (every {} seconds)...",
            self.settings.poll_interval.as_secs()
        );

        while !self.shutdown_requested() {
            let wait = match self.run_cycle(&page).await {
                Ok(()) => {
                    info!("Waiting {} seconds until next poll...", self.settings.poll_interval.as_secs());
                    self.settings.poll_interval
                }
                Err(e) => {
                    error!(error = %e, "Error in polling loop");
                    info!("Retrying in {} seconds...", ERROR_RETRY_DELAY.as_secs());
                    ERROR_RETRY_DELAY
                }
            };

            if self.shutdown_requested() {
                break;
            }
            self.wait_or_shutdown(wait).await;
        }

        info!("Polling loop stopped");
        Ok(())
    }

    async fn wait_or_shutdown(&self, duration: Duration) {
        tokio::select! {
            _ = self.clock.sleep(duration) => {}
            _ = wait_for_shutdown(self.shutdown.clone()) => info!("Shutdown requested, skipping wait"),
        }
    }

    /// One poll: fetch tasks, process the WAITING ones in API order, then the watchlist.
    async fn run_cycle(&mut self, page: &PageHandle) -> Result<(), CollectorError> {
        self.state = CollectorState::Polling;
        info!("=== Fetching History Tasks ===");

        let tasks = self.api.get_pending_tasks().await?;
        let waiting: Vec<HistoryUpdateTask> = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Waiting)
            .cloned()
            .collect();

        if waiting.is_empty() {
            info!("No WAITING tasks found");
        } else {
            info!(total_tasks = tasks.len(), waiting_tasks = waiting.len(), "Tasks fetched");
            self.state = CollectorState::Processing;

            // A shutdown request lets the whole cycle finish
            for task in &waiting {
                match self.process_task(page, task).await {
                    TaskOutcome::Completed { average_price } => {
                        info!(task_id = task.id, average_price, "Task completed successfully")
                    }
                    TaskOutcome::Skipped(reason) => warn!(task_id = task.id, reason, "Task skipped"),
                    TaskOutcome::Failed(message) => {
                        error!(task_id = task.id, error = %message, "Error processing task")
                    }
                }

                self.clock.sleep(self.settings.rate_limit_delay).await;
            }

            info!("=== All Tasks Processed ===");
        }

        self.collect_watchlist(page).await;
        self.state = CollectorState::Polling;
        Ok(())
    }

    /// History, metrics and buy order for one task, reported back to the backend.
    /// Never fails the cycle.
    async fn process_task(&mut self, page: &PageHandle, task: &HistoryUpdateTask) -> TaskOutcome {
        info!(
            task_id = task.id,
            skin_name = %task.skin_name,
            wear = %task.wear,
            "Processing task"
        );

        let Some(history) = self
            .market
            .price_history(&self.session, page, &task.skin_name, &task.wear)
            .await
        else {
            warn!(task_id = task.id, "Failed to fetch price history");
            return TaskOutcome::Skipped("no price history");
        };

        let metrics = PriceMetrics::from_history(&history.prices, self.settings.average_count);
        let Some(average_price) = metrics.average_price else {
            warn!(task_id = task.id, "Failed to calculate average price");
            return TaskOutcome::Skipped("empty price history");
        };

        let buy_order = self.market.lowest_buy_order(&task.skin_name, &task.wear).await;
        let metrics = metrics.with_buy_order(buy_order);

        let payload = CompleteTaskPayload {
            skin_name: task.skin_name.clone(),
            wear: task.wear.clone(),
            average_price,
            last_sale_price: metrics.last_sale_price,
            lowest_buy_order_price: metrics.lowest_buy_order_price,
        };

        match self.api.complete_task(task.id, &payload).await {
            Ok(_) => TaskOutcome::Completed { average_price },
            Err(e) => TaskOutcome::Failed(e.to_string()),
        }
    }

    async fn collect_watchlist(&mut self, page: &PageHandle) {
        if self.settings.watchlist.is_empty() || self.shutdown_requested() {
            return;
        }

        let items = self
            .market
            .scrape_items(&self.session, page, &self.settings.watchlist)
            .await;

        let sent = match items.as_slice() {
            [] => {
                warn!("No watchlist items scraped");
                return;
            }
            [item] => self.api.send_item_data(item).await,
            _ => self.api.send_bulk_item_data(&items).await,
        };

        if let Err(e) = sent {
            error!(error = %e, count = items.len(), "Failed to send watchlist items");
        }
    }

    /// Close the page and the browser. Safe to call in any state.
    pub async fn stop(&mut self) -> Result<(), CollectorError> {
        if self.state == CollectorState::Stopped || (self.page.is_none() && !self.session.is_initialized()) {
            warn!("Collector not running, nothing to stop");
            self.state = CollectorState::Stopped;
            return Ok(());
        }

        info!(state = %self.state, "Stopping collector...");
        self.state = CollectorState::ShuttingDown;

        if let Some(page) = self.page.take() {
            if let Err(e) = self.session.close_page(&page).await {
                warn!(error = %e, "Error closing page");
            }
        }

        let closed = self.session.close().await;
        self.state = CollectorState::Stopped;
        info!("Collector stopped");
        closed.map_err(CollectorError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{FakeLauncher, FakePage};
    use crate::data::backend_api::ApiResponse;
    use crate::data::types::{ItemData, PriceHistory, PriceSample};
    use crate::error::ApiError;
    use crate::execution::types::ShutdownHandle;
    use crate::clock::ManualClock;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;

    const RATE: Duration = Duration::from_millis(3000);
    const POLL: Duration = Duration::from_millis(60_000);

    fn task(id: i64, skin: &str, status: TaskStatus) -> HistoryUpdateTask {
        HistoryUpdateTask {
            id,
            skin_name: skin.to_string(),
            wear: "FIELD_TESTED".to_string(),
            status,
            created_at: None,
            finished_at: None,
        }
    }

    #[derive(Default)]
    struct GatewayLog {
        completed: Vec<(i64, CompleteTaskPayload)>,
        polls: usize,
        /// Completion for this task id answers 500
        reject_task: Option<i64>,
    }

    /// Serves queued task lists; triggers shutdown once the queue is drained.
    struct FakeGateway {
        responses: Mutex<VecDeque<Result<Vec<HistoryUpdateTask>, u16>>>,
        log: Arc<Mutex<GatewayLog>>,
        shutdown: ShutdownHandle,
        healthy: bool,
    }

    #[async_trait]
    impl TaskGateway for FakeGateway {
        async fn get_pending_tasks(&self) -> Result<Vec<HistoryUpdateTask>, ApiError> {
            self.log.lock().unwrap().polls += 1;
            let mut responses = self.responses.lock().unwrap();
            let next = responses.pop_front().unwrap_or(Ok(Vec::new()));
            if responses.is_empty() {
                self.shutdown.trigger();
            }
            next.map_err(|status| ApiError::Status {
                status,
                url: "/api/v1/history-update-tasks".to_string(),
            })
        }

        async fn complete_task(&self, task_id: i64, payload: &CompleteTaskPayload) -> Result<ApiResponse, ApiError> {
            let mut log = self.log.lock().unwrap();
            if log.reject_task == Some(task_id) {
                return Err(ApiError::Status {
                    status: 500,
                    url: format!("/api/v1/history-update-tasks/{}/complete", task_id),
                });
            }
            log.completed.push((task_id, payload.clone()));
            Ok(ApiResponse {
                success: true,
                ..Default::default()
            })
        }

        async fn send_item_data(&self, _item: &ItemData) -> Result<ApiResponse, ApiError> {
            Ok(ApiResponse::default())
        }

        async fn send_bulk_item_data(&self, _items: &[ItemData]) -> Result<ApiResponse, ApiError> {
            Ok(ApiResponse::default())
        }

        async fn health_check(&self) -> bool {
            self.healthy
        }
    }

    /// History per skin name; records which skins were fetched, in order.
    struct FakeMarket {
        histories: Vec<(String, Vec<f64>)>,
        fetched: Arc<Mutex<Vec<String>>>,
        buy_order: Option<i64>,
    }

    #[async_trait]
    impl MarketData for FakeMarket {
        async fn initialize(&mut self) -> Result<(), CollectorError> {
            Ok(())
        }

        async fn price_history(
            &mut self,
            _session: &BrowserSession,
            _page: &PageHandle,
            skin_name: &str,
            _wear: &str,
        ) -> Option<PriceHistory> {
            self.fetched.lock().unwrap().push(skin_name.to_string());
            let (_, prices) = self.histories.iter().find(|(name, _)| name == skin_name)?;
            Some(PriceHistory {
                success: true,
                price_prefix: "$".to_string(),
                price_suffix: String::new(),
                prices: prices
                    .iter()
                    .map(|p| PriceSample("Jan 01 2025 01: +0".to_string(), *p, 1))
                    .collect(),
            })
        }

        async fn lowest_buy_order(&mut self, _skin_name: &str, _wear: &str) -> Option<i64> {
            self.buy_order
        }

        async fn scrape_items(
            &mut self,
            _session: &BrowserSession,
            _page: &PageHandle,
            _items: &[WatchlistEntry],
        ) -> Vec<ItemData> {
            Vec::new()
        }
    }

    struct Harness {
        collector: Collector,
        clock: Arc<ManualClock>,
        gateway: Arc<Mutex<GatewayLog>>,
        fetched: Arc<Mutex<Vec<String>>>,
        launcher_closed: Arc<std::sync::atomic::AtomicBool>,
        shutdown: ShutdownHandle,
    }

    fn harness(
        responses: Vec<Result<Vec<HistoryUpdateTask>, u16>>,
        histories: Vec<(&str, Vec<f64>)>,
        cookies: &[&str],
    ) -> Harness {
        let page = Arc::new(FakePage::with_cookies(cookies));
        harness_with(FakeLauncher::with_pages(vec![page]), responses, histories)
    }

    fn harness_with(
        launcher: FakeLauncher,
        responses: Vec<Result<Vec<HistoryUpdateTask>, u16>>,
        histories: Vec<(&str, Vec<f64>)>,
    ) -> Harness {
        let clock = Arc::new(ManualClock::new());
        let (shutdown, shutdown_rx) = ShutdownHandle::new();

        let launcher_closed = launcher.engine_closed.clone();
        let session = BrowserSession::new(Box::new(launcher), clock.clone());

        let gateway = Arc::new(Mutex::new(GatewayLog::default()));
        let api = FakeGateway {
            responses: Mutex::new(responses.into()),
            log: gateway.clone(),
            shutdown: shutdown.clone(),
            healthy: false,
        };

        let fetched = Arc::new(Mutex::new(Vec::new()));
        let market = FakeMarket {
            histories: histories
                .into_iter()
                .map(|(name, prices)| (name.to_string(), prices))
                .collect(),
            fetched: fetched.clone(),
            buy_order: Some(1100),
        };

        let settings = CollectorSettings {
            browser: BrowserOptions {
                headless: true,
                user_data_dir: std::env::temp_dir(),
                viewport: Viewport::default(),
            },
            poll_interval: POLL,
            rate_limit_delay: RATE,
            average_count: 10,
            login_timeout: Duration::from_secs(10),
            watchlist: Vec::new(),
        };

        Harness {
            collector: Collector::new(settings, session, Box::new(api), Box::new(market), clock.clone(), shutdown_rx),
            clock,
            gateway,
            fetched,
            launcher_closed,
            shutdown,
        }
    }

    const LOGGED_IN: &[&str] = &["steamLoginSecure", "sessionid"];

    #[tokio::test]
    async fn test_processes_waiting_tasks_in_order() {
        let tasks = vec![
            task(1, "AWP | Asiimov", TaskStatus::Waiting),
            task(2, "M4A4 | Howl", TaskStatus::Completed),
            task(3, "AK-47 | Redline", TaskStatus::Waiting),
        ];
        // Asiimov has no history: skipped, Redline still completes
        let mut h = harness(
            vec![Ok(tasks), Ok(Vec::new())],
            vec![("AK-47 | Redline", vec![10.0, 12.0, 14.0])],
            LOGGED_IN,
        );

        h.collector.initialize().await.unwrap();
        assert_eq!(h.collector.state(), CollectorState::Ready);

        let page = h.collector.page.clone().unwrap();
        h.collector.run_cycle(&page).await.unwrap();

        assert_eq!(*h.fetched.lock().unwrap(), vec!["AWP | Asiimov", "AK-47 | Redline"]);
        assert_eq!(h.clock.sleeps(), vec![RATE, RATE]);

        let log = h.gateway.lock().unwrap();
        assert_eq!(log.completed.len(), 1);
        let (id, payload) = &log.completed[0];
        assert_eq!(*id, 3);
        assert_eq!(payload.average_price, 1200);
        assert_eq!(payload.last_sale_price, Some(1400));
        assert_eq!(payload.lowest_buy_order_price, Some(1100));
    }

    #[tokio::test]
    async fn test_failed_completion_does_not_stop_cycle() {
        let tasks = vec![
            task(1, "AWP | Asiimov", TaskStatus::Waiting),
            task(2, "AK-47 | Redline", TaskStatus::Waiting),
        ];
        let mut h = harness(
            vec![Ok(tasks), Ok(Vec::new())],
            vec![("AWP | Asiimov", vec![50.0]), ("AK-47 | Redline", vec![10.0, 12.0])],
            LOGGED_IN,
        );
        h.gateway.lock().unwrap().reject_task = Some(1);

        h.collector.initialize().await.unwrap();
        let page = h.collector.page.clone().unwrap();
        h.collector.run_cycle(&page).await.unwrap();

        assert_eq!(*h.fetched.lock().unwrap(), vec!["AWP | Asiimov", "AK-47 | Redline"]);
        assert_eq!(h.clock.sleeps(), vec![RATE, RATE]);

        let log = h.gateway.lock().unwrap();
        assert_eq!(log.completed.len(), 1);
        assert_eq!(log.completed[0].0, 2);
        assert_eq!(log.completed[0].1.average_price, 1100);
    }

    #[tokio::test]
    async fn test_start_stops_after_shutdown() {
        let mut h = harness(
            vec![Ok(vec![task(1, "AK-47 | Redline", TaskStatus::Waiting)])],
            vec![("AK-47 | Redline", vec![5.0, 7.5])],
            LOGGED_IN,
        );
        h.collector.initialize().await.unwrap();
        h.collector.start().await.unwrap();

        // The in-flight cycle finished; no poll wait afterwards
        assert_eq!(h.gateway.lock().unwrap().completed.len(), 1);
        assert_eq!(h.gateway.lock().unwrap().polls, 1);
        assert_eq!(h.clock.sleeps(), vec![RATE]);

        h.collector.stop().await.unwrap();
        assert_eq!(h.collector.state(), CollectorState::Stopped);
        assert!(h.launcher_closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_cycle_error_waits_fallback_delay() {
        let mut h = harness(vec![Err(503), Ok(Vec::new())], Vec::new(), LOGGED_IN);
        h.collector.initialize().await.unwrap();
        h.collector.start().await.unwrap();

        assert_eq!(h.gateway.lock().unwrap().polls, 2);
        assert_eq!(h.clock.sleeps(), vec![ERROR_RETRY_DELAY]);
    }

    #[tokio::test]
    async fn test_poll_interval_between_cycles() {
        let mut h = harness(vec![Ok(Vec::new()), Ok(Vec::new())], Vec::new(), LOGGED_IN);
        h.collector.initialize().await.unwrap();
        h.collector.start().await.unwrap();

        assert_eq!(h.gateway.lock().unwrap().polls, 2);
        assert_eq!(h.clock.sleeps(), vec![POLL]);
    }

    #[tokio::test]
    async fn test_login_timeout_fails_initialization() {
        let mut h = harness(Vec::new(), Vec::new(), &["sessionid"]);

        let err = h.collector.initialize().await.unwrap_err();
        assert!(matches!(err, CollectorError::AuthenticationTimeout(10)));
        assert_eq!(h.collector.state(), CollectorState::Failed);

        h.collector.stop().await.unwrap();
        assert!(h.launcher_closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_shutdown_during_login_wait() {
        let mut h = harness(Vec::new(), Vec::new(), &["sessionid"]);
        h.shutdown.trigger();

        let err = h.collector.initialize().await.unwrap_err();
        assert!(matches!(err, CollectorError::ShutdownRequested));
        assert_eq!(h.collector.state(), CollectorState::ShuttingDown);
        assert_eq!(h.clock.total_slept(), Duration::ZERO);

        h.collector.stop().await.unwrap();
        assert_eq!(h.collector.state(), CollectorState::Stopped);
        assert!(h.launcher_closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_browser_launch_failure_fails_initialization() {
        let mut h = harness_with(FakeLauncher::failing(), Vec::new(), Vec::new());

        let err = h.collector.initialize().await.unwrap_err();
        assert!(matches!(err, CollectorError::FatalInitialization(_)));
        assert_eq!(h.collector.state(), CollectorState::Failed);

        // Nothing was launched, so stop only logs
        h.collector.stop().await.unwrap();
        assert_eq!(h.collector.state(), CollectorState::Stopped);
        assert!(!h.launcher_closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_stop_without_initialize() {
        let mut h = harness(Vec::new(), Vec::new(), LOGGED_IN);
        h.collector.stop().await.unwrap();
        h.collector.stop().await.unwrap();
        assert_eq!(h.collector.state(), CollectorState::Stopped);
    }

    #[tokio::test]
    async fn test_start_requires_initialize() {
        let mut h = harness(Vec::new(), Vec::new(), LOGGED_IN);
        assert!(matches!(
            h.collector.start().await,
            Err(CollectorError::Browser(BrowserError::NotInitialized))
        ));
    }
}
