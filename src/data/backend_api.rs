use crate::clock::Clock;
use crate::config::ApiConfig;
use crate::data::retry::{with_retry, RetryPolicy};
use crate::data::types::{CompleteTaskPayload, HistoryUpdateTask, ItemData};
use crate::error::{ApiError, CollectorError, ConfigError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const TASKS_PATH: &str = "/api/v1/history-update-tasks";
const ITEMS_PATH: &str = "/items";
const BULK_ITEMS_PATH: &str = "/items/bulk";
const HEALTH_PATH: &str = "/health";

/// Acknowledgement body. The task endpoints omit `success`, so a 2xx without
/// the field counts as accepted.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

fn default_success() -> bool {
    true
}

#[derive(Serialize)]
struct BulkItems<'a> {
    items: &'a [ItemData],
}

/// Backend operations the collector depends on.
#[async_trait]
pub trait TaskGateway: Send + Sync {
    async fn get_pending_tasks(&self) -> Result<Vec<HistoryUpdateTask>, ApiError>;

    async fn complete_task(&self, task_id: i64, payload: &CompleteTaskPayload) -> Result<ApiResponse, ApiError>;

    async fn send_item_data(&self, item: &ItemData) -> Result<ApiResponse, ApiError>;

    async fn send_bulk_item_data(&self, items: &[ItemData]) -> Result<ApiResponse, ApiError>;

    /// Never fails; any problem reads as unhealthy.
    async fn health_check(&self) -> bool;
}

pub fn complete_task_path(task_id: i64) -> String {
    format!("{}/{}/complete", TASKS_PATH, task_id)
}

fn decode<T: DeserializeOwned>(url: &str, body: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|e| ApiError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })
}

/// Empty 2xx bodies are accepted; an explicit `success=false` is a rejection.
pub fn acknowledgement(url: &str, body: &str) -> Result<ApiResponse, ApiError> {
    let response = if body.trim().is_empty() {
        ApiResponse {
            success: true,
            ..Default::default()
        }
    } else {
        decode::<ApiResponse>(url, body)?
    };

    if !response.success {
        let reason = response
            .error
            .clone()
            .or_else(|| response.message.clone())
            .unwrap_or_else(|| "success=false".to_string());
        return Err(ApiError::Rejected(reason));
    }
    Ok(response)
}

pub struct BackendApiClient {
    client: Client,
    base_url: String,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl BackendApiClient {
    pub fn new(config: &ApiConfig, clock: Arc<dyn Clock>) -> Result<Self, CollectorError> {
        let mut headers = HeaderMap::new();
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", config.key))
            .map_err(|_| ConfigError::Invalid("API_KEY contains invalid header characters".to_string()))?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            clock,
            retry: RetryPolicy::api(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// One request: logs it, fails on non-2xx, returns the body text.
    async fn send_once<B: Serialize + Sync + ?Sized>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
    ) -> Result<String, ApiError> {
        debug!(method = %method, url, "API Request");

        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            error!(url, message = %e, "API Request Error");
            ApiError::Transport(e)
        })?;

        let status = response.status();
        debug!(status = status.as_u16(), url, "API Response");

        if !status.is_success() {
            error!(status = status.as_u16(), url, "API Response Error");
            return Err(ApiError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.text().await?)
    }

    /// `send_once` under the exponential retry policy.
    async fn send<B: Serialize + Sync + ?Sized>(
        &self,
        operation: &str,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<(String, String), ApiError> {
        let url = self.url(path);
        let target = url.as_str();
        let text = with_retry(&self.retry, self.clock.as_ref(), operation, move |_| {
            self.send_once(method.clone(), target, body)
        })
        .await
        .map_err(|e| {
            error!(error = %e, "{} failed", operation);
            e
        })?;
        Ok((url, text))
    }
}

#[async_trait]
impl TaskGateway for BackendApiClient {
    async fn get_pending_tasks(&self) -> Result<Vec<HistoryUpdateTask>, ApiError> {
        let (url, body) = self
            .send::<()>("getHistoryUpdateTasks", Method::GET, TASKS_PATH, None)
            .await?;
        let tasks: Vec<HistoryUpdateTask> = decode(&url, &body)?;
        debug!(count = tasks.len(), "History update tasks fetched");
        Ok(tasks)
    }

    async fn complete_task(&self, task_id: i64, payload: &CompleteTaskPayload) -> Result<ApiResponse, ApiError> {
        info!(
            task_id,
            skin_name = %payload.skin_name,
            wear = %payload.wear,
            average_price = payload.average_price,
            "Completing history task"
        );
        let (url, body) = self
            .send("completeHistoryTask", Method::POST, &complete_task_path(task_id), Some(payload))
            .await?;
        acknowledgement(&url, &body)
    }

    async fn send_item_data(&self, item: &ItemData) -> Result<ApiResponse, ApiError> {
        info!(name = %item.name, price = item.price, "Sending item data to API");
        let (url, body) = self
            .send("sendItemData", Method::POST, ITEMS_PATH, Some(item))
            .await?;
        let response = acknowledgement(&url, &body)?;
        info!(name = %item.name, "Item data sent successfully");
        Ok(response)
    }

    async fn send_bulk_item_data(&self, items: &[ItemData]) -> Result<ApiResponse, ApiError> {
        info!("Sending {} items to API", items.len());
        let (url, body) = self
            .send("sendBulkItemData", Method::POST, BULK_ITEMS_PATH, Some(&BulkItems { items }))
            .await?;
        let response = acknowledgement(&url, &body)?;
        info!(count = items.len(), "Bulk item data sent successfully");
        Ok(response)
    }

    async fn health_check(&self) -> bool {
        info!("Performing API health check...");
        let url = self.url(HEALTH_PATH);

        let body = match self.send_once::<()>(Method::GET, &url, None).await {
            Ok(body) => body,
            Err(e) => {
                error!(error = %e, "API health check failed");
                return false;
            }
        };

        match decode::<serde_json::Value>(&url, &body) {
            Ok(value) if value.get("success").and_then(|s| s.as_bool()) == Some(true) => {
                info!("API health check passed");
                true
            }
            Ok(value) => {
                warn!(response = %value, "API health check failed");
                false
            }
            Err(e) => {
                error!(error = %e, "API health check failed");
                false
            }
        }
    }
}
