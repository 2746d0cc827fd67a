//! HTTP client for the churn analytics backend.
//!
//! Thin wrapper over reqwest: attaches Basic auth from an explicit [`Session`]
//! (no ambient credential globals), serializes filters through [`crate::query`]
//! and normalizes every failure into [`ApiError`]. All backend routes use the
//! Django trailing-slash convention.

use crate::models::*;
use crate::query::{AlertHistoryFilters, CustomerFilters};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything that can go wrong talking to the backend.
///
/// Partial bulk failure is not an error: it arrives as a 2xx
/// [`BulkOutcome`] and is classified by the grid.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// 401 anywhere in the protected area; drives the login redirect.
    #[error("authentication required")]
    Unauthorized,

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("unexpected response shape: {0}")]
    Decode(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

/// In-memory credential holder with an explicit login/logout lifecycle.
/// Credentials never touch storage.
#[derive(Debug, Clone, Default)]
pub struct Session {
    credentials: Option<Credentials>,
}

impl Session {
    pub fn anonymous() -> Self {
        Session { credentials: None }
    }

    pub fn with_credentials(credentials: Credentials) -> Self {
        Session {
            credentials: Some(credentials),
        }
    }

    pub fn login(&mut self, credentials: Credentials) {
        self.credentials = Some(credentials);
    }

    pub fn logout(&mut self) {
        self.credentials = None;
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn username(&self) -> Option<&str> {
        self.credentials.as_ref().map(|c| c.username.as_str())
    }
}

/// Authenticated client for every endpoint the console consumes.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    session: Session,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, session: Session) -> ApiResult<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(ApiClient {
            http,
            base_url,
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn login(&mut self, credentials: Credentials) {
        self.session.login(credentials);
    }

    pub fn logout(&mut self) {
        self.session.logout();
    }

    // ========================================================================
    // CUSTOMERS
    // ========================================================================

    pub async fn list_customers(
        &self,
        filters: &CustomerFilters,
    ) -> ApiResult<PaginatedResponse<Customer>> {
        let path = format!("/api/customers/?{}", filters.to_query_string());
        self.fetch_json(self.request(Method::GET, &path)).await
    }

    pub async fn create_customer(&self, customer: &Customer) -> ApiResult<Customer> {
        let req = self.request(Method::POST, "/api/customers/").json(customer);
        self.fetch_json(req).await
    }

    /// PUT `/api/customers/{id}/`. The body always carries the id, matching
    /// the backend's serializer expectations.
    pub async fn update_customer(&self, customer_id: u32, customer: &Customer) -> ApiResult<Customer> {
        let mut body = customer.clone();
        body.customer_id = Some(customer_id);
        let path = format!("/api/customers/{}/", customer_id);
        let req = self.request(Method::PUT, &path).json(&body);
        self.fetch_json(req).await
    }

    pub async fn delete_customer(&self, customer_id: u32) -> ApiResult<()> {
        let path = format!("/api/customers/{}/", customer_id);
        self.fetch_empty(self.request(Method::DELETE, &path)).await
    }

    // ========================================================================
    // BULK OPERATIONS
    // ========================================================================

    pub async fn bulk_update_customers(&self, patches: &[CustomerPatch]) -> ApiResult<BulkOutcome> {
        let req = self
            .request(Method::POST, "/api/customers/bulk/update/")
            .json(&patches);
        self.fetch_json(req).await
    }

    pub async fn bulk_delete_customers(&self, ids: &[u32]) -> ApiResult<BulkOutcome> {
        let req = self
            .request(Method::POST, "/api/customers/bulk/delete/")
            .json(&ids);
        self.fetch_json(req).await
    }

    // ========================================================================
    // PREDICTION & RISK
    // ========================================================================

    pub async fn predict(&self, input: &PredictionInput) -> ApiResult<PredictionResult> {
        let req = self.request(Method::POST, "/api/predict/").json(input);
        self.fetch_json(req).await
    }

    /// Cached monitoring score for one customer. 404 when the monitoring job
    /// has never scored this customer.
    pub async fn monitoring_result(&self, customer_id: u32) -> ApiResult<MonitoringResult> {
        let path = format!("/api/risk/monitoring/{}/", customer_id);
        self.fetch_json(self.request(Method::GET, &path)).await
    }

    /// Batch risk scores. Ids without a cached score are simply absent from
    /// the response.
    pub async fn risk_scores(&self, customer_ids: &[u32]) -> ApiResult<Vec<BatchRiskScore>> {
        let query = customer_ids
            .iter()
            .map(|id| format!("customer_ids={}", id))
            .collect::<Vec<_>>()
            .join("&");
        let path = format!("/api/risk/monitoring/batch/?{}", query);
        let response: BatchRiskResponse = self.fetch_json(self.request(Method::GET, &path)).await?;
        Ok(response.results)
    }

    pub async fn risk_dashboard(&self) -> ApiResult<RiskDashboard> {
        self.fetch_json(self.request(Method::GET, "/api/risk/dashboard/"))
            .await
    }

    pub async fn trigger_monitoring(&self) -> ApiResult<MonitoringTrigger> {
        self.fetch_json(self.request(Method::POST, "/api/risk/monitor/trigger/"))
            .await
    }

    // ========================================================================
    // CSV IMPORT
    // ========================================================================

    /// Multipart upload of a customer CSV. A body-level `status: "error"` is
    /// treated as a failure even when the transport succeeds.
    pub async fn import_csv(&self, path: &Path, update_existing: bool) -> ApiResult<ImportReport> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ApiError::Decode(format!("cannot read {}: {}", path.display(), e)))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "import.csv".to_string());

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("text/csv")
            .map_err(ApiError::Transport)?;
        let form = reqwest::multipart::Form::new()
            .part("csv_file", part)
            .text("update_existing", update_existing.to_string());

        let req = self
            .request(Method::POST, "/api/customers/import-csv/")
            .multipart(form);
        let report: ImportReport = self.fetch_json(req).await?;

        if report.status == ImportStatus::Error {
            return Err(ApiError::Status {
                status: 200,
                message: report
                    .message
                    .unwrap_or_else(|| "import failed".to_string()),
            });
        }
        Ok(report)
    }

    // ========================================================================
    // USERS
    // ========================================================================

    /// Some deployments paginate the user list, some return a bare array.
    /// Accept both.
    pub async fn list_users(&self) -> ApiResult<Vec<User>> {
        let value: serde_json::Value = self
            .fetch_json(self.request(Method::GET, "/api/users/"))
            .await?;
        decode_rows(value)
    }

    pub async fn create_user(&self, user: &NewUser) -> ApiResult<User> {
        let req = self.request(Method::POST, "/api/users/").json(user);
        self.fetch_json(req).await
    }

    // ========================================================================
    // MODEL & DASHBOARD
    // ========================================================================

    pub async fn train_model(&self) -> ApiResult<TrainOutcome> {
        self.fetch_json(self.request(Method::POST, "/api/train/"))
            .await
    }

    pub async fn model_metrics(&self) -> ApiResult<ModelMetrics> {
        self.fetch_json(self.request(Method::GET, "/api/model-metrics/"))
            .await
    }

    pub async fn dashboard_stats(&self) -> ApiResult<DashboardStats> {
        self.fetch_json(self.request(Method::GET, "/api/dashboard/stats/"))
            .await
    }

    // ========================================================================
    // ALERTS
    // ========================================================================

    pub async fn alert_config(&self) -> ApiResult<AlertConfig> {
        self.fetch_json(self.request(Method::GET, "/api/alerts/config/"))
            .await
    }

    pub async fn set_alert_config(&self, config: &AlertConfig) -> ApiResult<AlertConfig> {
        let req = self.request(Method::POST, "/api/alerts/config/").json(config);
        self.fetch_json(req).await
    }

    pub async fn alert_history(&self, filters: &AlertHistoryFilters) -> ApiResult<Vec<AlertRecord>> {
        let path = format!("/api/alerts/history/?{}", filters.to_query_string());
        let value: serde_json::Value = self.fetch_json(self.request(Method::GET, &path)).await?;
        decode_rows(value)
    }

    pub async fn alert_stats(&self) -> ApiResult<AlertStats> {
        self.fetch_json(self.request(Method::GET, "/api/alerts/stats/"))
            .await
    }

    // ========================================================================
    // PLUMBING
    // ========================================================================

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self
            .http
            .request(method, url)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(creds) = self.session.credentials() {
            req = req.basic_auth(&creds.username, Some(&creds.password));
        }
        req
    }

    async fn fetch_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> ApiResult<T> {
        let body = self.fetch_body(req).await?;
        serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn fetch_empty(&self, req: RequestBuilder) -> ApiResult<()> {
        self.fetch_body(req).await.map(|_| ())
    }

    async fn fetch_body(&self, req: RequestBuilder) -> ApiResult<String> {
        let response = req.send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        Ok(body)
    }
}

/// Accept either a bare JSON array or a `{results: [...]}` envelope.
fn decode_rows<T: DeserializeOwned>(value: serde_json::Value) -> ApiResult<Vec<T>> {
    let rows = match value {
        serde_json::Value::Array(_) => value,
        serde_json::Value::Object(mut obj) => obj
            .remove("results")
            .ok_or_else(|| ApiError::Decode("object response without `results`".to_string()))?,
        other => {
            return Err(ApiError::Decode(format!(
                "expected array or envelope, got {}",
                other
            )))
        }
    };
    serde_json::from_value(rows).map_err(|e| ApiError::Decode(e.to_string()))
}

/// Pull a human-readable message out of an error body, falling back to a
/// truncated raw payload.
fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["message", "detail", "error"] {
            if let Some(message) = value.get(key).and_then(|v| v.as_str()) {
                return message.to_string();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "no response body".to_string()
    } else {
        trimmed.chars().take(200).collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================
