//! In-memory mock of the churn analytics backend.
//!
//! Serves every endpoint the console consumes with Django-compatible shapes
//! (trailing slashes, `{count, next, previous, results}` envelopes, Basic
//! auth). Used by the integration tests and by the `churn-mock-server` binary
//! so the console can be demoed without a real backend. Scoring is a
//! deterministic stub, not a model.

use crate::models::*;
use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use base64::Engine;
use chrono::{Duration, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;

pub const MOCK_USERNAME: &str = "admin";
pub const MOCK_PASSWORD: &str = "admin";

/// Shared mock backend state.
pub struct MockState {
    customers: Mutex<Vec<Customer>>,
    next_id: Mutex<u32>,
    monitoring: Mutex<HashMap<u32, MonitoringResult>>,
    users: Mutex<Vec<User>>,
    alert_config: Mutex<AlertConfig>,
    alerts: Mutex<Vec<AlertRecord>>,
    metrics: Mutex<ModelMetrics>,
    /// Test hook: force `/api/predict/` to fail with a 500.
    fail_predict: AtomicBool,
}

impl MockState {
    pub fn seeded() -> Self {
        let customers = seed_customers();
        let next_id = customers.iter().filter_map(|c| c.customer_id).max().unwrap_or(0) + 1;
        let state = MockState {
            customers: Mutex::new(customers),
            next_id: Mutex::new(next_id),
            monitoring: Mutex::new(HashMap::new()),
            users: Mutex::new(vec![User {
                id: 1,
                username: MOCK_USERNAME.to_string(),
                email: "admin@example.com".to_string(),
                first_name: "Admin".to_string(),
                last_name: "User".to_string(),
                is_staff: true,
            }]),
            alert_config: Mutex::new(AlertConfig::default()),
            alerts: Mutex::new(Vec::new()),
            metrics: Mutex::new(ModelMetrics {
                latest_metrics: Some(canned_metrics(0.86)),
                best_metrics: Some(canned_metrics(0.87)),
            }),
            fail_predict: AtomicBool::new(false),
        };
        state.seed_alerts();
        state
    }

    fn seed_alerts(&self) {
        let now = Utc::now();
        let mut alerts = self.alerts.lock().unwrap();
        alerts.push(AlertRecord {
            id: 1,
            customer: 1,
            customer_name: "Abbott".to_string(),
            alert_type: AlertType::HighRisk,
            message: json!({"text": "risk above threshold"}),
            sent_at: now - Duration::days(2),
            was_sent: true,
            error_message: None,
        });
        alerts.push(AlertRecord {
            id: 2,
            customer: 3,
            customer_name: "Clark".to_string(),
            alert_type: AlertType::RiskIncrease,
            message: json!({"text": "risk up 25 points"}),
            sent_at: now - Duration::days(1),
            was_sent: false,
            error_message: Some("webhook timeout".to_string()),
        });
        alerts.push(AlertRecord {
            id: 3,
            customer: 0,
            customer_name: String::new(),
            alert_type: AlertType::Summary,
            message: json!({"text": "daily summary"}),
            sent_at: now,
            was_sent: true,
            error_message: None,
        });
    }

    // ------------------------------------------------------------------
    // Test helpers
    // ------------------------------------------------------------------

    pub fn customer_count(&self) -> usize {
        self.customers.lock().unwrap().len()
    }

    pub fn customer_ids(&self) -> Vec<u32> {
        self.customers
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| c.customer_id)
            .collect()
    }

    pub fn first_customer_id(&self) -> Option<u32> {
        self.customers
            .lock()
            .unwrap()
            .first()
            .and_then(|c| c.customer_id)
    }

    pub fn customer(&self, id: u32) -> Option<Customer> {
        self.customers
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.customer_id == Some(id))
            .cloned()
    }

    pub fn set_monitoring(&self, id: u32, result: MonitoringResult) {
        self.monitoring.lock().unwrap().insert(id, result);
    }

    pub fn set_fail_predict(&self, fail: bool) {
        self.fail_predict.store(fail, Ordering::SeqCst);
    }
}

/// Deterministic churn score used by the mock predict and monitoring
/// endpoints. Not a model; just stable, plausible numbers.
pub fn stub_score(input: &PredictionInput) -> f64 {
    let mut score: f64 = 0.12;
    if !input.is_active_member {
        score += 0.25;
    }
    if input.num_of_products >= 3 {
        score += 0.2;
    }
    if input.balance <= 0.0 {
        score += 0.05;
    }
    score += (input.age as f64 - 30.0).max(0.0) / 200.0;
    score += (650.0 - input.credit_score as f64).max(0.0) / 2000.0;
    score.clamp(0.01, 0.99)
}

fn stub_importances() -> Vec<FeatureImportance> {
    vec![
        FeatureImportance { feature: "age".to_string(), importance: 0.24 },
        FeatureImportance { feature: "num_of_products".to_string(), importance: 0.21 },
        FeatureImportance { feature: "is_active_member".to_string(), importance: 0.18 },
        FeatureImportance { feature: "balance".to_string(), importance: 0.14 },
        FeatureImportance { feature: "credit_score".to_string(), importance: 0.11 },
        FeatureImportance { feature: "geography".to_string(), importance: 0.07 },
        FeatureImportance { feature: "estimated_salary".to_string(), importance: 0.05 },
    ]
}

fn canned_metrics(test_accuracy: f64) -> TrainingMetrics {
    TrainingMetrics {
        train_accuracy: test_accuracy + 0.05,
        test_accuracy,
        precision_class1: 0.71,
        recall_class1: 0.58,
        f1_class1: 0.64,
        feature_importance: stub_importances(),
        training_details: TrainingDetails {
            total_samples: 10_000,
            training_time: 12.4,
            cross_val_scores: vec![0.84, 0.86, 0.85, 0.87, 0.85],
        },
        best_params: HashMap::from([
            ("n_estimators".to_string(), json!(300)),
            ("max_depth".to_string(), json!(8)),
        ]),
    }
}

fn seed_customers() -> Vec<Customer> {
    let surnames = [
        "Abbott", "Bauer", "Clark", "Dubois", "Ertl", "Fischer", "Garnier", "Hoffman",
        "Ibarra", "Jansen", "Keller", "Lemaire", "Moreau", "Navarro", "Okafor", "Petit",
        "Quintana", "Richter", "Santos", "Tremblay", "Ulrich", "Vidal", "Weber", "Ximenez",
    ];
    let geographies = ["France", "Germany", "Spain"];
    let genders = ["Female", "Male"];

    surnames
        .iter()
        .enumerate()
        .map(|(i, surname)| {
            let n = i as i32;
            Customer {
                customer_id: Some(i as u32 + 1),
                credit_score: 520 + n * 17 % 330,
                age: 23 + n * 3 % 50,
                tenure: n % 10,
                balance: if n % 4 == 0 { 0.0 } else { 35_000.0 + (n as f64) * 4211.5 },
                num_of_products: 1 + n % 4,
                has_cr_card: n % 3 != 0,
                is_active_member: n % 2 == 0,
                estimated_salary: 28_000.0 + (n as f64) * 6173.0,
                geography: geographies[i % geographies.len()].to_string(),
                gender: genders[i % genders.len()].to_string(),
                exited: Some(n % 5 == 1),
                surname: Some(surname.to_string()),
            }
        })
        .collect()
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn router(state: Arc<MockState>) -> Router {
    let api = Router::new()
        .route("/customers/", get(list_customers).post(create_customer))
        .route("/customers/:id/", axum::routing::put(update_customer).delete(delete_customer))
        .route("/customers/bulk/update/", post(bulk_update))
        .route("/customers/bulk/delete/", post(bulk_delete))
        .route("/customers/import-csv/", post(import_csv))
        .route("/predict/", post(predict))
        .route("/train/", post(train_model))
        .route("/model-metrics/", get(model_metrics))
        .route("/dashboard/stats/", get(dashboard_stats))
        .route("/users/", get(list_users).post(create_user))
        .route("/risk/monitoring/batch/", get(batch_risk_scores))
        .route("/risk/monitoring/:id/", get(monitoring_result))
        .route("/risk/dashboard/", get(risk_dashboard))
        .route("/risk/monitor/trigger/", post(trigger_monitoring))
        .route("/alerts/config/", get(alert_config).post(set_alert_config))
        .route("/alerts/history/", get(alert_history))
        .route("/alerts/stats/", get(alert_stats))
        .with_state(state);

    Router::new()
        .nest("/api", api)
        .layer(CorsLayer::permissive())
}

fn authorized(headers: &HeaderMap) -> bool {
    let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    let Some(encoded) = value.strip_prefix("Basic ") else {
        return false;
    };
    let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(encoded) else {
        return false;
    };
    match String::from_utf8(decoded) {
        Ok(pair) => pair == format!("{}:{}", MOCK_USERNAME, MOCK_PASSWORD),
        Err(_) => false,
    }
}

fn guard(headers: &HeaderMap) -> Result<(), Response> {
    if authorized(headers) {
        Ok(())
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Invalid username/password."})),
        )
            .into_response())
    }
}

fn not_found(what: &str) -> Response {
    (StatusCode::NOT_FOUND, Json(json!({"detail": format!("{} not found", what)}))).into_response()
}

// ============================================================================
// CUSTOMER HANDLERS
// ============================================================================

/// GET /api/customers/ - filtered, ordered, paginated customer list
async fn list_customers(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if let Err(resp) = guard(&headers) {
        return resp;
    }

    let mut rows: Vec<Customer> = state.customers.lock().unwrap().clone();

    if let Some(search) = params.get("search").filter(|s| !s.is_empty()) {
        let needle = search.to_lowercase();
        rows.retain(|c| {
            c.surname
                .as_deref()
                .map(|s| s.to_lowercase().contains(&needle))
                .unwrap_or(false)
        });
    }
    if let Some(geography) = params.get("geography") {
        rows.retain(|c| &c.geography == geography);
    }
    if let Some(gender) = params.get("gender") {
        rows.retain(|c| &c.gender == gender);
    }
    if let Some(min) = int_param(&params, "min_age") {
        rows.retain(|c| c.age >= min);
    }
    if let Some(max) = int_param(&params, "max_age") {
        rows.retain(|c| c.age <= max);
    }
    if let Some(min) = int_param(&params, "min_credit_score") {
        rows.retain(|c| c.credit_score >= min);
    }
    if let Some(max) = int_param(&params, "max_credit_score") {
        rows.retain(|c| c.credit_score <= max);
    }
    if let Some(min) = float_param(&params, "min_balance") {
        rows.retain(|c| c.balance >= min);
    }
    if let Some(max) = float_param(&params, "max_balance") {
        rows.retain(|c| c.balance <= max);
    }
    if let Some(exited) = bool_param(&params, "exited") {
        rows.retain(|c| c.exited == Some(exited));
    }
    if let Some(has_card) = bool_param(&params, "has_cr_card") {
        rows.retain(|c| c.has_cr_card == has_card);
    }
    if let Some(active) = bool_param(&params, "is_active_member") {
        rows.retain(|c| c.is_active_member == active);
    }

    if let Some(ordering) = params.get("ordering").filter(|o| !o.is_empty()) {
        sort_customers(&mut rows, ordering);
    }

    let page: usize = params
        .get("page")
        .and_then(|p| p.parse().ok())
        .unwrap_or(1)
        .max(1);
    let page_size: usize = params
        .get("page_size")
        .and_then(|p| p.parse().ok())
        .unwrap_or(10)
        .max(1);

    let count = rows.len() as u64;
    let start = (page - 1) * page_size;
    let results: Vec<Customer> = rows.into_iter().skip(start).take(page_size).collect();

    let total_pages = (count as usize).div_ceil(page_size).max(1);
    let next = (page < total_pages).then(|| format!("/api/customers/?page={}", page + 1));
    let previous = (page > 1).then(|| format!("/api/customers/?page={}", page - 1));

    Json(PaginatedResponse {
        count,
        next,
        previous,
        results,
    })
    .into_response()
}

/// POST /api/customers/ - create with a server-assigned id
async fn create_customer(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(mut customer): Json<Customer>,
) -> Response {
    if let Err(resp) = guard(&headers) {
        return resp;
    }

    let mut next_id = state.next_id.lock().unwrap();
    customer.customer_id = Some(*next_id);
    *next_id += 1;

    state.customers.lock().unwrap().push(customer.clone());
    (StatusCode::CREATED, Json(customer)).into_response()
}

/// PUT /api/customers/:id/ - full update
async fn update_customer(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<u32>,
    Json(mut customer): Json<Customer>,
) -> Response {
    if let Err(resp) = guard(&headers) {
        return resp;
    }

    customer.customer_id = Some(id);
    let mut customers = state.customers.lock().unwrap();
    match customers.iter_mut().find(|c| c.customer_id == Some(id)) {
        Some(slot) => {
            *slot = customer.clone();
            Json(customer).into_response()
        }
        None => not_found("customer"),
    }
}

/// DELETE /api/customers/:id/
async fn delete_customer(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<u32>,
) -> Response {
    if let Err(resp) = guard(&headers) {
        return resp;
    }

    let mut customers = state.customers.lock().unwrap();
    let before = customers.len();
    customers.retain(|c| c.customer_id != Some(id));
    if customers.len() == before {
        not_found("customer")
    } else {
        StatusCode::NO_CONTENT.into_response()
    }
}

/// POST /api/customers/bulk/update/ - per-record success/failure granularity
async fn bulk_update(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(patches): Json<Vec<CustomerPatch>>,
) -> Response {
    if let Err(resp) = guard(&headers) {
        return resp;
    }

    let mut customers = state.customers.lock().unwrap();
    let mut updated = Vec::new();
    let mut failed = Vec::new();

    for patch in &patches {
        match customers
            .iter_mut()
            .find(|c| c.customer_id == Some(patch.customer_id))
        {
            Some(customer) => {
                if let Some(active) = patch.is_active_member {
                    customer.is_active_member = active;
                }
                if let Some(exited) = patch.exited {
                    customer.exited = Some(exited);
                }
                updated.push(patch.customer_id);
            }
            None => failed.push(patch.customer_id),
        }
    }

    Json(classify_bulk(&updated, &failed, "updated")).into_response()
}

/// POST /api/customers/bulk/delete/
async fn bulk_delete(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(ids): Json<Vec<u32>>,
) -> Response {
    if let Err(resp) = guard(&headers) {
        return resp;
    }

    let mut customers = state.customers.lock().unwrap();
    let mut deleted = Vec::new();
    let mut failed = Vec::new();

    for id in &ids {
        let before = customers.len();
        customers.retain(|c| c.customer_id != Some(*id));
        if customers.len() < before {
            deleted.push(*id);
        } else {
            failed.push(*id);
        }
    }

    Json(classify_bulk(&deleted, &failed, "deleted")).into_response()
}

fn classify_bulk(succeeded: &[u32], failed: &[u32], verb: &str) -> BulkOutcome {
    let status = if failed.is_empty() {
        BulkStatus::Success
    } else if succeeded.is_empty() {
        BulkStatus::Error
    } else {
        BulkStatus::PartialSuccess
    };
    BulkOutcome {
        status,
        message: format!("{} {} of {} customers", verb, succeeded.len(), succeeded.len() + failed.len()),
        data: json!({"succeeded": succeeded, "failed": failed}),
    }
}

/// POST /api/customers/import-csv/ - multipart CSV upload
async fn import_csv(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    if let Err(resp) = guard(&headers) {
        return resp;
    }

    let mut file_bytes: Option<Vec<u8>> = None;
    let mut update_existing = false;

    while let Ok(Some(field)) = multipart.next_field().await {
        match field.name() {
            Some("csv_file") => {
                file_bytes = field.bytes().await.ok().map(|b| b.to_vec());
            }
            Some("update_existing") => {
                if let Ok(text) = field.text().await {
                    update_existing = text == "true";
                }
            }
            _ => {}
        }
    }

    let Some(bytes) = file_bytes else {
        return Json(ImportReport {
            status: ImportStatus::Error,
            created: 0,
            updated: 0,
            skipped: 0,
            message: Some("missing csv_file field".to_string()),
            details: None,
        })
        .into_response();
    };

    let mut reader = csv::Reader::from_reader(bytes.as_slice());
    let mut details = ImportDetails::default();
    let mut customers = state.customers.lock().unwrap();
    let mut next_id = state.next_id.lock().unwrap();

    for record in reader.deserialize::<Customer>() {
        let row = match record {
            Ok(row) => row,
            Err(e) => {
                return Json(ImportReport {
                    status: ImportStatus::Error,
                    created: 0,
                    updated: 0,
                    skipped: 0,
                    message: Some(format!("invalid CSV: {}", e)),
                    details: None,
                })
                .into_response();
            }
        };

        match row.customer_id {
            Some(id) if customers.iter().any(|c| c.customer_id == Some(id)) => {
                if update_existing {
                    if let Some(slot) = customers.iter_mut().find(|c| c.customer_id == Some(id)) {
                        *slot = row;
                    }
                    details.updated_ids.push(id);
                } else {
                    details.skipped_ids.push(id);
                }
            }
            _ => {
                let mut row = row;
                row.customer_id = Some(*next_id);
                details.created_ids.push(*next_id);
                *next_id += 1;
                customers.push(row);
            }
        }
    }

    Json(ImportReport {
        status: ImportStatus::Success,
        created: details.created_ids.len() as u32,
        updated: details.updated_ids.len() as u32,
        skipped: details.skipped_ids.len() as u32,
        message: None,
        details: Some(details),
    })
    .into_response()
}

// ============================================================================
// PREDICTION & RISK HANDLERS
// ============================================================================

/// POST /api/predict/ - on-demand churn prediction (stub)
async fn predict(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(input): Json<PredictionInput>,
) -> Response {
    if let Err(resp) = guard(&headers) {
        return resp;
    }
    if state.fail_predict.load(Ordering::SeqCst) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"detail": "model unavailable"})),
        )
            .into_response();
    }

    Json(PredictionResult {
        churn_probability: stub_score(&input),
        feature_importance: stub_importances(),
    })
    .into_response()
}

/// GET /api/risk/monitoring/:id/ - cached monitoring score
async fn monitoring_result(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<u32>,
) -> Response {
    if let Err(resp) = guard(&headers) {
        return resp;
    }

    match state.monitoring.lock().unwrap().get(&id) {
        Some(result) => Json(result.clone()).into_response(),
        None => not_found("monitoring result"),
    }
}

/// GET /api/risk/monitoring/batch/?customer_ids=... - batch scores
async fn batch_risk_scores(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    if let Err(resp) = guard(&headers) {
        return resp;
    }

    let ids: Vec<u32> = params
        .iter()
        .filter(|(key, _)| key == "customer_ids")
        .filter_map(|(_, value)| value.parse().ok())
        .collect();

    let monitoring = state.monitoring.lock().unwrap();
    let results: Vec<BatchRiskScore> = ids
        .iter()
        .filter_map(|id| {
            monitoring.get(id).map(|m| BatchRiskScore {
                customer_id: *id,
                probability: m.probability,
                risk_change: m.risk_change,
            })
        })
        .collect();

    Json(BatchRiskResponse { results }).into_response()
}

/// POST /api/risk/monitor/trigger/ - rescore every customer
async fn trigger_monitoring(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = guard(&headers) {
        return resp;
    }

    let customers = state.customers.lock().unwrap().clone();
    let mut monitoring = state.monitoring.lock().unwrap();
    let mut scored = 0;

    for customer in &customers {
        let Some(id) = customer.customer_id else {
            continue;
        };
        let score = stub_score(&customer.prediction_input());
        let previous = monitoring.get(&id).map(|m| m.probability);
        let risk_change = previous
            .map(|p| (score - p) * 100.0)
            .unwrap_or(0.0);
        monitoring.insert(id, MonitoringResult { probability: score, risk_change });
        scored += 1;
    }

    Json(MonitoringTrigger {
        status: "success".to_string(),
        message: format!("scored {} customers", scored),
    })
    .into_response()
}

/// GET /api/risk/dashboard/ - aggregate risk view from the monitoring cache
async fn risk_dashboard(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if let Err(resp) = guard(&headers) {
        return resp;
    }

    let config = state.alert_config.lock().unwrap().clone();
    let monitoring = state.monitoring.lock().unwrap();
    let customers = state.customers.lock().unwrap();
    let now = Utc::now();

    let name_of = |id: u32| {
        customers
            .iter()
            .find(|c| c.customer_id == Some(id))
            .map(|c| c.display_name())
            .unwrap_or_else(|| format!("Customer #{}", id))
    };

    let mut distribution = RiskDistribution::default();
    let mut high_risk = Vec::new();
    let mut increases = Vec::new();
    let mut total = 0.0;

    for (id, result) in monitoring.iter() {
        total += result.probability;
        match RiskLevel::for_score(result.probability) {
            RiskLevel::VeryHigh => distribution.very_high += 1,
            RiskLevel::High => distribution.high += 1,
            RiskLevel::Medium => distribution.medium += 1,
            RiskLevel::Low => distribution.low += 1,
            RiskLevel::VeryLow => distribution.very_low += 1,
        }
        if result.probability >= config.high_risk_threshold {
            high_risk.push(RiskCustomer {
                customer_id: *id,
                customer_name: name_of(*id),
                probability: result.probability,
                risk_change: result.risk_change,
                last_updated: now,
            });
        }
        if result.risk_change >= config.risk_increase_threshold {
            increases.push(RiskIncrease {
                customer_id: *id,
                customer_name: name_of(*id),
                probability: result.probability,
                risk_change: result.risk_change,
                previous_probability: (result.probability - result.risk_change / 100.0).max(0.0),
                changed_at: now,
            });
        }
    }
    high_risk.sort_by(|a, b| b.probability.partial_cmp(&a.probability).unwrap());
    increases.sort_by(|a, b| b.risk_change.partial_cmp(&a.risk_change).unwrap());

    let avg = if monitoring.is_empty() {
        0.0
    } else {
        total / monitoring.len() as f64
    };
    let risk_trend = (0..30)
        .rev()
        .map(|days_ago| RiskTrendPoint {
            date: (now - Duration::days(days_ago)).format("%Y-%m-%d").to_string(),
            avg_risk: avg,
            high_risk_count: high_risk.len() as u64,
        })
        .collect();

    Json(RiskDashboard {
        high_risk_customers: high_risk,
        significant_increases: increases,
        risk_distribution: distribution,
        risk_trend,
        thresholds: RiskThresholds {
            high_risk: config.high_risk_threshold,
            risk_increase: config.risk_increase_threshold,
        },
    })
    .into_response()
}

// ============================================================================
// USERS, MODEL & DASHBOARD HANDLERS
// ============================================================================

/// GET /api/users/ - paginated user list
async fn list_users(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if let Err(resp) = guard(&headers) {
        return resp;
    }

    let users = state.users.lock().unwrap().clone();
    Json(PaginatedResponse {
        count: users.len() as u64,
        next: None,
        previous: None,
        results: users,
    })
    .into_response()
}

/// POST /api/users/
async fn create_user(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(new_user): Json<NewUser>,
) -> Response {
    if let Err(resp) = guard(&headers) {
        return resp;
    }

    let mut users = state.users.lock().unwrap();
    let id = users.iter().map(|u| u.id).max().unwrap_or(0) + 1;
    let user = User {
        id,
        username: new_user.username,
        email: new_user.email,
        first_name: new_user.first_name,
        last_name: new_user.last_name,
        is_staff: new_user.is_staff,
    };
    users.push(user.clone());
    (StatusCode::CREATED, Json(user)).into_response()
}

/// POST /api/train/ - pretend to retrain, return fresh metrics
async fn train_model(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if let Err(resp) = guard(&headers) {
        return resp;
    }

    let mut metrics = state.metrics.lock().unwrap();
    let latest = canned_metrics(0.88);
    let is_new_best = metrics
        .best_metrics
        .as_ref()
        .map(|best| latest.test_accuracy > best.test_accuracy)
        .unwrap_or(true);
    if is_new_best {
        metrics.best_metrics = Some(latest.clone());
    }
    metrics.latest_metrics = Some(latest);

    Json(TrainOutcome {
        is_new_best,
        latest_metrics: metrics.latest_metrics.clone(),
        best_metrics: metrics.best_metrics.clone(),
    })
    .into_response()
}

/// GET /api/model-metrics/
async fn model_metrics(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if let Err(resp) = guard(&headers) {
        return resp;
    }
    Json(state.metrics.lock().unwrap().clone()).into_response()
}

/// GET /api/dashboard/stats/ - aggregates over the in-memory customers
async fn dashboard_stats(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if let Err(resp) = guard(&headers) {
        return resp;
    }

    let customers = state.customers.lock().unwrap();
    let total = customers.len() as u64;
    let churned = customers.iter().filter(|c| c.has_churned()).count() as u64;
    let active = total - churned;

    let avg = |f: fn(&Customer) -> f64| {
        if customers.is_empty() {
            0.0
        } else {
            customers.iter().map(f).sum::<f64>() / customers.len() as f64
        }
    };

    let mut by_geography: HashMap<String, (u64, u64)> = HashMap::new();
    let mut by_products: HashMap<i32, u64> = HashMap::new();
    for customer in customers.iter() {
        let entry = by_geography.entry(customer.geography.clone()).or_default();
        entry.0 += 1;
        if customer.has_churned() {
            entry.1 += 1;
        }
        *by_products.entry(customer.num_of_products).or_default() += 1;
    }

    let mut geography_distribution: Vec<GeographyCount> = by_geography
        .iter()
        .map(|(geography, (count, _))| GeographyCount {
            geography: geography.clone(),
            count: *count,
        })
        .collect();
    geography_distribution.sort_by(|a, b| a.geography.cmp(&b.geography));

    let mut churn_by_geography: Vec<GeographyChurn> = by_geography
        .iter()
        .map(|(geography, (count, churned))| GeographyChurn {
            geography: geography.clone(),
            churn_rate: if *count == 0 {
                0.0
            } else {
                *churned as f64 / *count as f64 * 100.0
            },
        })
        .collect();
    churn_by_geography.sort_by(|a, b| a.geography.cmp(&b.geography));

    let mut product_distribution: Vec<ProductCount> = by_products
        .into_iter()
        .map(|(num_of_products, count)| ProductCount {
            num_of_products,
            count,
        })
        .collect();
    product_distribution.sort_by_key(|p| p.num_of_products);

    Json(DashboardStats {
        total_customers: total,
        active_customers: active,
        churn_rate: if total == 0 {
            0.0
        } else {
            churned as f64 / total as f64 * 100.0
        },
        averages: Averages {
            credit_score: avg(|c| c.credit_score as f64),
            age: avg(|c| c.age as f64),
            balance: avg(|c| c.balance),
        },
        geography_distribution,
        churn_by_geography,
        product_distribution,
    })
    .into_response()
}

// ============================================================================
// ALERT HANDLERS
// ============================================================================

/// GET /api/alerts/config/
async fn alert_config(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if let Err(resp) = guard(&headers) {
        return resp;
    }
    Json(state.alert_config.lock().unwrap().clone()).into_response()
}

/// POST /api/alerts/config/
async fn set_alert_config(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(config): Json<AlertConfig>,
) -> Response {
    if let Err(resp) = guard(&headers) {
        return resp;
    }
    *state.alert_config.lock().unwrap() = config.clone();
    Json(config).into_response()
}

/// GET /api/alerts/history/ - filtered alert log
async fn alert_history(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if let Err(resp) = guard(&headers) {
        return resp;
    }

    let mut alerts = state.alerts.lock().unwrap().clone();
    if let Some(alert_type) = params.get("alert_type").filter(|t| !t.is_empty()) {
        alerts.retain(|a| serde_json::to_value(a.alert_type).unwrap() == json!(alert_type));
    }
    if let Some(customer_id) = params.get("customer_id").and_then(|c| c.parse::<u32>().ok()) {
        alerts.retain(|a| a.customer == customer_id);
    }
    if bool_param(&params, "success_only") == Some(true) {
        alerts.retain(|a| a.was_sent);
    }

    Json(alerts).into_response()
}

/// GET /api/alerts/stats/
async fn alert_stats(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if let Err(resp) = guard(&headers) {
        return resp;
    }

    let alerts = state.alerts.lock().unwrap();
    let total = alerts.len() as u64;
    let sent = alerts.iter().filter(|a| a.was_sent).count() as u64;

    let mut types = AlertTypeCounts::default();
    for alert in alerts.iter() {
        match alert.alert_type {
            AlertType::HighRisk => types.high_risk += 1,
            AlertType::RiskIncrease => types.risk_increase += 1,
            AlertType::Summary => types.summary += 1,
        }
    }

    let mut daily: HashMap<String, (u64, u64)> = HashMap::new();
    for alert in alerts.iter() {
        let day = alert.sent_at.format("%Y-%m-%d").to_string();
        let entry = daily.entry(day).or_default();
        entry.0 += 1;
        if alert.was_sent {
            entry.1 += 1;
        }
    }
    let mut daily_alerts: Vec<DailyAlertCount> = daily
        .into_iter()
        .map(|(date, (count, success_count))| DailyAlertCount {
            date,
            count,
            success_count,
        })
        .collect();
    daily_alerts.sort_by(|a, b| a.date.cmp(&b.date));

    Json(AlertStats {
        total_alerts: total,
        success_rate: if total == 0 {
            0.0
        } else {
            sent as f64 / total as f64 * 100.0
        },
        alert_types: types,
        daily_alerts,
    })
    .into_response()
}

// ============================================================================
// PARAM HELPERS
// ============================================================================

fn int_param(params: &HashMap<String, String>, key: &str) -> Option<i32> {
    params.get(key).and_then(|v| v.parse().ok())
}

fn float_param(params: &HashMap<String, String>, key: &str) -> Option<f64> {
    params.get(key).and_then(|v| v.parse().ok())
}

fn bool_param(params: &HashMap<String, String>, key: &str) -> Option<bool> {
    params.get(key).and_then(|v| v.parse().ok())
}

fn sort_customers(rows: &mut [Customer], ordering: &str) {
    let (key, descending) = match ordering.strip_prefix('-') {
        Some(key) => (key, true),
        None => (ordering, false),
    };

    match key {
        "customer_id" => rows.sort_by_key(|c| c.customer_id),
        "age" => rows.sort_by_key(|c| c.age),
        "credit_score" => rows.sort_by_key(|c| c.credit_score),
        "tenure" => rows.sort_by_key(|c| c.tenure),
        "balance" => rows.sort_by(|a, b| a.balance.partial_cmp(&b.balance).unwrap()),
        "estimated_salary" => {
            rows.sort_by(|a, b| a.estimated_salary.partial_cmp(&b.estimated_salary).unwrap())
        }
        "surname" => rows.sort_by(|a, b| a.surname.cmp(&b.surname)),
        _ => {}
    }
    if descending {
        rows.reverse();
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn auth_header() -> String {
        let token = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", MOCK_USERNAME, MOCK_PASSWORD));
        format!("Basic {}", token)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_rejects_missing_and_bad_credentials() {
        let app = router(Arc::new(MockState::seeded()));

        let response = app
            .clone()
            .oneshot(
                Request::get("/api/customers/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let bad = base64::engine::general_purpose::STANDARD.encode("admin:wrong");
        let response = app
            .oneshot(
                Request::get("/api/customers/")
                    .header(header::AUTHORIZATION, format!("Basic {}", bad))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_pagination_envelope_and_links() {
        let app = router(Arc::new(MockState::seeded()));

        let response = app
            .oneshot(
                Request::get("/api/customers/?page=2&page_size=10")
                    .header(header::AUTHORIZATION, auth_header())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["count"], 24);
        assert!(json["next"].is_string());
        assert!(json["previous"].is_string());
        assert_eq!(json["results"].as_array().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_ordering_descending() {
        let app = router(Arc::new(MockState::seeded()));

        let response = app
            .oneshot(
                Request::get("/api/customers/?ordering=-credit_score&page_size=50")
                    .header(header::AUTHORIZATION, auth_header())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(response).await;
        let scores: Vec<i64> = json["results"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["credit_score"].as_i64().unwrap())
            .collect();
        let mut sorted = scores.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(scores, sorted);
    }

    #[tokio::test]
    async fn test_search_filters_by_surname() {
        let app = router(Arc::new(MockState::seeded()));

        let response = app
            .oneshot(
                Request::get("/api/customers/?search=more&page_size=50")
                    .header(header::AUTHORIZATION, auth_header())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(response).await;
        let results = json["results"].as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["surname"], "Moreau");
    }

    #[test]
    fn test_stub_score_is_deterministic_and_bounded() {
        let input = PredictionInput {
            credit_score: 400,
            age: 60,
            tenure: 1,
            balance: 0.0,
            num_of_products: 4,
            has_cr_card: false,
            is_active_member: false,
            estimated_salary: 30000.0,
            geography: "Germany".to_string(),
            gender: "Male".to_string(),
        };
        let a = stub_score(&input);
        let b = stub_score(&input);
        assert_eq!(a, b);
        assert!((0.0..=1.0).contains(&a));
        // inactive, many products, zero balance, old, bad credit: high risk
        assert!(a > 0.6);
    }

    #[test]
    fn test_classify_bulk_three_kinds() {
        assert_eq!(classify_bulk(&[1, 2], &[], "updated").status, BulkStatus::Success);
        assert_eq!(
            classify_bulk(&[1], &[2], "updated").status,
            BulkStatus::PartialSuccess
        );
        assert_eq!(classify_bulk(&[], &[2], "updated").status, BulkStatus::Error);
    }
}
