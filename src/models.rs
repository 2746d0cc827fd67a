use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// CUSTOMERS
// ============================================================================

/// A customer record as the backend stores it.
///
/// `customer_id` is assigned server-side: present if and only if the record
/// has been persisted. Everything else round-trips verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<u32>,

    pub credit_score: i32,
    pub age: i32,
    pub tenure: i32,
    pub balance: f64,
    pub num_of_products: i32,
    pub has_cr_card: bool,
    pub is_active_member: bool,
    pub estimated_salary: f64,
    pub geography: String,
    pub gender: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exited: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surname: Option<String>,
}

impl Customer {
    /// True once the backend has assigned an id.
    pub fn is_persisted(&self) -> bool {
        self.customer_id.is_some()
    }

    pub fn has_churned(&self) -> bool {
        self.exited.unwrap_or(false)
    }

    /// Display label for tables and notices.
    pub fn display_name(&self) -> String {
        match (&self.surname, self.customer_id) {
            (Some(surname), _) if !surname.is_empty() => surname.clone(),
            (_, Some(id)) => format!("Customer #{}", id),
            _ => "(unsaved)".to_string(),
        }
    }

    /// The feature subset the prediction endpoint accepts.
    pub fn prediction_input(&self) -> PredictionInput {
        PredictionInput {
            credit_score: self.credit_score,
            age: self.age,
            tenure: self.tenure,
            balance: self.balance,
            num_of_products: self.num_of_products,
            has_cr_card: self.has_cr_card,
            is_active_member: self.is_active_member,
            estimated_salary: self.estimated_salary,
            geography: self.geography.clone(),
            gender: self.gender.clone(),
        }
    }
}

/// Feature vector for `/api/predict/` - no id, no churn label, no surname.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionInput {
    pub credit_score: i32,
    pub age: i32,
    pub tenure: i32,
    pub balance: f64,
    pub num_of_products: i32,
    pub has_cr_card: bool,
    pub is_active_member: bool,
    pub estimated_salary: f64,
    pub geography: String,
    pub gender: String,
}

/// Partial customer for bulk updates. Only the fields the console
/// bulk-edits; `None` fields are left untouched server-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerPatch {
    pub customer_id: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active_member: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exited: Option<bool>,
}

impl CustomerPatch {
    pub fn set_active(customer_id: u32, active: bool) -> Self {
        CustomerPatch {
            customer_id,
            is_active_member: Some(active),
            exited: None,
        }
    }
}

// ============================================================================
// PAGINATION & BULK RESPONSES
// ============================================================================

/// Django-style paginated envelope: `{count, next, previous, results}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub count: u64,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    pub results: Vec<T>,
}

/// Classification of a bulk operation. Exactly three kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkStatus {
    Success,
    PartialSuccess,
    Error,
}

/// Response body of the bulk update/delete endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkOutcome {
    pub status: BulkStatus,
    pub message: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

// ============================================================================
// PREDICTION & RISK
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    pub churn_probability: f64,
    #[serde(default)]
    pub feature_importance: Vec<FeatureImportance>,
}

/// A previously computed, cached risk score for one customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringResult {
    pub probability: f64,
    #[serde(default)]
    pub risk_change: f64,
}

/// One entry of the batch risk-score endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRiskScore {
    pub customer_id: u32,
    pub probability: f64,
    #[serde(default)]
    pub risk_change: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRiskResponse {
    pub results: Vec<BatchRiskScore>,
}

/// Transient per-row risk state the grid attaches after a page load.
/// Never sent back to the server; discarded on every reload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskAnnotation {
    /// Churn probability in [0, 1].
    pub score: f64,
    /// Change versus the previous monitoring run, in percentage points.
    pub delta: f64,
}

impl RiskAnnotation {
    /// An on-demand prediction has no history, so no delta.
    pub fn from_prediction(result: &PredictionResult) -> Self {
        RiskAnnotation {
            score: result.churn_probability,
            delta: 0.0,
        }
    }

    pub fn level(&self) -> RiskLevel {
        RiskLevel::for_score(self.score)
    }
}

impl From<MonitoringResult> for RiskAnnotation {
    fn from(m: MonitoringResult) -> Self {
        RiskAnnotation {
            score: m.probability,
            delta: m.risk_change,
        }
    }
}

/// Risk buckets used across the risk dashboard and the grid's risk column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskLevel {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl RiskLevel {
    pub fn for_score(score: f64) -> Self {
        if score >= 0.8 {
            RiskLevel::VeryHigh
        } else if score >= 0.6 {
            RiskLevel::High
        } else if score >= 0.4 {
            RiskLevel::Medium
        } else if score >= 0.2 {
            RiskLevel::Low
        } else {
            RiskLevel::VeryLow
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::VeryHigh => "Very High",
            RiskLevel::High => "High",
            RiskLevel::Medium => "Medium",
            RiskLevel::Low => "Low",
            RiskLevel::VeryLow => "Very Low",
        }
    }
}

// ============================================================================
// CSV IMPORT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportDetails {
    #[serde(default)]
    pub created_ids: Vec<u32>,
    #[serde(default)]
    pub updated_ids: Vec<u32>,
    #[serde(default)]
    pub skipped_ids: Vec<u32>,
}

/// Response of the multipart CSV import endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportReport {
    pub status: ImportStatus,
    #[serde(default)]
    pub created: u32,
    #[serde(default)]
    pub updated: u32,
    #[serde(default)]
    pub skipped: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<ImportDetails>,
}

// ============================================================================
// USERS & AUTH
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: u32,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub is_staff: bool,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Payload for creating a console user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub is_staff: bool,
}

// ============================================================================
// MODEL TRAINING & METRICS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingDetails {
    pub total_samples: u64,
    pub training_time: f64,
    #[serde(default)]
    pub cross_val_scores: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub train_accuracy: f64,
    pub test_accuracy: f64,
    pub precision_class1: f64,
    pub recall_class1: f64,
    pub f1_class1: f64,
    #[serde(default)]
    pub feature_importance: Vec<FeatureImportance>,
    pub training_details: TrainingDetails,
    #[serde(default)]
    pub best_params: HashMap<String, serde_json::Value>,
}

impl TrainingMetrics {
    pub fn avg_cross_val_score(&self) -> f64 {
        let scores = &self.training_details.cross_val_scores;
        if scores.is_empty() {
            return 0.0;
        }
        scores.iter().sum::<f64>() / scores.len() as f64
    }
}

/// Latest + best model slots, as served by `/api/model-metrics/`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelMetrics {
    #[serde(default)]
    pub latest_metrics: Option<TrainingMetrics>,
    #[serde(default)]
    pub best_metrics: Option<TrainingMetrics>,
}

/// Response of `/api/train/`: fresh metrics plus whether they beat the
/// previously saved best model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainOutcome {
    #[serde(default)]
    pub is_new_best: bool,
    #[serde(default)]
    pub latest_metrics: Option<TrainingMetrics>,
    #[serde(default)]
    pub best_metrics: Option<TrainingMetrics>,
}

// ============================================================================
// DASHBOARD
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Averages {
    pub credit_score: f64,
    pub age: f64,
    pub balance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeographyCount {
    pub geography: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeographyChurn {
    pub geography: String,
    /// Percentage, 0-100.
    pub churn_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductCount {
    pub num_of_products: i32,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_customers: u64,
    pub active_customers: u64,
    /// Percentage, 0-100.
    pub churn_rate: f64,
    pub averages: Averages,
    #[serde(default)]
    pub geography_distribution: Vec<GeographyCount>,
    #[serde(default)]
    pub churn_by_geography: Vec<GeographyChurn>,
    #[serde(default)]
    pub product_distribution: Vec<ProductCount>,
}

// ============================================================================
// RISK DASHBOARD & MONITORING
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskCustomer {
    pub customer_id: u32,
    pub customer_name: String,
    pub probability: f64,
    #[serde(default)]
    pub risk_change: f64,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskIncrease {
    pub customer_id: u32,
    pub customer_name: String,
    pub probability: f64,
    pub risk_change: f64,
    pub previous_probability: f64,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskDistribution {
    pub very_high: u64,
    pub high: u64,
    pub medium: u64,
    pub low: u64,
    pub very_low: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskTrendPoint {
    pub date: String,
    pub avg_risk: f64,
    pub high_risk_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskThresholds {
    pub high_risk: f64,
    pub risk_increase: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskDashboard {
    #[serde(default)]
    pub high_risk_customers: Vec<RiskCustomer>,
    #[serde(default)]
    pub significant_increases: Vec<RiskIncrease>,
    pub risk_distribution: RiskDistribution,
    #[serde(default)]
    pub risk_trend: Vec<RiskTrendPoint>,
    pub thresholds: RiskThresholds,
}

/// Response of the manual monitoring trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringTrigger {
    pub status: String,
    #[serde(default)]
    pub message: String,
}

impl MonitoringTrigger {
    pub fn succeeded(&self) -> bool {
        self.status == "success"
    }
}

// ============================================================================
// ALERTS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    pub webhook_url: String,
    pub is_enabled: bool,
    /// Probability threshold in [0, 1].
    pub high_risk_threshold: f64,
    /// Increase threshold in percentage points, 0-100.
    pub risk_increase_threshold: f64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        AlertConfig {
            webhook_url: String::new(),
            is_enabled: false,
            high_risk_threshold: 0.7,
            risk_increase_threshold: 20.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertType {
    #[serde(rename = "HIGH_RISK")]
    HighRisk,
    #[serde(rename = "RISK_INCREASE")]
    RiskIncrease,
    #[serde(rename = "SUMMARY")]
    Summary,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::HighRisk => "High Risk",
            AlertType::RiskIncrease => "Risk Increase",
            AlertType::Summary => "Summary",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: u64,
    pub customer: u32,
    #[serde(default)]
    pub customer_name: String,
    pub alert_type: AlertType,
    #[serde(default)]
    pub message: serde_json::Value,
    pub sent_at: DateTime<Utc>,
    pub was_sent: bool,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertTypeCounts {
    #[serde(rename = "HIGH_RISK", default)]
    pub high_risk: u64,
    #[serde(rename = "RISK_INCREASE", default)]
    pub risk_increase: u64,
    #[serde(rename = "SUMMARY", default)]
    pub summary: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyAlertCount {
    pub date: String,
    pub count: u64,
    pub success_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertStats {
    pub total_alerts: u64,
    /// Percentage, 0-100.
    pub success_rate: f64,
    #[serde(default)]
    pub alert_types: AlertTypeCounts,
    #[serde(default)]
    pub daily_alerts: Vec<DailyAlertCount>,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_customer() -> Customer {
        Customer {
            customer_id: Some(42),
            credit_score: 650,
            age: 41,
            tenure: 3,
            balance: 12345.67,
            num_of_products: 2,
            has_cr_card: true,
            is_active_member: false,
            estimated_salary: 85000.0,
            geography: "France".to_string(),
            gender: "Female".to_string(),
            exited: Some(false),
            surname: Some("Moreau".to_string()),
        }
    }

    #[test]
    fn test_customer_persisted_iff_id_present() {
        let mut customer = sample_customer();
        assert!(customer.is_persisted());

        customer.customer_id = None;
        assert!(!customer.is_persisted());
    }

    #[test]
    fn test_customer_serialization_omits_unset_id() {
        let mut customer = sample_customer();
        customer.customer_id = None;
        customer.exited = None;
        customer.surname = None;

        let json = serde_json::to_value(&customer).unwrap();
        let obj = json.as_object().unwrap();
        assert!(!obj.contains_key("customer_id"));
        assert!(!obj.contains_key("exited"));
        assert!(!obj.contains_key("surname"));
        assert_eq!(obj["geography"], "France");
    }

    #[test]
    fn test_prediction_input_strips_label_and_identity() {
        let customer = sample_customer();
        let input = customer.prediction_input();

        let json = serde_json::to_value(&input).unwrap();
        let obj = json.as_object().unwrap();
        assert!(!obj.contains_key("customer_id"));
        assert!(!obj.contains_key("exited"));
        assert!(!obj.contains_key("surname"));
        assert_eq!(obj["credit_score"], 650);
        assert_eq!(obj["gender"], "Female");
    }

    #[test]
    fn test_display_name_prefers_surname() {
        let mut customer = sample_customer();
        assert_eq!(customer.display_name(), "Moreau");

        customer.surname = None;
        assert_eq!(customer.display_name(), "Customer #42");

        customer.customer_id = None;
        assert_eq!(customer.display_name(), "(unsaved)");
    }

    #[test]
    fn test_bulk_status_wire_format() {
        let body = r#"{"status":"partial_success","message":"2 of 3 updated","data":null}"#;
        let outcome: BulkOutcome = serde_json::from_str(body).unwrap();
        assert_eq!(outcome.status, BulkStatus::PartialSuccess);

        let body = r#"{"status":"error","message":"rejected","data":[]}"#;
        let outcome: BulkOutcome = serde_json::from_str(body).unwrap();
        assert_eq!(outcome.status, BulkStatus::Error);
    }

    #[test]
    fn test_customer_patch_omits_untouched_fields() {
        let patch = CustomerPatch::set_active(7, true);
        let json = serde_json::to_value(&patch).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj["customer_id"], 7);
        assert_eq!(obj["is_active_member"], true);
        assert!(!obj.contains_key("exited"));
    }

    #[test]
    fn test_risk_annotation_from_prediction_has_zero_delta() {
        let result = PredictionResult {
            churn_probability: 0.42,
            feature_importance: vec![],
        };
        let annotation = RiskAnnotation::from_prediction(&result);
        assert_eq!(annotation.score, 0.42);
        assert_eq!(annotation.delta, 0.0);
    }

    #[test]
    fn test_risk_level_buckets() {
        assert_eq!(RiskLevel::for_score(0.05), RiskLevel::VeryLow);
        assert_eq!(RiskLevel::for_score(0.2), RiskLevel::Low);
        assert_eq!(RiskLevel::for_score(0.45), RiskLevel::Medium);
        assert_eq!(RiskLevel::for_score(0.6), RiskLevel::High);
        assert_eq!(RiskLevel::for_score(0.95), RiskLevel::VeryHigh);
    }

    #[test]
    fn test_alert_type_wire_names() {
        let record = r#"{
            "id": 1,
            "customer": 42,
            "customer_name": "Moreau",
            "alert_type": "RISK_INCREASE",
            "message": {"text": "risk up"},
            "sent_at": "2024-05-01T12:00:00Z",
            "was_sent": true,
            "error_message": null
        }"#;
        let alert: AlertRecord = serde_json::from_str(record).unwrap();
        assert_eq!(alert.alert_type, AlertType::RiskIncrease);
        assert!(alert.was_sent);
    }

    #[test]
    fn test_avg_cross_val_score() {
        let metrics = TrainingMetrics {
            train_accuracy: 0.9,
            test_accuracy: 0.85,
            precision_class1: 0.7,
            recall_class1: 0.6,
            f1_class1: 0.65,
            feature_importance: vec![],
            training_details: TrainingDetails {
                total_samples: 1000,
                training_time: 2.5,
                cross_val_scores: vec![0.8, 0.9],
            },
            best_params: HashMap::new(),
        };
        assert!((metrics.avg_cross_val_score() - 0.85).abs() < 1e-9);
    }
}
