// Churn Console - Core Library
// Exposes all modules for use in the console binary, the mock server and tests

pub mod api;
pub mod enrich;
pub mod grid;
pub mod import;
pub mod models;
pub mod query;
pub mod worker;

// Only compile the terminal UI when the TUI feature is enabled
#[cfg(feature = "tui")]
pub mod ui;

// In-memory backend, shared by the mock-server binary and the tests
#[cfg(any(test, feature = "mock-server"))]
pub mod mockd;

// Re-export commonly used types
pub use api::{ApiClient, ApiError, ApiResult, Session};
pub use grid::{BulkDisposition, GridPhase, GridState, Notice, NoticeKind, Pagination};
pub use import::{preflight, ImportError, Preflight};
pub use models::{
    AlertConfig, AlertRecord, AlertStats, AlertType, BulkOutcome, BulkStatus, Credentials,
    Customer, CustomerPatch, DashboardStats, ImportReport, ImportStatus, ModelMetrics,
    MonitoringResult, NewUser, PaginatedResponse, PredictionInput, PredictionResult,
    RiskAnnotation, RiskDashboard, RiskLevel, TrainingMetrics, User,
};
pub use query::{AlertHistoryFilters, CustomerFilters};
pub use worker::{AuthState, Command, ConsoleState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
