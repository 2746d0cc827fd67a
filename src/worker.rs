//! The console's single state owner.
//!
//! One tokio task owns the [`ConsoleState`] and the [`ApiClient`]. The UI
//! thread sends [`Command`]s over an mpsc channel and observes state
//! snapshots over a watch channel; every request runs in a spawned task that
//! reports back as an [`Outcome`]. The UI never blocks on I/O, and no state
//! is touched from more than one place.

use crate::api::{ApiClient, ApiError};
use crate::enrich;
use crate::grid::{BulkDisposition, GridState, Notice};
use crate::import;
use crate::models::*;
use crate::query::{AlertHistoryFilters, CustomerFilters};
use log::{info, warn};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::{mpsc, watch};

/// Everything the UI can ask the worker to do.
#[derive(Debug, Clone)]
pub enum Command {
    // Session
    Login(Credentials),
    Logout,

    // Customer grid
    Reload,
    SetFilters(CustomerFilters),
    SetPage(u32),
    ToggleSelect(u32),
    SelectAll,
    ClearSelection,
    BulkSetActive(bool),
    BulkDelete,
    CreateCustomer(Customer),
    UpdateCustomer(Customer),
    DeleteCustomer(u32),
    PredictRow(Customer),
    CalculateRisk(u32),
    Import { path: PathBuf, update_existing: bool },

    // Other views
    RefreshDashboard,
    RefreshRisk,
    RefreshAdmin,
    RefreshAlerts,
    TriggerMonitoring,
    TrainModel,
    CreateUser(NewUser),
    SaveAlertConfig(AlertConfig),
    PredictAdhoc(PredictionInput),
}

/// Results of spawned requests, fed back into the state owner.
enum Outcome {
    LoginProbe(Result<Vec<User>, ApiError>),
    PageLoaded { seq: u64, page: PaginatedResponse<Customer> },
    PageFailed { seq: u64, error: ApiError },
    Enriched { seq: u64, annotations: HashMap<u32, RiskAnnotation> },
    RowAnnotated { customer_id: u32, annotation: Option<RiskAnnotation> },
    BulkDone(Result<BulkOutcome, ApiError>),
    MutationDone { action: &'static str, result: Result<(), ApiError> },
    RowPredicted { name: String, result: Result<PredictionResult, ApiError> },
    AdhocPredicted(Result<PredictionResult, ApiError>),
    ImportDone(Result<ImportReport, String>),
    DashboardLoaded(Result<DashboardStats, ApiError>),
    RiskLoaded(Result<RiskDashboard, ApiError>),
    UsersLoaded(Result<Vec<User>, ApiError>),
    MetricsLoaded(Result<ModelMetrics, ApiError>),
    AlertConfigLoaded(Result<AlertConfig, ApiError>),
    AlertHistoryLoaded(Result<Vec<AlertRecord>, ApiError>),
    AlertStatsLoaded(Result<AlertStats, ApiError>),
    Trained(Result<TrainOutcome, ApiError>),
    MonitoringTriggered(Result<MonitoringTrigger, ApiError>),
    UserCreated(Result<User, ApiError>),
    AlertConfigSaved(Result<AlertConfig, ApiError>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    LoggedOut,
    Probing,
    LoggedIn { username: String },
}

/// Snapshot of everything the UI renders.
#[derive(Debug, Clone)]
pub struct ConsoleState {
    pub auth: AuthState,
    pub grid: GridState,
    pub dashboard: Option<DashboardStats>,
    pub risk: Option<RiskDashboard>,
    pub users: Vec<User>,
    pub metrics: ModelMetrics,
    pub alert_config: Option<AlertConfig>,
    pub alert_history: Vec<AlertRecord>,
    pub alert_stats: Option<AlertStats>,
    pub prediction: Option<PredictionResult>,
    /// Per-action busy flags; only disable the matching buttons.
    pub training: bool,
    pub importing: bool,
    pub monitoring_running: bool,
    /// Notice for everything outside the grid.
    pub notice: Option<Notice>,
    /// Bumped on every successful editor-backed mutation; the UI closes the
    /// open form when it observes a change. Failures leave it untouched so
    /// the form keeps its state for a retry.
    pub mutation_epoch: u64,
}

impl ConsoleState {
    pub fn new() -> Self {
        ConsoleState {
            auth: AuthState::LoggedOut,
            grid: GridState::new(),
            dashboard: None,
            risk: None,
            users: Vec::new(),
            metrics: ModelMetrics::default(),
            alert_config: None,
            alert_history: Vec::new(),
            alert_stats: None,
            prediction: None,
            training: false,
            importing: false,
            monitoring_running: false,
            notice: None,
            mutation_epoch: 0,
        }
    }
}

impl Default for ConsoleState {
    fn default() -> Self {
        Self::new()
    }
}

/// Run the state owner until the command channel closes or every state
/// receiver is gone.
pub async fn run(
    api: ApiClient,
    initial_filters: CustomerFilters,
    mut commands: mpsc::Receiver<Command>,
    updates: watch::Sender<ConsoleState>,
) {
    let (outcome_tx, mut outcomes) = mpsc::channel::<Outcome>(64);
    let mut worker = Worker {
        api,
        state: ConsoleState::new(),
        tx: outcome_tx,
    };
    worker.state.grid.set_filters(initial_filters);

    // Credentials supplied via the environment skip the login form but still
    // get probed like an interactive login.
    if worker.api.session().is_authenticated() {
        worker.state.auth = AuthState::Probing;
        worker.spawn_login_probe();
    }

    let _ = updates.send(worker.state.clone());

    loop {
        tokio::select! {
            maybe_command = commands.recv() => match maybe_command {
                Some(command) => worker.handle_command(command),
                None => break,
            },
            Some(outcome) = outcomes.recv() => worker.apply_outcome(outcome),
        }
        if updates.send(worker.state.clone()).is_err() {
            break;
        }
    }
}

struct Worker {
    api: ApiClient,
    state: ConsoleState,
    tx: mpsc::Sender<Outcome>,
}

impl Worker {
    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Login(credentials) => {
                self.api.login(credentials);
                self.state.auth = AuthState::Probing;
                self.state.notice = None;
                self.spawn_login_probe();
            }
            Command::Logout => {
                self.api.logout();
                self.state = ConsoleState::new();
                info!("session cleared");
            }

            Command::Reload => self.spawn_reload(),
            Command::SetFilters(filters) => {
                self.state.grid.set_filters(filters);
                self.spawn_reload();
            }
            Command::SetPage(page) => {
                self.state.grid.set_page(page);
                self.spawn_reload();
            }
            Command::ToggleSelect(id) => self.state.grid.toggle_select(id),
            Command::SelectAll => self.state.grid.select_all_loaded(),
            Command::ClearSelection => self.state.grid.clear_selection(),

            Command::BulkSetActive(active) => {
                let ids = self.state.grid.selected_ids();
                if ids.is_empty() {
                    self.state.grid.notice = Some(Notice::info("No rows selected"));
                    return;
                }
                let patches: Vec<CustomerPatch> = ids
                    .into_iter()
                    .map(|id| CustomerPatch::set_active(id, active))
                    .collect();
                let api = self.api.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result = api.bulk_update_customers(&patches).await;
                    let _ = tx.send(Outcome::BulkDone(result)).await;
                });
            }
            Command::BulkDelete => {
                let ids = self.state.grid.selected_ids();
                if ids.is_empty() {
                    self.state.grid.notice = Some(Notice::info("No rows selected"));
                    return;
                }
                let api = self.api.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result = api.bulk_delete_customers(&ids).await;
                    let _ = tx.send(Outcome::BulkDone(result)).await;
                });
            }

            Command::CreateCustomer(customer) => {
                let api = self.api.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result = api.create_customer(&customer).await.map(|_| ());
                    let _ = tx.send(Outcome::MutationDone { action: "created", result }).await;
                });
            }
            Command::UpdateCustomer(customer) => {
                let Some(id) = customer.customer_id else {
                    self.state.grid.notice =
                        Some(Notice::error("Cannot update an unsaved customer"));
                    return;
                };
                let api = self.api.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result = api.update_customer(id, &customer).await.map(|_| ());
                    let _ = tx.send(Outcome::MutationDone { action: "updated", result }).await;
                });
            }
            Command::DeleteCustomer(id) => {
                let api = self.api.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result = api.delete_customer(id).await;
                    let _ = tx.send(Outcome::MutationDone { action: "deleted", result }).await;
                });
            }

            Command::PredictRow(customer) => {
                let api = self.api.clone();
                let tx = self.tx.clone();
                let name = customer.display_name();
                tokio::spawn(async move {
                    let result = api.predict(&customer.prediction_input()).await;
                    let _ = tx.send(Outcome::RowPredicted { name, result }).await;
                });
            }
            Command::CalculateRisk(id) => {
                let Some(customer) = self
                    .state
                    .grid
                    .rows
                    .iter()
                    .find(|c| c.customer_id == Some(id))
                    .cloned()
                else {
                    return;
                };
                let api = self.api.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let annotation = enrich::annotate_row(&api, &customer).await;
                    let _ = tx
                        .send(Outcome::RowAnnotated { customer_id: id, annotation })
                        .await;
                });
            }

            Command::Import { path, update_existing } => {
                self.state.importing = true;
                let api = self.api.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result = import::run(&api, &path, update_existing).await;
                    let _ = tx.send(Outcome::ImportDone(result.map_err(|e| e.to_string()))).await;
                });
            }

            Command::RefreshDashboard => {
                let api = self.api.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result = api.dashboard_stats().await;
                    let _ = tx.send(Outcome::DashboardLoaded(result)).await;
                });
            }
            Command::RefreshRisk => self.spawn_risk_refresh(),
            Command::RefreshAdmin => {
                let api = self.api.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let users = api.list_users().await;
                    let _ = tx.send(Outcome::UsersLoaded(users)).await;
                    let metrics = api.model_metrics().await;
                    let _ = tx.send(Outcome::MetricsLoaded(metrics)).await;
                });
            }
            Command::RefreshAlerts => {
                let api = self.api.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let config = api.alert_config().await;
                    let _ = tx.send(Outcome::AlertConfigLoaded(config)).await;
                    let history = api.alert_history(&AlertHistoryFilters::default()).await;
                    let _ = tx.send(Outcome::AlertHistoryLoaded(history)).await;
                    let stats = api.alert_stats().await;
                    let _ = tx.send(Outcome::AlertStatsLoaded(stats)).await;
                });
            }

            Command::TriggerMonitoring => {
                self.state.monitoring_running = true;
                let api = self.api.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result = api.trigger_monitoring().await;
                    let _ = tx.send(Outcome::MonitoringTriggered(result)).await;
                });
            }
            Command::TrainModel => {
                self.state.training = true;
                let api = self.api.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result = api.train_model().await;
                    let _ = tx.send(Outcome::Trained(result)).await;
                });
            }
            Command::CreateUser(user) => {
                let api = self.api.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result = api.create_user(&user).await;
                    let _ = tx.send(Outcome::UserCreated(result)).await;
                });
            }
            Command::SaveAlertConfig(config) => {
                let api = self.api.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result = api.set_alert_config(&config).await;
                    let _ = tx.send(Outcome::AlertConfigSaved(result)).await;
                });
            }
            Command::PredictAdhoc(input) => {
                let api = self.api.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result = api.predict(&input).await;
                    let _ = tx.send(Outcome::AdhocPredicted(result)).await;
                });
            }
        }
    }

    // ------------------------------------------------------------------
    // Outcomes
    // ------------------------------------------------------------------

    fn apply_outcome(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::LoginProbe(Ok(users)) => {
                let username = self
                    .api
                    .session()
                    .username()
                    .unwrap_or_default()
                    .to_string();
                info!("signed in as {}", username);
                self.state.auth = AuthState::LoggedIn { username };
                self.state.users = users;
                // initial loads for the landing views
                self.spawn_reload();
                self.handle_command(Command::RefreshDashboard);
            }
            Outcome::LoginProbe(Err(ApiError::Unauthorized)) => {
                self.api.logout();
                self.state.auth = AuthState::LoggedOut;
                self.state.notice = Some(Notice::error("Invalid credentials"));
            }
            Outcome::LoginProbe(Err(e)) => {
                self.api.logout();
                self.state.auth = AuthState::LoggedOut;
                self.state.notice = Some(Notice::error(format!("Login failed: {}", e)));
            }

            Outcome::PageLoaded { seq, page } => {
                if self.state.grid.apply_page(seq, page) {
                    // fan the enrichment out only for the still-current page
                    let api = self.api.clone();
                    let tx = self.tx.clone();
                    let rows = self.state.grid.rows.clone();
                    tokio::spawn(async move {
                        let annotations = enrich::annotate_page(&api, &rows).await;
                        let _ = tx.send(Outcome::Enriched { seq, annotations }).await;
                    });
                }
            }
            Outcome::PageFailed { seq, error } => {
                if self.redirect_on_unauthorized(&error) {
                    return;
                }
                warn!("page load failed: {}", error);
                self.state
                    .grid
                    .apply_load_error(seq, format!("Failed to load customers: {}", error));
            }
            Outcome::Enriched { seq, annotations } => {
                self.state.grid.apply_enrichment(seq, annotations);
            }
            Outcome::RowAnnotated { customer_id, annotation } => match annotation {
                Some(annotation) => self.state.grid.apply_row_annotation(customer_id, annotation),
                None => {
                    self.state.grid.notice = Some(Notice::warning(format!(
                        "No risk data available for customer #{}",
                        customer_id
                    )));
                }
            },

            Outcome::BulkDone(result) => {
                if let Err(e) = &result {
                    if self.redirect_on_unauthorized(e) {
                        return;
                    }
                }
                if self.state.grid.classify_bulk(result) == BulkDisposition::Reload {
                    self.spawn_reload();
                }
            }

            Outcome::MutationDone { action, result } => match result {
                Ok(()) => {
                    self.state.grid.notice =
                        Some(Notice::success(format!("Customer {}", action)));
                    self.state.mutation_epoch += 1;
                    self.spawn_reload();
                }
                Err(e) => {
                    if self.redirect_on_unauthorized(&e) {
                        return;
                    }
                    // editor state stays intact for a retry
                    self.state.grid.notice =
                        Some(Notice::error(format!("Customer not {}: {}", action, e)));
                }
            },

            Outcome::RowPredicted { name, result } => match result {
                Ok(prediction) => {
                    let score = prediction.churn_probability;
                    self.state.grid.notice = Some(Notice::info(format!(
                        "Churn risk for {}: {:.1}% ({})",
                        name,
                        score * 100.0,
                        RiskLevel::for_score(score).as_str()
                    )));
                }
                Err(e) => {
                    if self.redirect_on_unauthorized(&e) {
                        return;
                    }
                    self.state.grid.notice =
                        Some(Notice::error(format!("Prediction failed: {}", e)));
                }
            },
            Outcome::AdhocPredicted(result) => match result {
                Ok(prediction) => {
                    self.state.prediction = Some(prediction);
                    self.state.notice = None;
                }
                Err(e) => {
                    if self.redirect_on_unauthorized(&e) {
                        return;
                    }
                    self.state.notice = Some(Notice::error(format!("Prediction failed: {}", e)));
                }
            },

            Outcome::ImportDone(result) => {
                self.state.importing = false;
                match result {
                    Ok(report) => {
                        self.state.grid.notice = Some(Notice::success(format!(
                            "Imported: {} created, {} updated, {} skipped",
                            report.created, report.updated, report.skipped
                        )));
                        self.state.mutation_epoch += 1;
                        self.spawn_reload();
                    }
                    Err(message) => {
                        self.state.grid.notice =
                            Some(Notice::error(format!("Import failed: {}", message)));
                    }
                }
            }

            Outcome::DashboardLoaded(result) => match result {
                Ok(stats) => self.state.dashboard = Some(stats),
                Err(e) => self.report(e, "Failed to load dashboard statistics"),
            },
            Outcome::RiskLoaded(result) => match result {
                Ok(dashboard) => self.state.risk = Some(dashboard),
                Err(e) => self.report(e, "Failed to load risk dashboard"),
            },
            Outcome::UsersLoaded(result) => match result {
                Ok(users) => self.state.users = users,
                Err(e) => self.report(e, "Failed to load users"),
            },
            Outcome::MetricsLoaded(result) => match result {
                Ok(metrics) => self.state.metrics = metrics,
                Err(e) => self.report(e, "Failed to load model metrics"),
            },
            Outcome::AlertConfigLoaded(result) => match result {
                Ok(config) => self.state.alert_config = Some(config),
                Err(e) => self.report(e, "Failed to load alert config"),
            },
            Outcome::AlertHistoryLoaded(result) => match result {
                Ok(history) => self.state.alert_history = history,
                Err(e) => self.report(e, "Failed to load alert history"),
            },
            Outcome::AlertStatsLoaded(result) => match result {
                Ok(stats) => self.state.alert_stats = Some(stats),
                Err(e) => self.report(e, "Failed to load alert statistics"),
            },

            Outcome::Trained(result) => {
                self.state.training = false;
                match result {
                    Ok(outcome) => {
                        self.state.notice = Some(Notice::success(if outcome.is_new_best {
                            "New best model trained and saved".to_string()
                        } else {
                            "Model training completed".to_string()
                        }));
                        self.state.metrics = ModelMetrics {
                            latest_metrics: outcome.latest_metrics,
                            best_metrics: outcome.best_metrics,
                        };
                    }
                    Err(e) => self.report(e, "Model training failed"),
                }
            }
            Outcome::MonitoringTriggered(result) => {
                self.state.monitoring_running = false;
                match result {
                    Ok(trigger) if trigger.succeeded() => {
                        self.state.notice = Some(Notice::success(trigger.message));
                        self.spawn_risk_refresh();
                    }
                    Ok(trigger) => {
                        self.state.notice =
                            Some(Notice::error(format!("Monitoring failed: {}", trigger.message)));
                    }
                    Err(e) => self.report(e, "Failed to trigger monitoring"),
                }
            }
            Outcome::UserCreated(result) => match result {
                Ok(user) => {
                    self.state.notice =
                        Some(Notice::success(format!("User {} created", user.username)));
                    self.state.users.push(user);
                    self.state.mutation_epoch += 1;
                }
                Err(e) => self.report(e, "Failed to create user"),
            },
            Outcome::AlertConfigSaved(result) => match result {
                Ok(config) => {
                    self.state.alert_config = Some(config);
                    self.state.notice = Some(Notice::success("Alert configuration saved"));
                    self.state.mutation_epoch += 1;
                }
                Err(e) => self.report(e, "Failed to save alert config"),
            },
        }
    }

    // ------------------------------------------------------------------
    // Spawner helpers
    // ------------------------------------------------------------------

    fn spawn_login_probe(&self) {
        let api = self.api.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = api.list_users().await;
            let _ = tx.send(Outcome::LoginProbe(result)).await;
        });
    }

    fn spawn_reload(&mut self) {
        let seq = self.state.grid.begin_reload();
        let filters = self.state.grid.filters.clone();
        let api = self.api.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            match api.list_customers(&filters).await {
                Ok(page) => {
                    let _ = tx.send(Outcome::PageLoaded { seq, page }).await;
                }
                Err(error) => {
                    let _ = tx.send(Outcome::PageFailed { seq, error }).await;
                }
            }
        });
    }

    fn spawn_risk_refresh(&self) {
        let api = self.api.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = api.risk_dashboard().await;
            let _ = tx.send(Outcome::RiskLoaded(result)).await;
        });
    }

    /// Auth failures anywhere in the protected area drop back to login
    /// instead of surfacing an inline error.
    fn redirect_on_unauthorized(&mut self, error: &ApiError) -> bool {
        if matches!(error, ApiError::Unauthorized) {
            self.api.logout();
            self.state = ConsoleState::new();
            self.state.notice = Some(Notice::error("Session expired, sign in again"));
            return true;
        }
        false
    }

    fn report(&mut self, error: ApiError, context: &str) {
        if self.redirect_on_unauthorized(&error) {
            return;
        }
        warn!("{}: {}", context, error);
        self.state.notice = Some(Notice::error(format!("{}: {}", context, error)));
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Session;
    use crate::grid::GridPhase;
    use crate::mockd::{self, MockState};
    use std::sync::Arc;
    use std::time::Duration;

    struct Console {
        commands: mpsc::Sender<Command>,
        updates: watch::Receiver<ConsoleState>,
        state: Arc<MockState>,
    }

    async fn start_console(session: Session) -> Console {
        let state = Arc::new(MockState::seeded());
        let app = mockd::router(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let api = ApiClient::new(format!("http://{}", addr), session).unwrap();
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (watch_tx, watch_rx) = watch::channel(ConsoleState::new());
        tokio::spawn(run(api, CustomerFilters::default(), cmd_rx, watch_tx));

        Console {
            commands: cmd_tx,
            updates: watch_rx,
            state,
        }
    }

    fn admin_session() -> Session {
        Session::with_credentials(Credentials {
            username: mockd::MOCK_USERNAME.to_string(),
            password: mockd::MOCK_PASSWORD.to_string(),
        })
    }

    async fn wait_for(
        console: &mut Console,
        what: &str,
        pred: impl Fn(&ConsoleState) -> bool,
    ) -> ConsoleState {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                {
                    let snapshot = console.updates.borrow();
                    if pred(&snapshot) {
                        return snapshot.clone();
                    }
                }
                console.updates.changed().await.expect("worker alive");
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {}", what))
    }

    #[tokio::test]
    async fn test_env_credentials_log_in_and_load_the_grid() {
        let mut console = start_console(admin_session()).await;

        let state = wait_for(&mut console, "grid loaded", |s| {
            s.grid.phase == GridPhase::Loaded
        })
        .await;

        assert!(matches!(state.auth, AuthState::LoggedIn { .. }));
        assert_eq!(state.grid.rows.len(), 10);
        assert_eq!(state.grid.pagination.total_items, 24);
        assert_eq!(state.grid.pagination.total_pages(), 3);
        // no cached monitoring scores: every row was annotated via prediction
        assert_eq!(state.grid.risk.len(), 10);
    }

    #[tokio::test]
    async fn test_bad_credentials_stay_logged_out() {
        let session = Session::with_credentials(Credentials {
            username: "admin".to_string(),
            password: "wrong".to_string(),
        });
        let mut console = start_console(session).await;

        let state = wait_for(&mut console, "login rejection", |s| {
            s.auth == AuthState::LoggedOut && s.notice.is_some()
        })
        .await;
        assert!(state.notice.unwrap().text.contains("Invalid credentials"));
    }

    #[tokio::test]
    async fn test_interactive_login_after_logout() {
        let mut console = start_console(Session::anonymous()).await;

        console
            .commands
            .send(Command::Login(Credentials {
                username: mockd::MOCK_USERNAME.to_string(),
                password: mockd::MOCK_PASSWORD.to_string(),
            }))
            .await
            .unwrap();

        wait_for(&mut console, "login", |s| {
            matches!(s.auth, AuthState::LoggedIn { .. })
        })
        .await;

        console.commands.send(Command::Logout).await.unwrap();
        wait_for(&mut console, "logout", |s| s.auth == AuthState::LoggedOut).await;
    }

    #[tokio::test]
    async fn test_filter_change_reloads_server_side() {
        let mut console = start_console(admin_session()).await;
        wait_for(&mut console, "initial load", |s| {
            s.grid.phase == GridPhase::Loaded
        })
        .await;

        console
            .commands
            .send(Command::SetFilters(CustomerFilters {
                geography: Some("France".to_string()),
                page_size: Some(50),
                ..Default::default()
            }))
            .await
            .unwrap();

        let state = wait_for(&mut console, "filtered load", |s| {
            s.grid.phase == GridPhase::Loaded
                && s.grid.rows.iter().all(|c| c.geography == "France")
                && !s.grid.rows.is_empty()
        })
        .await;
        assert_eq!(state.grid.filters.page, Some(1));
    }

    #[tokio::test]
    async fn test_page_change_reloads() {
        let mut console = start_console(admin_session()).await;
        wait_for(&mut console, "initial load", |s| {
            s.grid.phase == GridPhase::Loaded
        })
        .await;

        console.commands.send(Command::SetPage(3)).await.unwrap();
        let state = wait_for(&mut console, "page 3", |s| {
            s.grid.phase == GridPhase::Loaded && s.grid.pagination.page == 3
        })
        .await;
        // 24 customers, 10 per page: last page has 4 rows
        assert_eq!(state.grid.rows.len(), 4);
    }

    #[tokio::test]
    async fn test_bulk_delete_clears_selection_and_reloads() {
        let mut console = start_console(admin_session()).await;
        wait_for(&mut console, "initial load", |s| {
            s.grid.phase == GridPhase::Loaded
        })
        .await;
        let before = console.state.customer_count();

        console.commands.send(Command::SelectAll).await.unwrap();
        wait_for(&mut console, "selection", |s| s.grid.selection.len() == 10).await;

        console.commands.send(Command::BulkDelete).await.unwrap();
        let state = wait_for(&mut console, "bulk delete + reload", |s| {
            s.grid.phase == GridPhase::Loaded && s.grid.pagination.total_items == (before - 10) as u64
        })
        .await;

        assert!(state.grid.selection.is_empty());
        assert_eq!(console.state.customer_count(), before - 10);
    }

    #[tokio::test]
    async fn test_create_customer_bumps_epoch_and_reloads() {
        let mut console = start_console(admin_session()).await;
        let initial = wait_for(&mut console, "initial load", |s| {
            s.grid.phase == GridPhase::Loaded
        })
        .await;

        let customer = Customer {
            customer_id: None,
            credit_score: 640,
            age: 29,
            tenure: 2,
            balance: 500.0,
            num_of_products: 1,
            has_cr_card: false,
            is_active_member: true,
            estimated_salary: 41000.0,
            geography: "Germany".to_string(),
            gender: "Female".to_string(),
            exited: Some(false),
            surname: Some("Zeller".to_string()),
        };
        console
            .commands
            .send(Command::CreateCustomer(customer))
            .await
            .unwrap();

        let state = wait_for(&mut console, "create + reload", |s| {
            s.mutation_epoch > initial.mutation_epoch && s.grid.phase == GridPhase::Loaded
        })
        .await;
        assert_eq!(state.grid.pagination.total_items, 25);
    }

    #[tokio::test]
    async fn test_calculate_risk_annotates_single_row() {
        let mut console = start_console(admin_session()).await;
        let state = wait_for(&mut console, "initial load", |s| {
            s.grid.phase == GridPhase::Loaded
        })
        .await;
        let id = state.grid.rows[0].customer_id.unwrap();

        console.state.set_monitoring(
            id,
            MonitoringResult {
                probability: 0.77,
                risk_change: 5.0,
            },
        );
        console
            .commands
            .send(Command::CalculateRisk(id))
            .await
            .unwrap();

        let state = wait_for(&mut console, "row annotation", |s| {
            s.grid
                .risk
                .get(&id)
                .map(|a| (a.score - 0.77).abs() < 1e-9)
                .unwrap_or(false)
        })
        .await;
        assert!((state.grid.risk[&id].delta - 5.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_monitoring_trigger_refreshes_risk_dashboard() {
        let mut console = start_console(admin_session()).await;
        wait_for(&mut console, "login", |s| {
            matches!(s.auth, AuthState::LoggedIn { .. })
        })
        .await;

        console
            .commands
            .send(Command::TriggerMonitoring)
            .await
            .unwrap();
        let state = wait_for(&mut console, "risk dashboard", |s| {
            !s.monitoring_running && s.risk.is_some()
        })
        .await;

        let risk = state.risk.unwrap();
        let buckets = &risk.risk_distribution;
        let scored =
            buckets.very_high + buckets.high + buckets.medium + buckets.low + buckets.very_low;
        assert_eq!(scored, console.state.customer_count() as u64);
    }

    #[tokio::test]
    async fn test_train_model_updates_metrics() {
        let mut console = start_console(admin_session()).await;
        wait_for(&mut console, "login", |s| {
            matches!(s.auth, AuthState::LoggedIn { .. })
        })
        .await;

        console.commands.send(Command::TrainModel).await.unwrap();
        let state = wait_for(&mut console, "training done", |s| {
            !s.training && s.metrics.latest_metrics.is_some() && s.notice.is_some()
        })
        .await;
        let latest = state.metrics.latest_metrics.unwrap();
        assert!(latest.test_accuracy > 0.8);
    }
}
