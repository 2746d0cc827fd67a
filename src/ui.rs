//! Terminal console UI.
//!
//! The draw loop is synchronous: it polls crossterm events, sends
//! [`Command`]s to the worker and renders the latest [`ConsoleState`]
//! snapshot from the watch channel. Forms are modal popups; a form submits a
//! command and closes when the worker reports the mutation landed, so a
//! failed save keeps the user's input for a retry.

use crate::grid::{GridPhase, Notice, NoticeKind};
use crate::models::*;
use crate::query::{CustomerFilters, ALL};
use crate::worker::{AuthState, Command, ConsoleState};
use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap},
    Frame, Terminal,
};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

const TICK: Duration = Duration::from_millis(150);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Dashboard,
    Customers,
    Risk,
    Predict,
    Admin,
    Alerts,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::Dashboard => Page::Customers,
            Page::Customers => Page::Risk,
            Page::Risk => Page::Predict,
            Page::Predict => Page::Admin,
            Page::Admin => Page::Alerts,
            Page::Alerts => Page::Dashboard,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::Dashboard => Page::Alerts,
            Page::Customers => Page::Dashboard,
            Page::Risk => Page::Customers,
            Page::Predict => Page::Risk,
            Page::Admin => Page::Predict,
            Page::Alerts => Page::Admin,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Dashboard => "Dashboard",
            Page::Customers => "Customers",
            Page::Risk => "Risk",
            Page::Predict => "Predict",
            Page::Admin => "Admin",
            Page::Alerts => "Alerts",
        }
    }
}

// ============================================================================
// FORMS
// ============================================================================

#[derive(Debug, Clone)]
pub struct FormField {
    pub label: &'static str,
    pub value: String,
}

/// A modal form: a list of text fields with one active at a time.
#[derive(Debug, Clone)]
pub struct Form {
    pub title: String,
    pub fields: Vec<FormField>,
    pub active: usize,
    pub error: Option<String>,
}

impl Form {
    fn new(title: impl Into<String>, fields: Vec<(&'static str, String)>) -> Self {
        Form {
            title: title.into(),
            fields: fields
                .into_iter()
                .map(|(label, value)| FormField { label, value })
                .collect(),
            active: 0,
            error: None,
        }
    }

    fn next_field(&mut self) {
        self.active = (self.active + 1) % self.fields.len();
    }

    fn previous_field(&mut self) {
        self.active = if self.active == 0 {
            self.fields.len() - 1
        } else {
            self.active - 1
        };
    }

    fn input(&mut self, c: char) {
        self.fields[self.active].value.push(c);
    }

    fn backspace(&mut self) {
        self.fields[self.active].value.pop();
    }

    fn value(&self, label: &str) -> &str {
        self.fields
            .iter()
            .find(|f| f.label == label)
            .map(|f| f.value.as_str())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone)]
enum Mode {
    Normal,
    Login(Form),
    Filter(Form),
    Editor { form: Form, editing: Option<u32> },
    PredictForm(Form),
    UserEditor(Form),
    AlertEditor(Form),
    ImportForm(Form),
    ConfirmDelete(u32),
}

fn login_form() -> Form {
    Form::new(
        "Sign In",
        vec![("username", String::new()), ("password", String::new())],
    )
}

fn filter_form(filters: &CustomerFilters) -> Form {
    let text = |v: &Option<String>| v.clone().unwrap_or_default();
    let num = |v: Option<u32>| v.map(|n| n.to_string()).unwrap_or_default();
    let float = |v: Option<f64>| v.map(|n| n.to_string()).unwrap_or_default();
    let tri = |v: Option<bool>| match v {
        Some(true) => "yes".to_string(),
        Some(false) => "no".to_string(),
        None => String::new(),
    };
    Form::new(
        "Filters",
        vec![
            ("search", text(&filters.search)),
            ("geography", text(&filters.geography)),
            ("gender", text(&filters.gender)),
            ("min age", num(filters.min_age)),
            ("max age", num(filters.max_age)),
            ("min credit score", num(filters.min_credit_score)),
            ("max credit score", num(filters.max_credit_score)),
            ("min balance", float(filters.min_balance)),
            ("max balance", float(filters.max_balance)),
            ("churned (yes/no)", tri(filters.exited)),
            ("has card (yes/no)", tri(filters.has_cr_card)),
            ("active (yes/no)", tri(filters.is_active_member)),
            ("ordering", text(&filters.ordering)),
            ("page size", num(filters.page_size)),
        ],
    )
}

fn customer_form(customer: Option<&Customer>) -> Form {
    let title = if customer.is_some() {
        "Edit Customer"
    } else {
        "Add Customer"
    };
    let c = customer;
    let get = |f: fn(&Customer) -> String, default: &str| {
        c.map(f).unwrap_or_else(|| default.to_string())
    };
    Form::new(
        title,
        vec![
            ("surname", get(|c| c.surname.clone().unwrap_or_default(), "")),
            ("credit score", get(|c| c.credit_score.to_string(), "600")),
            ("age", get(|c| c.age.to_string(), "35")),
            ("tenure", get(|c| c.tenure.to_string(), "0")),
            ("balance", get(|c| c.balance.to_string(), "0")),
            ("products", get(|c| c.num_of_products.to_string(), "1")),
            ("has card (yes/no)", get(|c| yn(c.has_cr_card), "yes")),
            ("active (yes/no)", get(|c| yn(c.is_active_member), "yes")),
            ("salary", get(|c| c.estimated_salary.to_string(), "50000")),
            ("geography", get(|c| c.geography.clone(), "France")),
            ("gender", get(|c| c.gender.clone(), "Female")),
            ("churned (yes/no)", get(|c| yn(c.has_churned()), "no")),
        ],
    )
}

fn predict_form() -> Form {
    Form::new(
        "Predict Churn",
        vec![
            ("credit score", "600".to_string()),
            ("age", "40".to_string()),
            ("tenure", "3".to_string()),
            ("balance", "0".to_string()),
            ("products", "1".to_string()),
            ("has card (yes/no)", "yes".to_string()),
            ("active (yes/no)", "yes".to_string()),
            ("salary", "50000".to_string()),
            ("geography", "France".to_string()),
            ("gender", "Female".to_string()),
        ],
    )
}

fn user_form() -> Form {
    Form::new(
        "Create User",
        vec![
            ("username", String::new()),
            ("email", String::new()),
            ("password", String::new()),
            ("first name", String::new()),
            ("last name", String::new()),
            ("admin (yes/no)", "no".to_string()),
        ],
    )
}

fn alert_form(config: Option<&AlertConfig>) -> Form {
    let config = config.cloned().unwrap_or_default();
    Form::new(
        "Alert Configuration",
        vec![
            ("webhook url", config.webhook_url),
            ("enabled (yes/no)", yn(config.is_enabled)),
            ("high risk threshold", config.high_risk_threshold.to_string()),
            (
                "risk increase threshold",
                config.risk_increase_threshold.to_string(),
            ),
        ],
    )
}

fn import_form() -> Form {
    Form::new(
        "Import Customers CSV",
        vec![
            ("file path", String::new()),
            ("update existing (yes/no)", "no".to_string()),
        ],
    )
}

fn yn(value: bool) -> String {
    if value { "yes" } else { "no" }.to_string()
}

// ------------------------------------------------------------------
// Form parsing
// ------------------------------------------------------------------

fn req_i32(form: &Form, label: &str) -> Result<i32, String> {
    form.value(label)
        .trim()
        .parse()
        .map_err(|_| format!("{}: expected a whole number", label))
}

fn req_f64(form: &Form, label: &str) -> Result<f64, String> {
    form.value(label)
        .trim()
        .parse()
        .map_err(|_| format!("{}: expected a number", label))
}

fn req_bool(form: &Form, label: &str) -> Result<bool, String> {
    match form.value(label).trim().to_lowercase().as_str() {
        "yes" | "y" | "true" => Ok(true),
        "no" | "n" | "false" => Ok(false),
        _ => Err(format!("{}: expected yes or no", label)),
    }
}

fn opt_text(form: &Form, label: &str) -> Option<String> {
    let value = form.value(label).trim();
    if value.is_empty() || value == ALL {
        None
    } else {
        Some(value.to_string())
    }
}

fn opt_u32(form: &Form, label: &str) -> Result<Option<u32>, String> {
    let value = form.value(label).trim();
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse()
        .map(Some)
        .map_err(|_| format!("{}: expected a whole number", label))
}

fn opt_f64(form: &Form, label: &str) -> Result<Option<f64>, String> {
    let value = form.value(label).trim();
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse()
        .map(Some)
        .map_err(|_| format!("{}: expected a number", label))
}

fn opt_bool(form: &Form, label: &str) -> Result<Option<bool>, String> {
    match form.value(label).trim().to_lowercase().as_str() {
        "" | "all" => Ok(None),
        "yes" | "y" | "true" => Ok(Some(true)),
        "no" | "n" | "false" => Ok(Some(false)),
        _ => Err(format!("{}: expected yes, no or blank", label)),
    }
}

fn parse_customer(form: &Form, editing: Option<u32>) -> Result<Customer, String> {
    Ok(Customer {
        customer_id: editing,
        credit_score: req_i32(form, "credit score")?,
        age: req_i32(form, "age")?,
        tenure: req_i32(form, "tenure")?,
        balance: req_f64(form, "balance")?,
        num_of_products: req_i32(form, "products")?,
        has_cr_card: req_bool(form, "has card (yes/no)")?,
        is_active_member: req_bool(form, "active (yes/no)")?,
        estimated_salary: req_f64(form, "salary")?,
        geography: form.value("geography").trim().to_string(),
        gender: form.value("gender").trim().to_string(),
        exited: Some(req_bool(form, "churned (yes/no)")?),
        surname: opt_text(form, "surname"),
    })
}

fn parse_filters(form: &Form) -> Result<CustomerFilters, String> {
    Ok(CustomerFilters {
        search: opt_text(form, "search"),
        geography: opt_text(form, "geography"),
        gender: opt_text(form, "gender"),
        min_age: opt_u32(form, "min age")?,
        max_age: opt_u32(form, "max age")?,
        min_credit_score: opt_u32(form, "min credit score")?,
        max_credit_score: opt_u32(form, "max credit score")?,
        min_balance: opt_f64(form, "min balance")?,
        max_balance: opt_f64(form, "max balance")?,
        exited: opt_bool(form, "churned (yes/no)")?,
        has_cr_card: opt_bool(form, "has card (yes/no)")?,
        is_active_member: opt_bool(form, "active (yes/no)")?,
        ordering: opt_text(form, "ordering"),
        page: None,
        page_size: opt_u32(form, "page size")?,
    })
}

fn parse_predict(form: &Form) -> Result<PredictionInput, String> {
    Ok(PredictionInput {
        credit_score: req_i32(form, "credit score")?,
        age: req_i32(form, "age")?,
        tenure: req_i32(form, "tenure")?,
        balance: req_f64(form, "balance")?,
        num_of_products: req_i32(form, "products")?,
        has_cr_card: req_bool(form, "has card (yes/no)")?,
        is_active_member: req_bool(form, "active (yes/no)")?,
        estimated_salary: req_f64(form, "salary")?,
        geography: form.value("geography").trim().to_string(),
        gender: form.value("gender").trim().to_string(),
    })
}

fn parse_user(form: &Form) -> Result<NewUser, String> {
    let username = form.value("username").trim().to_string();
    if username.is_empty() {
        return Err("username is required".to_string());
    }
    let password = form.value("password").to_string();
    if password.is_empty() {
        return Err("password is required".to_string());
    }
    Ok(NewUser {
        username,
        email: form.value("email").trim().to_string(),
        password,
        first_name: form.value("first name").trim().to_string(),
        last_name: form.value("last name").trim().to_string(),
        is_staff: req_bool(form, "admin (yes/no)")?,
    })
}

fn parse_alert_config(form: &Form) -> Result<AlertConfig, String> {
    let high_risk_threshold = req_f64(form, "high risk threshold")?;
    if !(0.0..=1.0).contains(&high_risk_threshold) {
        return Err("high risk threshold: must be between 0 and 1".to_string());
    }
    let risk_increase_threshold = req_f64(form, "risk increase threshold")?;
    if !(0.0..=100.0).contains(&risk_increase_threshold) {
        return Err("risk increase threshold: must be between 0 and 100".to_string());
    }
    Ok(AlertConfig {
        webhook_url: form.value("webhook url").trim().to_string(),
        is_enabled: req_bool(form, "enabled (yes/no)")?,
        high_risk_threshold,
        risk_increase_threshold,
    })
}

fn parse_import(form: &Form) -> Result<(PathBuf, bool), String> {
    let path = form.value("file path").trim();
    if path.is_empty() {
        return Err("file path is required".to_string());
    }
    Ok((PathBuf::from(path), req_bool(form, "update existing (yes/no)")?))
}

// ============================================================================
// APP
// ============================================================================

pub struct App {
    commands: mpsc::Sender<Command>,
    updates: watch::Receiver<ConsoleState>,
    snapshot: ConsoleState,
    page: Page,
    mode: Mode,
    table: TableState,
    last_epoch: u64,
    should_quit: bool,
}

impl App {
    pub fn new(commands: mpsc::Sender<Command>, updates: watch::Receiver<ConsoleState>) -> Self {
        let snapshot = updates.borrow().clone();
        let mut table = TableState::default();
        table.select(Some(0));
        App {
            commands,
            updates,
            snapshot,
            page: Page::Customers,
            mode: Mode::Normal,
            table,
            last_epoch: 0,
            should_quit: false,
        }
    }

    fn send(&self, command: Command) {
        // worker gone means we are shutting down anyway
        let _ = self.commands.blocking_send(command);
    }

    /// Pull the newest snapshot and react to worker-driven transitions.
    fn refresh_snapshot(&mut self) {
        if !self.updates.has_changed().unwrap_or(false) {
            return;
        }
        self.snapshot = self.updates.borrow_and_update().clone();

        // a landed mutation closes the open editor
        if self.snapshot.mutation_epoch != self.last_epoch {
            self.last_epoch = self.snapshot.mutation_epoch;
            if matches!(
                self.mode,
                Mode::Editor { .. }
                    | Mode::UserEditor(_)
                    | Mode::AlertEditor(_)
                    | Mode::ImportForm(_)
            ) {
                self.mode = Mode::Normal;
            }
        }

        match &self.snapshot.auth {
            AuthState::LoggedOut => {
                if !matches!(self.mode, Mode::Login(_)) {
                    self.mode = Mode::Login(login_form());
                }
            }
            AuthState::LoggedIn { .. } => {
                if matches!(self.mode, Mode::Login(_)) {
                    self.mode = Mode::Normal;
                }
            }
            AuthState::Probing => {}
        }

        // keep the cursor inside the loaded rows
        let len = self.snapshot.grid.rows.len();
        match self.table.selected() {
            Some(i) if len > 0 && i >= len => self.table.select(Some(len - 1)),
            Some(_) if len == 0 => self.table.select(None),
            None if len > 0 => self.table.select(Some(0)),
            _ => {}
        }
    }

    fn cursor_customer(&self) -> Option<&Customer> {
        self.table
            .selected()
            .and_then(|i| self.snapshot.grid.rows.get(i))
    }

    fn cursor_id(&self) -> Option<u32> {
        self.cursor_customer().and_then(|c| c.customer_id)
    }

    fn goto(&mut self, page: Page) {
        self.page = page;
        match page {
            Page::Dashboard => self.send(Command::RefreshDashboard),
            Page::Risk => self.send(Command::RefreshRisk),
            Page::Admin => self.send(Command::RefreshAdmin),
            Page::Alerts => self.send(Command::RefreshAlerts),
            Page::Customers | Page::Predict => {}
        }
    }

    fn cursor_down(&mut self) {
        let len = self.snapshot.grid.rows.len();
        if len == 0 {
            return;
        }
        let i = match self.table.selected() {
            Some(i) if i >= len - 1 => 0,
            Some(i) => i + 1,
            None => 0,
        };
        self.table.select(Some(i));
    }

    fn cursor_up(&mut self) {
        let len = self.snapshot.grid.rows.len();
        if len == 0 {
            return;
        }
        let i = match self.table.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.table.select(Some(i));
    }
}

// ============================================================================
// EVENT LOOP
// ============================================================================

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    loop {
        app.refresh_snapshot();
        terminal.draw(|f| draw(f, app))?;

        if !event::poll(TICK)? {
            continue;
        }
        if let Event::Key(key) = event::read()? {
            handle_key(app, key.code, key.modifiers);
        }
        if app.should_quit {
            return Ok(());
        }
    }
}

/// What a key press in a modal mode asks the app to do once the mode borrow
/// is released.
enum AfterKey {
    Stay,
    Quit,
    Close,
    Send(Command),
    SendAndClose(Command),
}

/// Shared field navigation/editing. Returns true when the key was consumed.
fn form_nav(form: &mut Form, code: KeyCode) -> bool {
    match code {
        KeyCode::Tab | KeyCode::Down => form.next_field(),
        KeyCode::BackTab | KeyCode::Up => form.previous_field(),
        KeyCode::Backspace => form.backspace(),
        KeyCode::Char(c) => form.input(c),
        _ => return false,
    }
    true
}

/// Key handling for the modal modes. Returns None in normal mode.
fn modal_key(mode: &mut Mode, code: KeyCode) -> Option<AfterKey> {
    match mode {
        Mode::Normal => None,
        Mode::Login(form) => Some(match code {
            KeyCode::Esc => AfterKey::Quit,
            KeyCode::Enter => {
                let credentials = Credentials {
                    username: form.value("username").trim().to_string(),
                    password: form.value("password").to_string(),
                };
                if credentials.username.is_empty() {
                    form.error = Some("username is required".to_string());
                    AfterKey::Stay
                } else {
                    // stay on the login screen until the probe resolves
                    AfterKey::Send(Command::Login(credentials))
                }
            }
            _ => {
                form_nav(form, code);
                AfterKey::Stay
            }
        }),
        Mode::Filter(form) => Some(match code {
            KeyCode::Esc => AfterKey::Close,
            KeyCode::Enter => match parse_filters(form) {
                Ok(filters) => AfterKey::SendAndClose(Command::SetFilters(filters)),
                Err(e) => {
                    form.error = Some(e);
                    AfterKey::Stay
                }
            },
            _ => {
                form_nav(form, code);
                AfterKey::Stay
            }
        }),
        Mode::Editor { form, editing } => Some(match code {
            KeyCode::Esc => AfterKey::Close,
            KeyCode::Enter => match parse_customer(form, *editing) {
                // form stays open until the worker confirms the save
                Ok(customer) if editing.is_some() => {
                    AfterKey::Send(Command::UpdateCustomer(customer))
                }
                Ok(customer) => AfterKey::Send(Command::CreateCustomer(customer)),
                Err(e) => {
                    form.error = Some(e);
                    AfterKey::Stay
                }
            },
            _ => {
                form_nav(form, code);
                AfterKey::Stay
            }
        }),
        Mode::PredictForm(form) => Some(match code {
            KeyCode::Esc => AfterKey::Close,
            KeyCode::Enter => match parse_predict(form) {
                Ok(input) => AfterKey::SendAndClose(Command::PredictAdhoc(input)),
                Err(e) => {
                    form.error = Some(e);
                    AfterKey::Stay
                }
            },
            _ => {
                form_nav(form, code);
                AfterKey::Stay
            }
        }),
        Mode::UserEditor(form) => Some(match code {
            KeyCode::Esc => AfterKey::Close,
            KeyCode::Enter => match parse_user(form) {
                Ok(user) => AfterKey::Send(Command::CreateUser(user)),
                Err(e) => {
                    form.error = Some(e);
                    AfterKey::Stay
                }
            },
            _ => {
                form_nav(form, code);
                AfterKey::Stay
            }
        }),
        Mode::AlertEditor(form) => Some(match code {
            KeyCode::Esc => AfterKey::Close,
            KeyCode::Enter => match parse_alert_config(form) {
                Ok(config) => AfterKey::Send(Command::SaveAlertConfig(config)),
                Err(e) => {
                    form.error = Some(e);
                    AfterKey::Stay
                }
            },
            _ => {
                form_nav(form, code);
                AfterKey::Stay
            }
        }),
        Mode::ImportForm(form) => Some(match code {
            KeyCode::Esc => AfterKey::Close,
            KeyCode::Enter => match parse_import(form) {
                Ok((path, update_existing)) => {
                    AfterKey::Send(Command::Import { path, update_existing })
                }
                Err(e) => {
                    form.error = Some(e);
                    AfterKey::Stay
                }
            },
            _ => {
                form_nav(form, code);
                AfterKey::Stay
            }
        }),
        Mode::ConfirmDelete(id) => Some(match code {
            KeyCode::Char('y') | KeyCode::Char('Y') => {
                AfterKey::SendAndClose(Command::DeleteCustomer(*id))
            }
            KeyCode::Esc | KeyCode::Char('n') | KeyCode::Char('N') => AfterKey::Close,
            _ => AfterKey::Stay,
        }),
    }
}

fn handle_key(app: &mut App, code: KeyCode, modifiers: KeyModifiers) {
    // modal modes swallow every key
    if let Some(after) = modal_key(&mut app.mode, code) {
        match after {
            AfterKey::Stay => {}
            AfterKey::Quit => app.should_quit = true,
            AfterKey::Close => app.mode = Mode::Normal,
            AfterKey::Send(command) => app.send(command),
            AfterKey::SendAndClose(command) => {
                app.send(command);
                app.mode = Mode::Normal;
            }
        }
        return;
    }

    // normal mode, global keys first
    match code {
        KeyCode::Char('q') => {
            app.should_quit = true;
            return;
        }
        KeyCode::Tab => {
            let page = if modifiers.contains(KeyModifiers::SHIFT) {
                app.page.previous()
            } else {
                app.page.next()
            };
            app.goto(page);
            return;
        }
        KeyCode::BackTab => {
            app.goto(app.page.previous());
            return;
        }
        KeyCode::Char('L') => {
            app.send(Command::Logout);
            return;
        }
        _ => {}
    }

    match app.page {
        Page::Customers => handle_customers_key(app, code),
        Page::Dashboard => {
            if code == KeyCode::Char('r') {
                app.send(Command::RefreshDashboard);
            }
        }
        Page::Risk => match code {
            KeyCode::Char('r') => app.send(Command::RefreshRisk),
            KeyCode::Char('m') => app.send(Command::TriggerMonitoring),
            _ => {}
        },
        Page::Predict => {
            if code == KeyCode::Enter || code == KeyCode::Char('e') {
                app.mode = Mode::PredictForm(predict_form());
            }
        }
        Page::Admin => match code {
            KeyCode::Char('r') => app.send(Command::RefreshAdmin),
            KeyCode::Char('t') => {
                if !app.snapshot.training {
                    app.send(Command::TrainModel);
                }
            }
            KeyCode::Char('c') => app.mode = Mode::UserEditor(user_form()),
            _ => {}
        },
        Page::Alerts => match code {
            KeyCode::Char('r') => app.send(Command::RefreshAlerts),
            KeyCode::Char('c') => {
                app.mode = Mode::AlertEditor(alert_form(app.snapshot.alert_config.as_ref()));
            }
            _ => {}
        },
    }
}

fn handle_customers_key(app: &mut App, code: KeyCode) {
    match code {
        KeyCode::Down | KeyCode::Char('j') => app.cursor_down(),
        KeyCode::Up | KeyCode::Char('k') => app.cursor_up(),
        KeyCode::Char('n') | KeyCode::Right => {
            let page = app.snapshot.grid.pagination.page;
            if page < app.snapshot.grid.pagination.total_pages() {
                app.send(Command::SetPage(page + 1));
            }
        }
        KeyCode::Char('p') | KeyCode::Left => {
            let page = app.snapshot.grid.pagination.page;
            if page > 1 {
                app.send(Command::SetPage(page - 1));
            }
        }
        KeyCode::Char(' ') => {
            if let Some(id) = app.cursor_id() {
                app.send(Command::ToggleSelect(id));
            }
        }
        KeyCode::Char('a') => app.send(Command::SelectAll),
        KeyCode::Char('A') => app.send(Command::ClearSelection),
        KeyCode::Char('r') => app.send(Command::Reload),
        KeyCode::Char('f') => {
            app.mode = Mode::Filter(filter_form(&app.snapshot.grid.filters));
        }
        KeyCode::Char('c') => {
            app.mode = Mode::Editor { form: customer_form(None), editing: None };
        }
        KeyCode::Char('e') => {
            if let Some(customer) = app.cursor_customer().cloned() {
                let editing = customer.customer_id;
                app.mode = Mode::Editor { form: customer_form(Some(&customer)), editing };
            }
        }
        KeyCode::Char('d') => {
            if let Some(id) = app.cursor_id() {
                app.mode = Mode::ConfirmDelete(id);
            }
        }
        KeyCode::Char('P') => {
            if let Some(customer) = app.cursor_customer().cloned() {
                app.send(Command::PredictRow(customer));
            }
        }
        KeyCode::Char('x') => {
            if let Some(id) = app.cursor_id() {
                app.send(Command::CalculateRisk(id));
            }
        }
        KeyCode::Char('b') => app.send(Command::BulkSetActive(true)),
        KeyCode::Char('B') => app.send(Command::BulkSetActive(false)),
        KeyCode::Char('D') => app.send(Command::BulkDelete),
        KeyCode::Char('i') => {
            if !app.snapshot.importing {
                app.mode = Mode::ImportForm(import_form());
            }
        }
        _ => {}
    }
}

// ============================================================================
// DRAWING
// ============================================================================

fn draw(f: &mut Frame, app: &mut App) {
    if let Mode::Login(form) = &app.mode {
        draw_login(f, form, app.snapshot.notice.as_ref(), &app.snapshot.auth);
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header with navigation
            Constraint::Min(0),    // content area
            Constraint::Length(3), // status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);
    match app.page {
        Page::Dashboard => render_dashboard(f, chunks[1], app),
        Page::Customers => render_customers(f, chunks[1], app),
        Page::Risk => render_risk(f, chunks[1], app),
        Page::Predict => render_predict(f, chunks[1], app),
        Page::Admin => render_admin(f, chunks[1], app),
        Page::Alerts => render_alerts(f, chunks[1], app),
    }
    render_status_bar(f, chunks[2], app);

    // modal overlays
    match &app.mode {
        Mode::Filter(form)
        | Mode::PredictForm(form)
        | Mode::UserEditor(form)
        | Mode::AlertEditor(form)
        | Mode::ImportForm(form) => render_form_popup(f, form),
        Mode::Editor { form, .. } => render_form_popup(f, form),
        Mode::ConfirmDelete(id) => render_confirm_popup(f, *id),
        Mode::Normal | Mode::Login(_) => {}
    }
}

fn draw_login(f: &mut Frame, form: &Form, notice: Option<&Notice>, auth: &AuthState) {
    let area = centered_rect(46, 12, f.size());
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Churn Console - Sign In ");

    let mut lines = vec![Line::from("")];
    for (i, field) in form.fields.iter().enumerate() {
        let style = if i == form.active {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        let shown = if field.label == "password" {
            "*".repeat(field.value.len())
        } else {
            field.value.clone()
        };
        lines.push(Line::from(vec![
            Span::styled(format!("  {:>10}: ", field.label), style),
            Span::raw(shown),
        ]));
    }
    lines.push(Line::from(""));
    if *auth == AuthState::Probing {
        lines.push(Line::from(Span::styled(
            "  Signing in...",
            Style::default().fg(Color::Cyan),
        )));
    } else if let Some(error) = form.error.as_deref().or(notice.map(|n| n.text.as_str())) {
        lines.push(Line::from(Span::styled(
            format!("  {}", error),
            Style::default().fg(Color::Red),
        )));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "  Enter sign in | Tab next field | Esc quit",
        Style::default().fg(Color::DarkGray),
    )));

    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let pages = [
        Page::Dashboard,
        Page::Customers,
        Page::Risk,
        Page::Predict,
        Page::Admin,
        Page::Alerts,
    ];

    let mut tab_spans = vec![];
    for (i, page) in pages.iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }
        let style = if *page == app.page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        tab_spans.push(Span::styled(page.title(), style));
    }

    if let AuthState::LoggedIn { username } = &app.snapshot.auth {
        tab_spans.push(Span::raw("  |  "));
        tab_spans.push(Span::styled(
            username.clone(),
            Style::default().fg(Color::White),
        ));
    }
    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("Customers: {}", app.snapshot.grid.pagination.total_items),
        Style::default().fg(Color::White),
    ));

    let header = Paragraph::new(vec![Line::from(tab_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    f.render_widget(header, area);
}

fn render_customers(f: &mut Frame, area: Rect, app: &mut App) {
    let grid = &app.snapshot.grid;

    if grid.rows.is_empty() && grid.phase == GridPhase::Loading {
        let loading = Paragraph::new("Loading customers...")
            .style(Style::default().fg(Color::Cyan))
            .block(Block::default().borders(Borders::ALL).title(" Customers "));
        f.render_widget(loading, area);
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(area);

    let header_cells = [
        " ", "ID", "Surname", "Geo", "Gender", "Age", "Score", "Balance", "Prod", "Status", "Risk",
    ]
    .iter()
    .map(|h| {
        Cell::from(*h).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    });
    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows = grid.rows.iter().map(|customer| {
        let id = customer.customer_id.unwrap_or(0);
        let selected = if grid.is_selected(id) { "[x]" } else { "[ ]" };
        let status = if customer.has_churned() {
            Cell::from("Churned").style(Style::default().fg(Color::Red))
        } else {
            Cell::from("Active").style(Style::default().fg(Color::Green))
        };
        let risk = match grid.risk.get(&id) {
            Some(annotation) => {
                let color = match annotation.level() {
                    RiskLevel::VeryHigh | RiskLevel::High => Color::Red,
                    RiskLevel::Medium => Color::Yellow,
                    RiskLevel::Low | RiskLevel::VeryLow => Color::Green,
                };
                let delta = if annotation.delta != 0.0 {
                    format!(" ({:+.1})", annotation.delta)
                } else {
                    String::new()
                };
                Cell::from(format!("{:.1}%{}", annotation.score * 100.0, delta))
                    .style(Style::default().fg(color))
            }
            None if grid.phase == GridPhase::Loading => {
                Cell::from("...").style(Style::default().fg(Color::DarkGray))
            }
            None => Cell::from("x calc").style(Style::default().fg(Color::DarkGray)),
        };

        Row::new(vec![
            Cell::from(selected),
            Cell::from(id.to_string()),
            Cell::from(truncate(customer.surname.as_deref().unwrap_or("-"), 14)),
            Cell::from(customer.geography.clone()),
            Cell::from(customer.gender.clone()),
            Cell::from(customer.age.to_string()),
            Cell::from(customer.credit_score.to_string()),
            Cell::from(format!("{:.0}", customer.balance)),
            Cell::from(customer.num_of_products.to_string()),
            status,
            risk,
        ])
        .height(1)
    });

    let title = match grid.phase {
        GridPhase::Loading => " Customers (loading...) ".to_string(),
        GridPhase::Errored => " Customers (load failed - r to retry) ".to_string(),
        _ => format!(" Customers ({} selected) ", grid.selection.len()),
    };
    let border_color = if grid.phase == GridPhase::Errored {
        Color::Red
    } else {
        Color::White
    };

    let table = Table::new(
        rows,
        [
            Constraint::Length(3),
            Constraint::Length(6),
            Constraint::Length(15),
            Constraint::Length(8),
            Constraint::Length(7),
            Constraint::Length(4),
            Constraint::Length(6),
            Constraint::Length(10),
            Constraint::Length(5),
            Constraint::Length(8),
            Constraint::Length(16),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(border_color))
            .title(title),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, chunks[0], &mut app.table);

    let pagination = &app.snapshot.grid.pagination;
    let footer = Line::from(vec![
        Span::styled(
            format!(
                "Showing {} to {} of {} customers",
                pagination.first_row(),
                pagination.last_row(),
                pagination.total_items
            ),
            Style::default().fg(Color::Cyan),
        ),
        Span::raw("  |  "),
        Span::styled(
            format!("Page {}/{}", pagination.page, pagination.total_pages()),
            Style::default().fg(Color::White),
        ),
        Span::raw(if app.snapshot.grid.filters.has_predicates() {
            "  |  filtered"
        } else {
            ""
        }),
    ]);
    f.render_widget(Paragraph::new(footer), chunks[1]);
}

fn render_dashboard(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default().borders(Borders::ALL).title(" Dashboard ");

    let Some(stats) = &app.snapshot.dashboard else {
        f.render_widget(
            Paragraph::new("Loading dashboard statistics...")
                .style(Style::default().fg(Color::Cyan))
                .block(block),
            area,
        );
        return;
    };

    let mut lines = vec![
        Line::from(""),
        Line::from(vec![
            Span::styled("  Total Customers: ", Style::default().fg(Color::Cyan)),
            Span::styled(
                stats.total_customers.to_string(),
                Style::default().add_modifier(Modifier::BOLD),
            ),
            Span::raw("    "),
            Span::styled("Active: ", Style::default().fg(Color::Cyan)),
            Span::styled(
                stats.active_customers.to_string(),
                Style::default().fg(Color::Green),
            ),
            Span::raw("    "),
            Span::styled("Churn Rate: ", Style::default().fg(Color::Cyan)),
            Span::styled(
                format!("{:.2}%", stats.churn_rate),
                Style::default().fg(Color::Red),
            ),
        ]),
        Line::from(vec![
            Span::styled("  Avg Credit Score: ", Style::default().fg(Color::Cyan)),
            Span::raw(format!("{:.0}", stats.averages.credit_score)),
            Span::raw("    "),
            Span::styled("Avg Age: ", Style::default().fg(Color::Cyan)),
            Span::raw(format!("{:.0}", stats.averages.age)),
            Span::raw("    "),
            Span::styled("Avg Balance: ", Style::default().fg(Color::Cyan)),
            Span::raw(format!("${:.0}", stats.averages.balance)),
        ]),
        Line::from(""),
        Line::from(Span::styled(
            "  Customers by Geography",
            Style::default().add_modifier(Modifier::BOLD),
        )),
    ];

    let max_count = stats
        .geography_distribution
        .iter()
        .map(|g| g.count)
        .max()
        .unwrap_or(1)
        .max(1);
    for entry in &stats.geography_distribution {
        lines.push(bar_line(
            &entry.geography,
            entry.count as f64,
            max_count as f64,
            &entry.count.to_string(),
            Color::Cyan,
        ));
    }

    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "  Churn Rate by Geography",
        Style::default().add_modifier(Modifier::BOLD),
    )));
    for entry in &stats.churn_by_geography {
        lines.push(bar_line(
            &entry.geography,
            entry.churn_rate,
            100.0,
            &format!("{:.1}%", entry.churn_rate),
            Color::Red,
        ));
    }

    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "  Customers by Product Count",
        Style::default().add_modifier(Modifier::BOLD),
    )));
    let max_count = stats
        .product_distribution
        .iter()
        .map(|p| p.count)
        .max()
        .unwrap_or(1)
        .max(1);
    for entry in &stats.product_distribution {
        lines.push(bar_line(
            &format!("{} product(s)", entry.num_of_products),
            entry.count as f64,
            max_count as f64,
            &entry.count.to_string(),
            Color::Cyan,
        ));
    }

    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_risk(f: &mut Frame, area: Rect, app: &App) {
    let title = if app.snapshot.monitoring_running {
        " Risk Monitoring (running...) "
    } else {
        " Risk Monitoring "
    };
    let block = Block::default().borders(Borders::ALL).title(title);

    let Some(risk) = &app.snapshot.risk else {
        f.render_widget(
            Paragraph::new("No monitoring data loaded. Press m to run monitoring, r to refresh.")
                .style(Style::default().fg(Color::Cyan))
                .block(block),
            area,
        );
        return;
    };

    let mut lines = vec![
        Line::from(""),
        Line::from(vec![
            Span::styled("  Thresholds - high risk: ", Style::default().fg(Color::Cyan)),
            Span::raw(format!("{:.0}%", risk.thresholds.high_risk * 100.0)),
            Span::styled("   risk increase: ", Style::default().fg(Color::Cyan)),
            Span::raw(format!("{:.0} points", risk.thresholds.risk_increase)),
        ]),
        Line::from(""),
        Line::from(Span::styled(
            "  Risk Distribution",
            Style::default().add_modifier(Modifier::BOLD),
        )),
    ];

    let d = &risk.risk_distribution;
    let total = (d.very_high + d.high + d.medium + d.low + d.very_low).max(1) as f64;
    for (label, count, color) in [
        ("Very High (80-100%)", d.very_high, Color::Red),
        ("High (60-80%)", d.high, Color::LightRed),
        ("Medium (40-60%)", d.medium, Color::Yellow),
        ("Low (20-40%)", d.low, Color::Green),
        ("Very Low (0-20%)", d.very_low, Color::Blue),
    ] {
        lines.push(bar_line(label, count as f64, total, &count.to_string(), color));
    }

    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        format!("  High Risk Customers ({})", risk.high_risk_customers.len()),
        Style::default().add_modifier(Modifier::BOLD),
    )));
    for customer in risk.high_risk_customers.iter().take(8) {
        let mut spans = vec![
            Span::raw(format!("    {:<18}", truncate(&customer.customer_name, 18))),
            Span::styled(
                format!("{:>5.1}%", customer.probability * 100.0),
                Style::default().fg(Color::Red),
            ),
        ];
        if customer.risk_change > 0.0 {
            spans.push(Span::styled(
                format!("  +{:.1}", customer.risk_change),
                Style::default().fg(Color::LightRed),
            ));
        }
        lines.push(Line::from(spans));
    }

    if !risk.significant_increases.is_empty() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("  Significant Increases ({})", risk.significant_increases.len()),
            Style::default().add_modifier(Modifier::BOLD),
        )));
        for increase in risk.significant_increases.iter().take(5) {
            lines.push(Line::from(format!(
                "    {:<18}{:.1}% -> {:.1}%",
                truncate(&increase.customer_name, 18),
                increase.previous_probability * 100.0,
                increase.probability * 100.0,
            )));
        }
    }

    if let Some(latest) = risk.risk_trend.last() {
        lines.push(Line::from(""));
        lines.push(Line::from(vec![
            Span::styled(
                "  30-day trend - latest avg risk: ",
                Style::default().fg(Color::Cyan),
            ),
            Span::raw(format!("{:.1}%", latest.avg_risk * 100.0)),
            Span::styled("   high-risk count: ", Style::default().fg(Color::Cyan)),
            Span::raw(latest.high_risk_count.to_string()),
        ]));
    }

    f.render_widget(
        Paragraph::new(lines).block(block).wrap(Wrap { trim: false }),
        area,
    );
}

fn render_predict(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Churn Prediction ");

    let mut lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            "  Press e to enter a feature vector and predict churn risk.",
            Style::default().fg(Color::Cyan),
        )),
        Line::from(""),
    ];

    if let Some(prediction) = &app.snapshot.prediction {
        let score = prediction.churn_probability;
        let level = RiskLevel::for_score(score);
        let color = match level {
            RiskLevel::VeryHigh | RiskLevel::High => Color::Red,
            RiskLevel::Medium => Color::Yellow,
            _ => Color::Green,
        };
        lines.push(Line::from(vec![
            Span::styled(
                "  Churn probability: ",
                Style::default().add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!("{:.2}%  ({} risk)", score * 100.0, level.as_str()),
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            ),
        ]));
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "  Feature Importance",
            Style::default().add_modifier(Modifier::BOLD),
        )));

        let mut importances = prediction.feature_importance.clone();
        importances.sort_by(|a, b| b.importance.partial_cmp(&a.importance).unwrap());
        let max = importances
            .first()
            .map(|f| f.importance)
            .unwrap_or(1.0)
            .max(f64::EPSILON);
        for feature in &importances {
            lines.push(bar_line(
                &feature.feature,
                feature.importance,
                max,
                &format!("{:.1}%", feature.importance * 100.0),
                Color::Cyan,
            ));
        }
    } else {
        lines.push(Line::from(Span::styled(
            "  No prediction yet.",
            Style::default().fg(Color::DarkGray),
        )));
    }

    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_admin(f: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(area);

    // users table
    let header = Row::new(["Username", "Email", "Name", "Admin"].iter().map(|h| {
        Cell::from(*h).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    }))
    .style(Style::default().bg(Color::DarkGray))
    .height(1);

    let rows = app.snapshot.users.iter().map(|user| {
        Row::new(vec![
            Cell::from(user.username.clone()),
            Cell::from(truncate(&user.email, 22)),
            Cell::from(truncate(&user.full_name(), 18)),
            Cell::from(if user.is_staff { "Yes" } else { "No" }),
        ])
        .height(1)
    });
    let users = Table::new(
        rows,
        [
            Constraint::Length(14),
            Constraint::Length(24),
            Constraint::Length(20),
            Constraint::Length(6),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" Users ({}) - c to add ", app.snapshot.users.len())),
    );
    f.render_widget(users, chunks[0]);

    // model metrics
    let title = if app.snapshot.training {
        " Model (training...) - t to train "
    } else {
        " Model - t to train "
    };
    let mut lines = vec![Line::from("")];
    for (label, metrics) in [
        ("Latest", app.snapshot.metrics.latest_metrics.as_ref()),
        ("Best", app.snapshot.metrics.best_metrics.as_ref()),
    ] {
        lines.push(Line::from(Span::styled(
            format!("  {} Model", label),
            Style::default().add_modifier(Modifier::BOLD),
        )));
        match metrics {
            Some(m) => {
                lines.push(Line::from(format!(
                    "    train acc {:.1}%  test acc {:.1}%",
                    m.train_accuracy * 100.0,
                    m.test_accuracy * 100.0
                )));
                lines.push(Line::from(format!(
                    "    precision {:.1}%  recall {:.1}%  f1 {:.1}%",
                    m.precision_class1 * 100.0,
                    m.recall_class1 * 100.0,
                    m.f1_class1 * 100.0
                )));
                lines.push(Line::from(format!(
                    "    {} samples, {:.1}s, cross-val {:.1}%",
                    m.training_details.total_samples,
                    m.training_details.training_time,
                    m.avg_cross_val_score() * 100.0
                )));
            }
            None => {
                lines.push(Line::from(Span::styled(
                    "    no metrics available",
                    Style::default().fg(Color::DarkGray),
                )));
            }
        }
        lines.push(Line::from(""));
    }

    f.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title)),
        chunks[1],
    );
}

fn render_alerts(f: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(5), Constraint::Min(0)])
        .split(area);

    // config + stats summary
    let mut lines = Vec::new();
    match &app.snapshot.alert_config {
        Some(config) => {
            lines.push(Line::from(vec![
                Span::styled("  Webhook: ", Style::default().fg(Color::Cyan)),
                Span::raw(if config.webhook_url.is_empty() {
                    "(not set)".to_string()
                } else {
                    truncate(&config.webhook_url, 48)
                }),
                Span::raw("   "),
                Span::styled(
                    if config.is_enabled { "enabled" } else { "disabled" },
                    Style::default().fg(if config.is_enabled {
                        Color::Green
                    } else {
                        Color::Red
                    }),
                ),
            ]));
            lines.push(Line::from(format!(
                "  High risk at {:.0}%, increase alerts at {:.0} points",
                config.high_risk_threshold * 100.0,
                config.risk_increase_threshold
            )));
        }
        None => lines.push(Line::from("  Loading alert configuration...")),
    }
    if let Some(stats) = &app.snapshot.alert_stats {
        lines.push(Line::from(format!(
            "  {} alerts, {:.0}% delivered  (high risk {}, increases {}, summaries {})",
            stats.total_alerts,
            stats.success_rate,
            stats.alert_types.high_risk,
            stats.alert_types.risk_increase,
            stats.alert_types.summary
        )));
    }
    f.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Alerts - c to configure "),
        ),
        chunks[0],
    );

    // history table
    let header = Row::new(
        ["Sent", "Customer", "Type", "Delivered", "Error"].iter().map(|h| {
            Cell::from(*h).style(
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )
        }),
    )
    .style(Style::default().bg(Color::DarkGray))
    .height(1);

    let rows = app.snapshot.alert_history.iter().map(|alert| {
        let delivered = if alert.was_sent {
            Cell::from("yes").style(Style::default().fg(Color::Green))
        } else {
            Cell::from("no").style(Style::default().fg(Color::Red))
        };
        Row::new(vec![
            Cell::from(alert.sent_at.format("%Y-%m-%d %H:%M").to_string()),
            Cell::from(if alert.customer_name.is_empty() {
                "-".to_string()
            } else {
                alert.customer_name.clone()
            }),
            Cell::from(alert.alert_type.as_str()),
            delivered,
            Cell::from(truncate(alert.error_message.as_deref().unwrap_or(""), 30)),
        ])
        .height(1)
    });
    let history = Table::new(
        rows,
        [
            Constraint::Length(17),
            Constraint::Length(16),
            Constraint::Length(14),
            Constraint::Length(10),
            Constraint::Length(32),
        ],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title(" Alert History "));
    f.render_widget(history, chunks[1]);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let notice = if app.page == Page::Customers {
        app.snapshot.grid.notice.as_ref()
    } else {
        app.snapshot.notice.as_ref()
    };

    let mut spans = Vec::new();
    if let Some(notice) = notice {
        let color = match notice.kind {
            NoticeKind::Info => Color::Cyan,
            NoticeKind::Success => Color::Green,
            NoticeKind::Warning => Color::Yellow,
            NoticeKind::Error => Color::Red,
        };
        spans.push(Span::styled(
            format!(" {} ", truncate(&notice.text, 70)),
            Style::default().fg(color),
        ));
        spans.push(Span::raw("| "));
    }
    if app.snapshot.importing {
        spans.push(Span::styled(
            "importing... | ",
            Style::default().fg(Color::Cyan),
        ));
    }

    let hints = match app.page {
        Page::Customers => {
            "space select | a all | f filter | c add | e edit | d del | P predict | x risk | b/B active | D bulk del | i import | n/p page | Tab view | q quit"
        }
        Page::Risk => "m run monitoring | r refresh | Tab view | q quit",
        Page::Predict => "e predict | Tab view | q quit",
        Page::Admin => "t train | c add user | r refresh | Tab view | q quit",
        Page::Alerts => "c configure | r refresh | Tab view | q quit",
        Page::Dashboard => "r refresh | Tab view | q quit",
    };
    spans.push(Span::styled(hints, Style::default().fg(Color::DarkGray)));

    let status_bar = Paragraph::new(vec![Line::from(spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );
    f.render_widget(status_bar, area);
}

fn render_form_popup(f: &mut Frame, form: &Form) {
    let height = (form.fields.len() + 6) as u16;
    let area = centered_rect(56, height, f.size());
    f.render_widget(Clear, area);

    let mut lines = vec![Line::from("")];
    for (i, field) in form.fields.iter().enumerate() {
        let style = if i == form.active {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        let shown = if field.label == "password" {
            "*".repeat(field.value.len())
        } else {
            field.value.clone()
        };
        lines.push(Line::from(vec![
            Span::styled(format!("  {:>24}: ", field.label), style),
            Span::raw(shown),
            if i == form.active {
                Span::styled("_", Style::default().fg(Color::Yellow))
            } else {
                Span::raw("")
            },
        ]));
    }
    lines.push(Line::from(""));
    if let Some(error) = &form.error {
        lines.push(Line::from(Span::styled(
            format!("  {}", error),
            Style::default().fg(Color::Red),
        )));
    }
    lines.push(Line::from(Span::styled(
        "  Enter submit | Tab next | Esc cancel",
        Style::default().fg(Color::DarkGray),
    )));

    let popup = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(format!(" {} ", form.title)),
    );
    f.render_widget(popup, area);
}

fn render_confirm_popup(f: &mut Frame, id: u32) {
    let area = centered_rect(44, 7, f.size());
    f.render_widget(Clear, area);

    let lines = vec![
        Line::from(""),
        Line::from(format!("  Delete customer #{}?", id)),
        Line::from(""),
        Line::from(vec![
            Span::styled("  y", Style::default().fg(Color::Red)),
            Span::raw(" delete | "),
            Span::styled("n", Style::default().fg(Color::Green)),
            Span::raw("/Esc cancel"),
        ]),
    ];
    let popup = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Red))
            .title(" Confirm Delete "),
    );
    f.render_widget(popup, area);
}

fn bar_line(label: &str, value: f64, max: f64, shown: &str, color: Color) -> Line<'static> {
    let width = 24.0;
    let filled = ((value / max) * width).round().clamp(0.0, width) as usize;
    Line::from(vec![
        Span::raw(format!("    {:<22}", truncate(label, 22))),
        Span::styled("█".repeat(filled), Style::default().fg(color)),
        Span::raw(format!(" {}", shown)),
    ])
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let x = area.x + area.width.saturating_sub(width) / 2;
    let y = area.y + area.height.saturating_sub(height) / 2;
    Rect {
        x,
        y,
        width: width.min(area.width),
        height: height.min(area.height),
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_cycle_is_closed() {
        let mut page = Page::Dashboard;
        for _ in 0..6 {
            page = page.next();
        }
        assert_eq!(page, Page::Dashboard);

        assert_eq!(Page::Dashboard.previous(), Page::Alerts);
        assert_eq!(Page::Alerts.next(), Page::Dashboard);
    }

    #[test]
    fn test_form_field_editing() {
        let mut form = login_form();
        form.input('a');
        form.input('b');
        form.backspace();
        assert_eq!(form.value("username"), "a");

        form.next_field();
        form.input('x');
        assert_eq!(form.value("password"), "x");

        form.previous_field();
        assert_eq!(form.active, 0);
    }

    #[test]
    fn test_parse_customer_roundtrip() {
        let customer = Customer {
            customer_id: Some(9),
            credit_score: 640,
            age: 52,
            tenure: 8,
            balance: 1234.5,
            num_of_products: 2,
            has_cr_card: false,
            is_active_member: true,
            estimated_salary: 72000.0,
            geography: "Spain".to_string(),
            gender: "Male".to_string(),
            exited: Some(true),
            surname: Some("Navarro".to_string()),
        };
        let form = customer_form(Some(&customer));
        let parsed = parse_customer(&form, Some(9)).unwrap();
        assert_eq!(parsed, customer);
    }

    #[test]
    fn test_parse_customer_reports_bad_numbers() {
        let mut form = customer_form(None);
        form.fields[1].value = "not-a-number".to_string(); // credit score
        let err = parse_customer(&form, None).unwrap_err();
        assert!(err.contains("credit score"));
    }

    #[test]
    fn test_parse_filters_blank_and_all_mean_unset() {
        let mut form = filter_form(&CustomerFilters::default());
        assert_eq!(parse_filters(&form).unwrap(), CustomerFilters::default());

        form.fields
            .iter_mut()
            .find(|f| f.label == "geography")
            .unwrap()
            .value = "all".to_string();
        assert!(parse_filters(&form).unwrap().geography.is_none());

        form.fields
            .iter_mut()
            .find(|f| f.label == "churned (yes/no)")
            .unwrap()
            .value = "yes".to_string();
        assert_eq!(parse_filters(&form).unwrap().exited, Some(true));
    }

    #[test]
    fn test_filter_form_prefills_current_state() {
        let filters = CustomerFilters {
            geography: Some("Germany".to_string()),
            min_age: Some(30),
            exited: Some(false),
            page_size: Some(25),
            ..Default::default()
        };
        let form = filter_form(&filters);
        assert_eq!(form.value("geography"), "Germany");
        assert_eq!(form.value("min age"), "30");
        assert_eq!(form.value("churned (yes/no)"), "no");
        assert_eq!(form.value("page size"), "25");

        let parsed = parse_filters(&form).unwrap();
        assert_eq!(parsed.geography.as_deref(), Some("Germany"));
        assert_eq!(parsed.min_age, Some(30));
        assert_eq!(parsed.exited, Some(false));
        assert_eq!(parsed.page_size, Some(25));
    }

    #[test]
    fn test_parse_alert_config_enforces_ranges() {
        let mut form = alert_form(None);
        form.fields
            .iter_mut()
            .find(|f| f.label == "high risk threshold")
            .unwrap()
            .value = "1.5".to_string();
        assert!(parse_alert_config(&form).is_err());

        let form = alert_form(Some(&AlertConfig {
            webhook_url: "https://example.com/hook".to_string(),
            is_enabled: true,
            high_risk_threshold: 0.8,
            risk_increase_threshold: 15.0,
        }));
        let parsed = parse_alert_config(&form).unwrap();
        assert!(parsed.is_enabled);
        assert!((parsed.high_risk_threshold - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_parse_import_requires_path() {
        let form = import_form();
        assert!(parse_import(&form).is_err());

        let mut form = import_form();
        form.fields[0].value = "/tmp/customers.csv".to_string();
        let (path, update) = parse_import(&form).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/customers.csv"));
        assert!(!update);
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a very long label indeed", 10), "a very ...");
    }
}
