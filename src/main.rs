use anyhow::{bail, Result};
use churn_console::{import, ApiClient, Credentials, CustomerFilters, Session};
use std::env;
use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;

/// Runtime configuration, environment-driven.
struct Config {
    base_url: String,
    credentials: Option<Credentials>,
    page_size: Option<u32>,
}

impl Config {
    fn from_env() -> Self {
        let base_url =
            env::var("CHURN_API_URL").unwrap_or_else(|_| "http://localhost:8000".to_string());
        let credentials = match (env::var("CHURN_API_USER"), env::var("CHURN_API_PASSWORD")) {
            (Ok(username), Ok(password)) => Some(Credentials { username, password }),
            _ => None,
        };
        let page_size = env::var("CHURN_PAGE_SIZE")
            .ok()
            .and_then(|v| v.parse().ok());
        Config {
            base_url,
            credentials,
            page_size,
        }
    }

    fn session(&self) -> Session {
        match &self.credentials {
            Some(credentials) => Session::with_credentials(credentials.clone()),
            None => Session::anonymous(),
        }
    }

    fn initial_filters(&self) -> CustomerFilters {
        CustomerFilters {
            page_size: self.page_size,
            ..Default::default()
        }
    }
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() > 1 && args[1] == "import" {
        // Headless import mode
        env_logger::init();
        run_import(&args[2..])
    } else {
        run_ui_mode()
    }
}

fn run_import(args: &[String]) -> Result<()> {
    let config = Config::from_env();
    if config.credentials.is_none() {
        bail!("import requires CHURN_API_USER and CHURN_API_PASSWORD");
    }
    let Some(file) = args.first() else {
        bail!("usage: churn-console import <file.csv> [--update-existing]");
    };
    let update_existing = args.iter().any(|a| a == "--update-existing");
    let path = PathBuf::from(file);

    println!("Importing customers from {}", path.display());
    println!("Backend: {}", config.base_url);

    let preflight = import::preflight(Path::new(&path))?;
    println!("✓ Preflight: {} data rows", preflight.rows);

    let rt = Runtime::new()?;
    let report = rt.block_on(async {
        let api = ApiClient::new(config.base_url.clone(), config.session())?;
        import::run(&api, &path, update_existing).await
    })?;

    println!("✓ Import complete");
    println!("  Created: {}", report.created);
    println!("  Updated: {}", report.updated);
    println!("  Skipped: {}", report.skipped);

    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode() -> Result<()> {
    use anyhow::Context;
    use churn_console::worker;
    use std::fs::File;
    use tokio::sync::{mpsc, watch};

    // log to a file: stderr would tear the alternate screen
    let log_file = File::create("churn-console.log").context("cannot create log file")?;
    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .init();

    let config = Config::from_env();
    let api = ApiClient::new(config.base_url.clone(), config.session())?;

    let rt = Runtime::new()?;
    let (commands_tx, commands_rx) = mpsc::channel(32);
    let (updates_tx, updates_rx) = watch::channel(worker::ConsoleState::new());
    rt.spawn(worker::run(
        api,
        config.initial_filters(),
        commands_rx,
        updates_tx,
    ));

    let mut app = churn_console::ui::App::new(commands_tx, updates_rx);
    churn_console::ui::run_ui(&mut app)?;

    println!("Console closed.");
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode() -> Result<()> {
    eprintln!("TUI mode not available!");
    eprintln!("  Rebuild with: cargo build --features tui");
    eprintln!("  Or run the mock backend: cargo run --bin churn-mock-server --features mock-server");
    std::process::exit(1);
}
