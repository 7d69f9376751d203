//! billpull - monthly usage bill downloader
//!
//! Main entry point for the billpull CLI.

use anyhow::Context;
use billpull::config::{validate_config_result, BillsConfig};
use billpull::detector::{
    CompletionDetector, DEFAULT_DOWNLOAD_TIMEOUT, DEFAULT_LATE_DOWNLOAD_GRACE,
    DEFAULT_POLL_INTERVAL,
};
use billpull::orchestrator::{Orchestrator, OrchestratorConfig};
use billpull::organizations::{discover_bills_csv, load_organizations, OrganizationRecord};
use billpull::period::{destination_filename, BillingPeriod};
use billpull::portal::{PortalConfig, WebDriverPortal, DEFAULT_ELEMENT_TIMEOUT};
use billpull::style;
use billpull::BillsError;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

/// Name of the download directory inside the working directory
const BILLS_DIR_NAME: &str = "bills";

/// billpull - download and rename monthly usage bills
#[derive(Parser, Debug)]
#[command(name = "billpull")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Directory holding config.ini and YYYY-MM-bills.csv
    #[arg(short = 'd', long, env = "BILLPULL_WORKDIR", default_value = ".")]
    workdir: PathBuf,

    /// Path to config file (default: <workdir>/config.ini)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Download directory (default: <workdir>/bills)
    #[arg(long)]
    bills_dir: Option<PathBuf>,

    /// Billing application URL (overrides BASE_URL)
    #[arg(long, env = "BILLPULL_BASE_URL")]
    base_url: Option<String>,

    /// chromedriver endpoint (overrides WEBDRIVER_URL)
    #[arg(long, env = "BILLPULL_WEBDRIVER_URL")]
    webdriver_url: Option<String>,

    /// Run Chrome without a window
    #[arg(long)]
    headless: bool,

    /// Billing period as YYYY-MM (default: taken from the CSV file name)
    #[arg(long)]
    period: Option<String>,

    /// Interval between download directory listings, in milliseconds
    #[arg(
        long,
        default_value_t = DEFAULT_POLL_INTERVAL.as_millis() as u64,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    poll_interval_ms: u64,

    /// Time to wait for each exported PDF, in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_DOWNLOAD_TIMEOUT.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    download_timeout_secs: u64,

    /// Extra time to watch for an export that missed its timeout, in seconds
    #[arg(long, default_value_t = DEFAULT_LATE_DOWNLOAD_GRACE.as_secs())]
    late_grace_secs: u64,

    /// Time to wait for page elements, in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_ELEMENT_TIMEOUT.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    element_timeout_secs: u64,

    /// Also write the run report as JSON
    #[arg(long)]
    report_json: Option<PathBuf>,

    /// Exit without waiting for Enter
    #[arg(long)]
    no_pause: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download and rename bills (default)
    Run,

    /// Validate config and organization list without starting a browser
    Check,
}

#[tokio::main]
async fn main() {
    if let Err(e) = billpull::logging::init() {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let cli = Cli::parse();
    let pause = !cli.no_pause;

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {}", style::error("Error:"), e);
            1
        }
    };

    if pause {
        pause_before_exit();
    }
    process::exit(code);
}

/// Returns the process exit code: 0 when every bill was saved, 2 otherwise
async fn run(cli: Cli) -> billpull::Result<i32> {
    let workdir = cli.workdir.clone();

    // Everything that can be wrong locally is checked before the browser starts
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| BillsConfig::default_path(&workdir));
    let mut config = BillsConfig::load(&config_path)?;
    if let Some(url) = cli.base_url.clone() {
        config.base_url = url;
    }
    if let Some(url) = cli.webdriver_url.clone() {
        config.webdriver_url = url;
    }
    validate_config_result(&config)?;

    let (csv_path, file_period) = discover_bills_csv(&workdir)?;
    let period = match cli.period.as_deref() {
        Some(text) => parse_period(text)?,
        None => file_period,
    };
    let orgs = load_organizations(&csv_path)?;

    if let Some(Commands::Check) = cli.command {
        print_plan(&csv_path, period, &orgs);
        return Ok(0);
    }

    let bills_dir = cli
        .bills_dir
        .clone()
        .unwrap_or_else(|| workdir.join(BILLS_DIR_NAME));
    std::fs::create_dir_all(&bills_dir)
        .with_context(|| format!("Cannot create download directory {}", bills_dir.display()))?;
    // chromedriver needs an absolute download path
    let bills_dir = if bills_dir.is_absolute() {
        bills_dir
    } else {
        std::env::current_dir()
            .context("Cannot resolve the current directory")?
            .join(bills_dir)
    };

    tracing::info!(
        organizations = orgs.len(),
        %period,
        bills_dir = %bills_dir.display(),
        "Starting run"
    );

    let portal_config = PortalConfig {
        base_url: config.base_url.clone(),
        webdriver_url: config.webdriver_url.clone(),
        headless: cli.headless,
        element_timeout: Duration::from_secs(cli.element_timeout_secs),
    };
    let portal = WebDriverPortal::connect(portal_config, &bills_dir)
        .await
        .map_err(|e| {
            BillsError::Session(format!(
                "could not start a browser at {}: {}",
                config.webdriver_url, e
            ))
        })?;

    let detector = CompletionDetector::new(Duration::from_millis(cli.poll_interval_ms));
    let orchestrator_config = OrchestratorConfig::new(&bills_dir)
        .with_download_timeout(Duration::from_secs(cli.download_timeout_secs))
        .with_late_download_grace(Duration::from_secs(cli.late_grace_secs));
    let mut orchestrator = Orchestrator::new(portal, detector, orchestrator_config);

    let report = orchestrator
        .run_with_session(&config.credentials, &orgs, period)
        .await?;

    println!();
    print!("{}", report.render());

    if let Some(path) = cli.report_json.as_deref() {
        report.save_json(path)?;
    }

    println!();
    println!(
        "Bills saved to {}",
        style::path(&bills_dir.display().to_string())
    );
    println!(
        "{}",
        style::warning(&format!(
            "Delete {} before next month's run.",
            csv_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        ))
    );

    Ok(if report.all_succeeded() { 0 } else { 2 })
}

fn parse_period(text: &str) -> billpull::Result<BillingPeriod> {
    let date = NaiveDate::parse_from_str(&format!("{}-01", text.trim()), "%Y-%m-%d")
        .map_err(|_| BillsError::Config(format!("--period must be YYYY-MM, got `{}`", text)))?;
    BillingPeriod::from_date(date)
}

fn print_plan(csv_path: &Path, period: BillingPeriod, orgs: &[OrganizationRecord]) {
    println!(
        "{} {} ({})",
        style::header("Organization list:"),
        style::path(&csv_path.display().to_string()),
        period
    );
    println!();
    for org in orgs {
        println!(
            "  {} {}",
            style::org_id(&org.id),
            style::dim(&destination_filename(&period, &org.display_name))
        );
    }
    println!();
    println!(
        "{}",
        style::success(&format!("{} organizations ready", orgs.len()))
    );
}

/// Keep a double-clicked console window open until the user has read it
fn pause_before_exit() {
    let _ = dialoguer::Input::<String>::new()
        .with_prompt("Press Enter to exit")
        .allow_empty(true)
        .interact_text();
}
