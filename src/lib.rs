//! billpull - monthly usage bill downloader
//!
//! Signs in to the billing web application once, then for every
//! usage-based organization in `YYYY-MM-bills.csv` exports the first bill
//! as PDF, waits for it to land in `bills/`, and renames it to
//! `{YY}.{MM} ZENICOG 이용 요금 청구서_{name}.pdf`.
//!
//! # Architecture
//!
//! - **detector**: Completion detection by diffing directory listings
//! - **orchestrator**: Per-organization export cycles with isolated failures
//! - **portal**: Browser automation boundary (chromedriver via `webdriver`)
//! - **organizations**: Input file discovery and CSV loading
//! - **period**: Billing period and output naming
//! - **report**: Outcomes and the end-of-run report
//! - **config**: `config.ini` credentials and validation

// Core modules
pub mod detector;
pub mod orchestrator;
pub mod organizations;
pub mod period;
pub mod report;

// Boundaries and ambient concerns
pub mod config;
pub mod error;
pub mod logging;
pub mod portal;
pub mod retry;
pub mod style;

// Re-exports
pub use error::{BillsError, Result};
