//! Per-organization outcomes and the run report

use crate::period::BillingPeriod;
use crate::style;
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;

/// Terminal state of one organization cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Succeeded,
    TimedOut,
    Failed,
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutcomeStatus::Succeeded => write!(f, "succeeded"),
            OutcomeStatus::TimedOut => write!(f, "timed_out"),
            OutcomeStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Why a cycle did not succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No new file showed up before the download timeout
    CycleTimeout,
    /// Navigation or element lookup in the billing application failed
    Collaborator,
    /// Listing or renaming in the download directory failed
    Io,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::CycleTimeout => write!(f, "cycle_timeout"),
            FailureKind::Collaborator => write!(f, "collaborator_failure"),
            FailureKind::Io => write!(f, "io_failure"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

/// Recorded result of one organization cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadOutcome {
    pub organization_id: String,
    pub status: OutcomeStatus,
    pub source_filename: Option<String>,
    pub destination_filename: Option<String>,
    pub failure: Option<Failure>,
}

impl DownloadOutcome {
    pub fn succeeded(
        organization_id: impl Into<String>,
        source: impl Into<String>,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            organization_id: organization_id.into(),
            status: OutcomeStatus::Succeeded,
            source_filename: Some(source.into()),
            destination_filename: Some(destination.into()),
            failure: None,
        }
    }

    pub fn timed_out(organization_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            organization_id: organization_id.into(),
            status: OutcomeStatus::TimedOut,
            source_filename: None,
            destination_filename: None,
            failure: Some(Failure {
                kind: FailureKind::CycleTimeout,
                message: message.into(),
            }),
        }
    }

    pub fn failed(
        organization_id: impl Into<String>,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            organization_id: organization_id.into(),
            status: OutcomeStatus::Failed,
            source_filename: None,
            destination_filename: None,
            failure: Some(Failure {
                kind,
                message: message.into(),
            }),
        }
    }

    /// Attach the detected download name to a failed outcome
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source_filename = Some(source.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Succeeded
    }
}

/// Outcomes of a whole run, in organization-list order
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub period: BillingPeriod,
    pub outcomes: Vec<DownloadOutcome>,
}

impl RunReport {
    pub fn new(period: BillingPeriod) -> Self {
        Self {
            period,
            outcomes: Vec::new(),
        }
    }

    pub fn push(&mut self, outcome: DownloadOutcome) {
        self.outcomes.push(outcome);
    }

    fn count(&self, status: OutcomeStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(OutcomeStatus::Succeeded)
    }

    pub fn timed_out(&self) -> usize {
        self.count(OutcomeStatus::TimedOut)
    }

    pub fn failed(&self) -> usize {
        self.count(OutcomeStatus::Failed)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(DownloadOutcome::is_success)
    }

    pub fn non_successes(&self) -> impl Iterator<Item = &DownloadOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    /// Human-readable summary for the console
    pub fn render(&self) -> String {
        let mut out = String::new();

        let _ = writeln!(
            out,
            "{}",
            style::header(&format!("Billing run {}", self.period))
        );
        let _ = writeln!(out);
        let _ = writeln!(out, "  Organizations:  {}", self.len());
        let _ = writeln!(out, "  Succeeded:      {}", style::count_succeeded(self.succeeded()));
        let _ = writeln!(out, "  Timed out:      {}", style::count_timed_out(self.timed_out()));
        let _ = writeln!(out, "  Failed:         {}", style::count_failed(self.failed()));

        if !self.all_succeeded() {
            let _ = writeln!(out);
            let _ = writeln!(out, "{}", style::header("Not downloaded:"));
            for outcome in self.non_successes() {
                let (kind, message) = outcome
                    .failure
                    .as_ref()
                    .map(|f| (f.kind.to_string(), f.message.as_str()))
                    .unwrap_or_else(|| (outcome.status.to_string(), ""));
                let _ = writeln!(
                    out,
                    "  {} {} {}",
                    style::org_id(&outcome.organization_id),
                    style::status_style(&outcome.status.to_string()),
                    style::dim(&format!("[{}] {}", kind, message))
                );
            }
        }

        out
    }

    /// Write the report as pretty JSON
    pub fn save_json(&self, path: &Path) -> crate::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "Run report written");
        Ok(())
    }
}
