//! Batch orchestrator
//!
//! Drives one export cycle per organization, strictly in list order:
//!
//! ```text
//! Snapshot -> Navigate -> Trigger -> Detect -> Rename -> outcome
//! ```
//!
//! Every cycle ends in a [`DownloadOutcome`]; nothing that goes wrong for a
//! single organization stops the batch. Only a failed sign-in, which every
//! cycle depends on, aborts the run.
//!
//! A timed-out cycle watches for its late export before the next cycle takes
//! its snapshot. Late files are left unrenamed; downloads still unfinished
//! after the grace period are excluded from every later cycle's match.

use crate::config::Credentials;
use crate::detector::{
    CompletionDetector, DetectError, DirectorySnapshot, DEFAULT_DOWNLOAD_TIMEOUT,
    DEFAULT_LATE_DOWNLOAD_GRACE,
};
use crate::organizations::OrganizationRecord;
use crate::period::{destination_filename, BillingPeriod};
use crate::portal::BillingPortal;
use crate::report::{DownloadOutcome, FailureKind, OutcomeStatus, RunReport};
use crate::{BillsError, Result};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Instrument;

/// Orchestrator settings
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Directory the browser downloads into; renamed bills stay here
    pub bills_dir: PathBuf,

    /// How long to wait for the exported PDF of one organization
    pub download_timeout: Duration,

    /// How long to keep watching for a timed-out export before moving on
    pub late_download_grace: Duration,
}

impl OrchestratorConfig {
    pub fn new(bills_dir: impl Into<PathBuf>) -> Self {
        Self {
            bills_dir: bills_dir.into(),
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            late_download_grace: DEFAULT_LATE_DOWNLOAD_GRACE,
        }
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    pub fn with_late_download_grace(mut self, grace: Duration) -> Self {
        self.late_download_grace = grace;
        self
    }
}

/// Bookkeeping carried from one cycle to the next
#[derive(Debug, Default)]
struct RunState {
    /// Destination name -> organization that wrote it
    produced: HashMap<String, String>,

    /// PDFs of timed-out exports that had not finished when their cycle ended
    unclaimed: BTreeSet<String>,
}

/// Runs export cycles for a list of organizations against one portal
pub struct Orchestrator<P> {
    portal: P,
    detector: CompletionDetector,
    config: OrchestratorConfig,
}

impl<P: BillingPortal> Orchestrator<P> {
    pub fn new(portal: P, detector: CompletionDetector, config: OrchestratorConfig) -> Self {
        Self {
            portal,
            detector,
            config,
        }
    }

    pub fn portal(&self) -> &P {
        &self.portal
    }

    pub fn into_portal(self) -> P {
        self.portal
    }

    /// Sign in, process every organization, then release the portal
    ///
    /// A sign-in failure is returned as [`BillsError::Session`] and no cycle
    /// runs. The portal is closed in either case.
    pub async fn run_with_session(
        &mut self,
        credentials: &Credentials,
        orgs: &[OrganizationRecord],
        period: BillingPeriod,
    ) -> Result<RunReport> {
        if let Err(e) = self.portal.sign_in(credentials).await {
            tracing::error!(error = %e, "Sign-in failed");
            self.close_portal().await;
            return Err(BillsError::Session(e.to_string()));
        }

        let report = self.run(orgs, period).await;
        self.close_portal().await;
        Ok(report)
    }

    /// Process every organization exactly once, in order
    ///
    /// Returns one outcome per record regardless of individual failures.
    pub async fn run(&mut self, orgs: &[OrganizationRecord], period: BillingPeriod) -> RunReport {
        let mut report = RunReport::new(period);
        let mut state = RunState::default();
        let total = orgs.len();

        for (index, org) in orgs.iter().enumerate() {
            let span = tracing::info_span!("cycle", org_id = %org.id, n = index + 1, total);
            let outcome = self
                .run_cycle(org, period, &mut state)
                .instrument(span)
                .await;
            report.push(outcome);
        }

        tracing::info!(
            succeeded = report.succeeded(),
            timed_out = report.timed_out(),
            failed = report.failed(),
            "Run finished"
        );
        report
    }

    async fn run_cycle(
        &mut self,
        org: &OrganizationRecord,
        period: BillingPeriod,
        state: &mut RunState,
    ) -> DownloadOutcome {
        let dir = self.config.bills_dir.clone();

        let mut before = match DirectorySnapshot::capture(&dir).await {
            Ok(snapshot) => snapshot,
            Err(e) => return self.record(io_failure(org, "listing download directory", &e)),
        };
        before.extend(state.unclaimed.iter().cloned());

        if let Err(e) = self.portal.open_organization(&org.id).await {
            return self.record(collaborator_failure(org, "opening organization", &e));
        }
        if let Err(e) = self.portal.wait_for_first_bill().await {
            return self.record(collaborator_failure(org, "waiting for billing table", &e));
        }
        if let Err(e) = self.portal.download_first_bill().await {
            return self.record(collaborator_failure(org, "clicking export", &e));
        }

        let source = match self
            .detector
            .await_new_file(&dir, &before, self.config.download_timeout)
            .await
        {
            Ok(name) => name,
            Err(e @ DetectError::TimedOut { .. }) => {
                let message = self.watch_late_download(&dir, &before, e, state).await;
                return self.record(DownloadOutcome::timed_out(&org.id, message));
            }
            Err(DetectError::Io(e)) => {
                return self.record(io_failure(org, "watching download directory", &e));
            }
        };

        let destination = destination_filename(&period, &org.display_name);
        if let Some(previous) = state.produced.get(&destination) {
            tracing::warn!(
                file = %destination,
                previous_org = %previous,
                "Destination already written in this run, overwriting"
            );
        }

        if let Err(e) = commit(&dir, &source, &destination).await {
            let outcome = io_failure(org, "renaming download", &e).with_source(&source);
            return self.record(outcome);
        }
        state.produced.insert(destination.clone(), org.id.clone());

        self.record(DownloadOutcome::succeeded(&org.id, source, destination))
    }

    /// Give a timed-out export its grace period; returns the outcome message
    async fn watch_late_download(
        &self,
        dir: &Path,
        before: &DirectorySnapshot,
        timeout: DetectError,
        state: &mut RunState,
    ) -> String {
        let mut message = timeout.to_string();

        let late = match self
            .detector
            .await_late_download(dir, before, self.config.late_download_grace)
            .await
        {
            Ok(late) => late,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot watch for a late download");
                return message;
            }
        };

        if !late.arrived.is_empty() {
            tracing::warn!(files = ?late.arrived, "Download arrived after the timeout, left unrenamed");
            message.push_str(&format!(
                "; arrived late and left unrenamed: {}",
                late.arrived.join(", ")
            ));
        }
        if !late.pending.is_empty() {
            tracing::warn!(files = ?late.pending, "Download still in progress, ignored by later cycles");
            message.push_str(&format!("; still downloading: {}", late.pending.join(", ")));
            state.unclaimed.extend(late.pending);
        }
        message
    }

    fn record(&self, outcome: DownloadOutcome) -> DownloadOutcome {
        match (&outcome.status, &outcome.failure) {
            (OutcomeStatus::Succeeded, _) => tracing::info!(
                source = outcome.source_filename.as_deref().unwrap_or_default(),
                destination = outcome.destination_filename.as_deref().unwrap_or_default(),
                "Bill saved"
            ),
            (_, Some(failure)) => tracing::warn!(
                kind = %failure.kind,
                "Bill not downloaded: {}",
                failure.message
            ),
            (status, None) => tracing::warn!(%status, "Bill not downloaded"),
        }
        outcome
    }

    async fn close_portal(&mut self) {
        if let Err(e) = self.portal.close().await {
            tracing::warn!(error = %e, "Failed to close browser session");
        }
    }
}

/// Move `source` to `destination` inside `dir`
///
/// A same-directory rename is atomic; an existing destination is replaced.
async fn commit(dir: &Path, source: &str, destination: &str) -> std::io::Result<()> {
    tokio::fs::rename(dir.join(source), dir.join(destination)).await
}

fn collaborator_failure(
    org: &OrganizationRecord,
    step: &str,
    err: &dyn std::fmt::Display,
) -> DownloadOutcome {
    DownloadOutcome::failed(
        &org.id,
        FailureKind::Collaborator,
        format!("{}: {}", step, err),
    )
}

fn io_failure(org: &OrganizationRecord, step: &str, err: &std::io::Error) -> DownloadOutcome {
    DownloadOutcome::failed(&org.id, FailureKind::Io, format!("{}: {}", step, err))
}
