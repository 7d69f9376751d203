//! Integration tests for billpull
//!
//! These tests drive the full workflow from input discovery through the
//! orchestrator, with a scripted portal standing in for the browser.

use async_trait::async_trait;
use billpull::config::Credentials;
use billpull::detector::CompletionDetector;
use billpull::orchestrator::{Orchestrator, OrchestratorConfig};
use billpull::organizations::{discover_bills_csv, load_organizations, OrganizationRecord};
use billpull::period::BillingPeriod;
use billpull::portal::{BillingPortal, PortalError};
use billpull::report::{FailureKind, OutcomeStatus};
use billpull::BillsError;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// What the fake billing application does for one organization
#[derive(Debug, Clone, Copy)]
enum Script {
    /// Export writes a PDF
    Download,
    /// Export writes its PDF only after this many milliseconds
    DownloadAfter(u64),
    /// Export leaves a partial download that completes after this many milliseconds
    Stalled(u64),
    /// Export click succeeds but no file ever appears
    NoFile,
    /// Organization page cannot be opened
    NavigationFails,
    /// Billing table never renders
    TableMissing,
}

struct ScriptedPortal {
    dir: PathBuf,
    scripts: HashMap<String, Script>,
    current: Option<String>,
    sign_in_ok: bool,
    opened: Vec<String>,
    closed: bool,
}

impl ScriptedPortal {
    fn new(dir: &Path, scripts: &[(&str, Script)]) -> Self {
        Self {
            dir: dir.to_path_buf(),
            scripts: scripts
                .iter()
                .map(|(id, s)| (id.to_string(), *s))
                .collect(),
            current: None,
            sign_in_ok: true,
            opened: Vec::new(),
            closed: false,
        }
    }

    fn script(&self) -> Script {
        self.current
            .as_ref()
            .and_then(|id| self.scripts.get(id).copied())
            .unwrap_or(Script::Download)
    }
}

#[async_trait]
impl BillingPortal for ScriptedPortal {
    async fn sign_in(&mut self, _credentials: &Credentials) -> Result<(), PortalError> {
        if self.sign_in_ok {
            Ok(())
        } else {
            Err(PortalError::SignIn("invalid password".to_string()))
        }
    }

    async fn open_organization(&mut self, org_id: &str) -> Result<(), PortalError> {
        self.opened.push(org_id.to_string());
        self.current = Some(org_id.to_string());
        match self.script() {
            Script::NavigationFails => Err(PortalError::Timeout {
                what: "organization page".to_string(),
                waited: Duration::from_secs(20),
            }),
            _ => Ok(()),
        }
    }

    async fn wait_for_first_bill(&mut self) -> Result<(), PortalError> {
        match self.script() {
            Script::TableMissing => Err(PortalError::Timeout {
                what: "first billing row".to_string(),
                waited: Duration::from_secs(20),
            }),
            _ => Ok(()),
        }
    }

    async fn download_first_bill(&mut self) -> Result<(), PortalError> {
        let dir = self.dir.clone();
        let name = format!("usage-{}.pdf", self.current.clone().unwrap_or_default());

        match self.script() {
            // Land the file a little after the click, like a real export
            Script::Download => land_after(dir, name, 20),
            Script::DownloadAfter(ms) => land_after(dir, name, ms),
            Script::Stalled(ms) => {
                let partial = dir.join(format!("{}.crdownload", name));
                fs::write(&partial, b"%PDF-1").unwrap();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    tokio::fs::rename(partial, dir.join(name)).await.unwrap();
                });
            }
            _ => {}
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), PortalError> {
        self.closed = true;
        Ok(())
    }
}

fn land_after(dir: PathBuf, name: String, ms: u64) {
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        tokio::fs::write(dir.join(name), b"%PDF-1.7").await.unwrap();
    });
}

fn orchestrator(portal: ScriptedPortal, dir: &Path) -> Orchestrator<ScriptedPortal> {
    orchestrator_with(
        portal,
        OrchestratorConfig::new(dir)
            .with_download_timeout(Duration::from_millis(300))
            .with_late_download_grace(Duration::from_millis(50)),
    )
}

fn orchestrator_with(
    portal: ScriptedPortal,
    config: OrchestratorConfig,
) -> Orchestrator<ScriptedPortal> {
    Orchestrator::new(portal, CompletionDetector::new(Duration::from_millis(5)), config)
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut files: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    files.sort();
    files
}

fn write_bills_csv(workdir: &Path, name: &str, rows: &[(&str, &str, &str)]) {
    let mut content = String::from("\u{feff}id,name,subscription_type,plan_note\n");
    for (id, org_name, kind) in rows {
        content.push_str(&format!("{},{},{},\n", id, org_name, kind));
    }
    fs::write(workdir.join(name), content).unwrap();
}

mod input_tests {
    use super::*;

    #[test]
    fn test_only_usage_based_rows_are_loaded() {
        let workdir = TempDir::new().unwrap();
        write_bills_csv(
            workdir.path(),
            "2025-03-bills.csv",
            &[
                ("org-1", "Acme", "usage_based"),
                ("org-2", "Globex", "flat_rate"),
                ("org-3", "Initech", "usage_based"),
            ],
        );

        let (path, period) = discover_bills_csv(workdir.path()).unwrap();
        let orgs = load_organizations(&path).unwrap();

        assert_eq!(period, BillingPeriod::new(2025, 3).unwrap());
        assert_eq!(
            orgs,
            vec![
                OrganizationRecord::new("org-1", "Acme"),
                OrganizationRecord::new("org-3", "Initech"),
            ]
        );
    }

    #[test]
    fn test_missing_or_duplicate_input_is_config_error() {
        let workdir = TempDir::new().unwrap();
        assert!(matches!(
            discover_bills_csv(workdir.path()),
            Err(BillsError::Config(_))
        ));

        write_bills_csv(workdir.path(), "2025-03-bills.csv", &[("a", "A", "usage_based")]);
        write_bills_csv(workdir.path(), "2025-02-bills.csv", &[("a", "A", "usage_based")]);
        assert!(matches!(
            discover_bills_csv(workdir.path()),
            Err(BillsError::Config(_))
        ));
    }
}

mod orchestration_tests {
    use super::*;

    #[tokio::test]
    async fn test_one_outcome_per_org_in_order() {
        let bills = TempDir::new().unwrap();
        let portal = ScriptedPortal::new(
            bills.path(),
            &[
                ("org-2", Script::NoFile),
                ("org-3", Script::NavigationFails),
                ("org-4", Script::TableMissing),
            ],
        );
        let orgs: Vec<_> = (1..=5)
            .map(|n| OrganizationRecord::new(format!("org-{}", n), format!("Org {}", n)))
            .collect();

        let mut orch = orchestrator(portal, bills.path());
        let report = orch.run(&orgs, BillingPeriod::new(2025, 3).unwrap()).await;

        let ids: Vec<_> = report
            .outcomes
            .iter()
            .map(|o| o.organization_id.as_str())
            .collect();
        assert_eq!(ids, vec!["org-1", "org-2", "org-3", "org-4", "org-5"]);

        let statuses: Vec<_> = report.outcomes.iter().map(|o| o.status).collect();
        assert_eq!(
            statuses,
            vec![
                OutcomeStatus::Succeeded,
                OutcomeStatus::TimedOut,
                OutcomeStatus::Failed,
                OutcomeStatus::Failed,
                OutcomeStatus::Succeeded,
            ]
        );
        assert_eq!(
            report.outcomes[2].failure.as_ref().unwrap().kind,
            FailureKind::Collaborator
        );

        // Every organization was visited even after failures
        assert_eq!(orch.portal().opened.len(), 5);
    }

    #[tokio::test]
    async fn test_timeout_does_not_leak_into_next_cycle() {
        let bills = TempDir::new().unwrap();
        let portal = ScriptedPortal::new(bills.path(), &[("slow", Script::NoFile)]);
        let orgs = vec![
            OrganizationRecord::new("slow", "Slow Co"),
            OrganizationRecord::new("fast", "Fast Co"),
        ];

        let mut orch = orchestrator(portal, bills.path());
        let report = orch.run(&orgs, BillingPeriod::new(2025, 3).unwrap()).await;

        assert_eq!(report.timed_out(), 1);
        assert_eq!(report.succeeded(), 1);
        assert_eq!(
            report.outcomes[1].source_filename.as_deref(),
            Some("usage-fast.pdf")
        );

        assert_eq!(
            file_names(bills.path()),
            vec!["25.03 ZENICOG 이용 요금 청구서_Fast Co.pdf"]
        );
    }

    #[tokio::test]
    async fn test_late_download_stays_with_its_organization() {
        let bills = TempDir::new().unwrap();
        let portal = ScriptedPortal::new(bills.path(), &[("late", Script::DownloadAfter(200))]);
        let orgs = vec![
            OrganizationRecord::new("late", "Late Co"),
            OrganizationRecord::new("next", "Next Co"),
        ];

        let mut orch = orchestrator_with(
            portal,
            OrchestratorConfig::new(bills.path())
                .with_download_timeout(Duration::from_millis(100))
                .with_late_download_grace(Duration::from_secs(2)),
        );
        let report = orch.run(&orgs, BillingPeriod::new(2025, 3).unwrap()).await;

        assert_eq!(report.outcomes[0].status, OutcomeStatus::TimedOut);
        let message = &report.outcomes[0].failure.as_ref().unwrap().message;
        assert!(message.contains("usage-late.pdf"));

        assert_eq!(report.outcomes[1].status, OutcomeStatus::Succeeded);
        assert_eq!(
            report.outcomes[1].source_filename.as_deref(),
            Some("usage-next.pdf")
        );
        assert_eq!(
            file_names(bills.path()),
            vec!["25.03 ZENICOG 이용 요금 청구서_Next Co.pdf", "usage-late.pdf"]
        );
    }

    #[tokio::test]
    async fn test_unfinished_download_is_ignored_by_later_cycles() {
        let bills = TempDir::new().unwrap();
        // `stalled` finishes ~300 ms into the next cycle, before `next` writes its own file
        let portal = ScriptedPortal::new(
            bills.path(),
            &[
                ("stalled", Script::Stalled(1400)),
                ("next", Script::DownloadAfter(700)),
            ],
        );
        let orgs = vec![
            OrganizationRecord::new("stalled", "Stalled Co"),
            OrganizationRecord::new("next", "Next Co"),
        ];

        let mut orch = orchestrator_with(
            portal,
            OrchestratorConfig::new(bills.path())
                .with_download_timeout(Duration::from_millis(1000))
                .with_late_download_grace(Duration::from_millis(100)),
        );
        let report = orch.run(&orgs, BillingPeriod::new(2025, 3).unwrap()).await;

        assert_eq!(report.outcomes[0].status, OutcomeStatus::TimedOut);
        assert!(report.outcomes[0]
            .failure
            .as_ref()
            .unwrap()
            .message
            .contains("still downloading: usage-stalled.pdf"));
        assert_eq!(
            report.outcomes[1].source_filename.as_deref(),
            Some("usage-next.pdf")
        );
        assert!(bills.path().join("usage-stalled.pdf").exists());
    }

    #[tokio::test]
    async fn test_existing_pdfs_are_left_alone() {
        let bills = TempDir::new().unwrap();
        fs::write(bills.path().join("last-month.pdf"), b"%PDF").unwrap();
        let portal = ScriptedPortal::new(bills.path(), &[]);
        let orgs = vec![OrganizationRecord::new("org-1", "Acme")];

        let mut orch = orchestrator(portal, bills.path());
        let report = orch.run(&orgs, BillingPeriod::new(2025, 3).unwrap()).await;

        assert_eq!(
            report.outcomes[0].source_filename.as_deref(),
            Some("usage-org-1.pdf")
        );
        assert!(bills.path().join("last-month.pdf").exists());
    }

    #[tokio::test]
    async fn test_sign_in_failure_is_fatal() {
        let bills = TempDir::new().unwrap();
        let mut portal = ScriptedPortal::new(bills.path(), &[]);
        portal.sign_in_ok = false;
        let orgs = vec![OrganizationRecord::new("org-1", "Acme")];

        let mut orch = orchestrator(portal, bills.path());
        let result = orch
            .run_with_session(
                &Credentials::new("ops", "wrong"),
                &orgs,
                BillingPeriod::new(2025, 3).unwrap(),
            )
            .await;

        assert!(matches!(result, Err(BillsError::Session(_))));
        let portal = orch.into_portal();
        assert!(portal.opened.is_empty());
        assert!(portal.closed);
    }
}
