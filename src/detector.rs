//! Download completion detection
//!
//! The billing application gives no signal when an export finishes. The
//! only observable effect is a new `.pdf` appearing in the download
//! directory, so completion is inferred by diffing directory listings
//! against a snapshot taken before the export was triggered.
//!
//! Detection returns on the first new name. It does not wait for the file
//! size to settle; Chrome writes to a `.crdownload` temporary and renames
//! it to `.pdf` only once the transfer is done, which is what makes the
//! first difference usable.
//!
//! An export that misses its timeout may still land later. After a timeout
//! [`CompletionDetector::await_late_download`] keeps watching for a short
//! grace period so the late file is attributed to the right cycle instead of
//! being picked up by the next one.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};

/// Default interval between directory listings
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default time to wait for the export to land
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Default time to keep watching after a timed-out export
pub const DEFAULT_LATE_DOWNLOAD_GRACE: Duration = Duration::from_secs(10);

/// Suffix Chrome gives a download until it is complete
pub const PARTIAL_DOWNLOAD_SUFFIX: &str = ".crdownload";

/// Errors from waiting on a new file
#[derive(Error, Debug)]
pub enum DetectError {
    #[error("no new PDF appeared within {}s", .waited.as_secs_f64())]
    TimedOut { waited: Duration },

    #[error("cannot read download directory: {0}")]
    Io(#[from] std::io::Error),
}

/// PDF file names present in a directory at one point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectorySnapshot {
    names: BTreeSet<String>,
}

impl DirectorySnapshot {
    /// List `dir`, keeping file names ending in `.pdf` (any case)
    pub async fn capture(dir: &Path) -> std::io::Result<Self> {
        let names = list_names(dir).await?;
        Ok(Self::from_listing(&names))
    }

    fn from_listing(names: &[String]) -> Self {
        Self {
            names: names.iter().filter(|n| is_pdf(n)).cloned().collect(),
        }
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Names in `self` that were not in `before`
    pub fn new_since<'a>(&'a self, before: &'a DirectorySnapshot) -> impl Iterator<Item = &'a str> {
        self.names.difference(&before.names).map(String::as_str)
    }

    /// Treat `names` as already present, so they are never reported as new
    pub fn extend<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names.extend(names.into_iter().map(Into::into));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

fn is_pdf(name: &str) -> bool {
    name.to_lowercase().ends_with(".pdf")
}

async fn list_names(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        if let Ok(name) = entry.file_name().into_string() {
            names.push(name);
        }
    }
    Ok(names)
}

/// Files a timed-out export produced while the detector kept watching
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LateDownloads {
    /// PDFs that appeared after the timeout
    pub arrived: Vec<String>,

    /// PDF names of downloads still being written when the grace period ended
    pub pending: Vec<String>,
}

impl LateDownloads {
    pub fn is_empty(&self) -> bool {
        self.arrived.is_empty() && self.pending.is_empty()
    }
}

/// Polls a directory until a file not in the "before" snapshot shows up
#[derive(Debug, Clone)]
pub struct CompletionDetector {
    poll_interval: Duration,
}

impl Default for CompletionDetector {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl CompletionDetector {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    /// Wait for a PDF in `dir` that is absent from `before`
    ///
    /// The directory is listed immediately and then once per poll interval
    /// until `timeout` has elapsed. The first new name seen is returned; if
    /// several appear in the same listing, the lexicographically smallest
    /// wins. Files already in `before` are never returned, even if they are
    /// rewritten while waiting.
    pub async fn await_new_file(
        &self,
        dir: &Path,
        before: &DirectorySnapshot,
        timeout: Duration,
    ) -> Result<String, DetectError> {
        let started = Instant::now();
        let deadline = started + timeout;

        loop {
            let current = DirectorySnapshot::capture(dir).await?;
            if let Some(name) = current.new_since(before).next() {
                tracing::debug!(
                    file = name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "New download detected"
                );
                return Ok(name.to_string());
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(DetectError::TimedOut {
                    waited: now - started,
                });
            }

            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    /// Keep watching `dir` after [`Self::await_new_file`] timed out
    ///
    /// Returns once a late PDF has arrived and no partial download is left,
    /// or when `grace` has elapsed. Partial downloads still open at that
    /// point are reported by the PDF name they will get, so later cycles can
    /// ignore them.
    pub async fn await_late_download(
        &self,
        dir: &Path,
        before: &DirectorySnapshot,
        grace: Duration,
    ) -> Result<LateDownloads, DetectError> {
        let deadline = Instant::now() + grace;

        loop {
            let listing = list_names(dir).await?;
            let current = DirectorySnapshot::from_listing(&listing);
            let partial: Vec<&str> = listing
                .iter()
                .filter_map(|n| n.strip_suffix(PARTIAL_DOWNLOAD_SUFFIX))
                .collect();
            let arrived: Vec<String> = current.new_since(before).map(str::to_string).collect();

            let now = Instant::now();
            if (!arrived.is_empty() && partial.is_empty()) || now >= deadline {
                // Chrome's `Unconfirmed NNN.crdownload` names carry no target
                let pending = partial
                    .into_iter()
                    .filter(|n| is_pdf(n) && !current.contains(n))
                    .map(str::to_string)
                    .collect();
                return Ok(LateDownloads { arrived, pending });
            }

            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}
