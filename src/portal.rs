//! Billing portal automation
//!
//! [`BillingPortal`] is the boundary between the batch orchestrator and the
//! browser. The orchestrator only needs four blocking steps: sign in, open
//! an organization, wait for its first bill row, and click that row's export
//! icon. [`WebDriverPortal`] performs them through chromedriver.

use crate::config::Credentials;
use crate::retry::{with_retry, RetryConfig};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use webdriver::{Capabilities, Client, Element, Locator};

/// Default time to wait for a page element
pub const DEFAULT_ELEMENT_TIMEOUT: Duration = Duration::from_secs(20);

/// Interval between element lookups while waiting
const ELEMENT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Row-number cell of the first bill in the billing table
const FIRST_BILL_ROW: &str =
    "//div[contains(@class,'sc-6a03363a-3') and normalize-space(text())='1']";

/// Export icon inside the first bill row
const FIRST_BILL_EXPORT_ICON: &str =
    "//div[contains(@class,'sc-6a03363a-3') and normalize-space(text())='1']\
     /ancestor::div[contains(@class,'sc-6a03363a-1')]\
     //div[contains(@class,'dedrnh')]/img";

/// Errors raised by portal steps
#[derive(Error, Debug)]
pub enum PortalError {
    #[error("timed out after {}s waiting for {what}", .waited.as_secs())]
    Timeout { what: String, waited: Duration },

    #[error("sign-in failed: {0}")]
    SignIn(String),

    #[error("browser setup failed: {0}")]
    Setup(String),

    #[error("browser error: {0}")]
    Driver(#[from] webdriver::Error),
}

/// Steps the orchestrator drives in the remote billing application
#[async_trait]
pub trait BillingPortal: Send {
    /// Authenticate the shared browser session
    async fn sign_in(&mut self, credentials: &Credentials) -> Result<(), PortalError>;

    /// Navigate to the billing page of organization `org_id`
    async fn open_organization(&mut self, org_id: &str) -> Result<(), PortalError>;

    /// Block until the first billing row is present
    async fn wait_for_first_bill(&mut self) -> Result<(), PortalError>;

    /// Click the export icon of the first billing row
    ///
    /// Success only means the click happened; whether a file is produced is
    /// observed separately.
    async fn download_first_bill(&mut self) -> Result<(), PortalError>;

    /// Release the browser session
    async fn close(&mut self) -> Result<(), PortalError>;
}

/// Settings for [`WebDriverPortal`]
#[derive(Debug, Clone)]
pub struct PortalConfig {
    /// Root URL of the billing application, without trailing slash
    pub base_url: String,

    /// chromedriver endpoint
    pub webdriver_url: String,

    /// Run Chrome without a window
    pub headless: bool,

    pub element_timeout: Duration,
}

/// [`BillingPortal`] backed by a W3C WebDriver session
#[derive(Debug)]
pub struct WebDriverPortal {
    client: Client,
    config: PortalConfig,
}

impl WebDriverPortal {
    /// Open a Chrome session that saves downloads into `download_dir`
    pub async fn connect(config: PortalConfig, download_dir: &Path) -> Result<Self, PortalError> {
        let download_dir = download_dir.to_str().ok_or_else(|| {
            PortalError::Setup(format!(
                "download directory is not valid UTF-8: {}",
                download_dir.display()
            ))
        })?;

        let mut caps = Capabilities::chrome().download_dir(download_dir);
        if config.headless {
            caps = caps.arg("--headless=new");
        }

        let endpoint = config.webdriver_url.clone();
        let client = with_retry(&RetryConfig::default(), "webdriver_new_session", || {
            Client::new_session(&endpoint, &caps)
        })
        .await?;

        tracing::info!(webdriver = %config.webdriver_url, "Browser session opened");
        Ok(Self { client, config })
    }

    /// Poll for `locator` until it is found or the element timeout passes
    async fn wait_for(&self, locator: &Locator, what: &str) -> Result<Element, PortalError> {
        let started = Instant::now();
        let deadline = started + self.config.element_timeout;

        loop {
            match self.client.find(locator).await {
                Ok(element) => return Ok(element),
                Err(e) if e.is_no_such_element() => {}
                Err(e) => return Err(e.into()),
            }

            if Instant::now() >= deadline {
                return Err(PortalError::Timeout {
                    what: what.to_string(),
                    waited: started.elapsed(),
                });
            }
            sleep(ELEMENT_POLL_INTERVAL).await;
        }
    }

    /// Click `locator` once it is present and accepts the click
    async fn click_when_ready(&self, locator: &Locator, what: &str) -> Result<(), PortalError> {
        let started = Instant::now();
        let deadline = started + self.config.element_timeout;

        loop {
            let attempt = match self.client.find(locator).await {
                Ok(element) => self.client.click(&element).await,
                Err(e) => Err(e),
            };

            match attempt {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient_ui() => {
                    tracing::trace!(what, error = %e, "Element not clickable yet");
                }
                Err(e) => return Err(e.into()),
            }

            if Instant::now() >= deadline {
                return Err(PortalError::Timeout {
                    what: what.to_string(),
                    waited: started.elapsed(),
                });
            }
            sleep(ELEMENT_POLL_INTERVAL).await;
        }
    }

    async fn wait_for_url_containing(&self, fragment: &str) -> Result<(), PortalError> {
        let started = Instant::now();
        let deadline = started + self.config.element_timeout;

        loop {
            if self.client.current_url().await?.contains(fragment) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(PortalError::Timeout {
                    what: format!("URL containing `{}`", fragment),
                    waited: started.elapsed(),
                });
            }
            sleep(ELEMENT_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl BillingPortal for WebDriverPortal {
    async fn sign_in(&mut self, credentials: &Credentials) -> Result<(), PortalError> {
        self.client
            .goto(&login_url(&self.config.base_url))
            .await?;

        let user = self
            .wait_for(&Locator::css("input[type='text']"), "login form")
            .await?;
        self.client.send_keys(&user, &credentials.user_id).await?;

        let password = self.client.find(&Locator::css("input[type='password']")).await?;
        self.client
            .send_keys(&password, credentials.password())
            .await?;

        let submit = self.client.find(&Locator::css("button")).await?;
        self.client.click(&submit).await?;

        self.wait_for_url_containing("/organization/")
            .await
            .map_err(|e| match e {
                PortalError::Timeout { .. } => PortalError::SignIn(
                    "still on the login page after submitting credentials".to_string(),
                ),
                other => other,
            })?;

        tracing::info!(user = %credentials.user_id, "Signed in");
        Ok(())
    }

    async fn open_organization(&mut self, org_id: &str) -> Result<(), PortalError> {
        let url = organization_url(&self.config.base_url, org_id);
        tracing::debug!(org_id, %url, "Opening organization");
        self.client.goto(&url).await?;
        Ok(())
    }

    async fn wait_for_first_bill(&mut self) -> Result<(), PortalError> {
        self.wait_for(&Locator::xpath(FIRST_BILL_ROW), "first billing row")
            .await?;
        // The export icons render lazily below the fold
        self.client
            .execute("window.scrollTo(0, document.body.scrollHeight);", vec![])
            .await?;
        Ok(())
    }

    async fn download_first_bill(&mut self) -> Result<(), PortalError> {
        self.click_when_ready(&Locator::xpath(FIRST_BILL_EXPORT_ICON), "export icon")
            .await
    }

    async fn close(&mut self) -> Result<(), PortalError> {
        self.client.delete_session().await?;
        Ok(())
    }
}

fn login_url(base_url: &str) -> String {
    format!("{}/login", base_url.trim_end_matches('/'))
}

fn organization_url(base_url: &str, org_id: &str) -> String {
    format!(
        "{}/organization/{}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(org_id)
    )
}
