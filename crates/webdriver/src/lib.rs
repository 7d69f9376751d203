//! Minimal W3C WebDriver client
//!
//! A small, typed interface to a WebDriver endpoint such as chromedriver.
//! Only the handful of commands needed to sign in to a web application,
//! navigate, locate elements and click them are covered.
//!
//! # Example
//!
//! ```no_run
//! use webdriver::{Capabilities, Client, Locator};
//!
//! # async fn demo() -> webdriver::Result<()> {
//! let caps = Capabilities::chrome().download_dir("/tmp/downloads");
//! let client = Client::new_session("http://localhost:9515", &caps).await?;
//!
//! client.goto("https://example.com/login").await?;
//! let button = client.find(&Locator::css("button")).await?;
//! client.click(&button).await?;
//!
//! client.delete_session().await?;
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Key under which W3C endpoints return element references
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Errors that can occur when talking to a WebDriver endpoint
#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebDriver error ({error}): {message}")]
    WebDriver { error: String, message: String },

    #[error("Malformed WebDriver response: {0}")]
    Protocol(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// The W3C error code, if the endpoint reported one
    pub fn code(&self) -> Option<&str> {
        match self {
            Error::WebDriver { error, .. } => Some(error.as_str()),
            _ => None,
        }
    }

    pub fn is_no_such_element(&self) -> bool {
        self.code() == Some("no such element")
    }

    /// Errors that usually clear up once the page finishes rendering
    pub fn is_transient_ui(&self) -> bool {
        matches!(
            self.code(),
            Some("no such element")
                | Some("stale element reference")
                | Some("element not interactable")
                | Some("element click intercepted")
        )
    }

    /// True when the endpoint could not be reached at all
    pub fn is_connect(&self) -> bool {
        matches!(self, Error::Http(e) if e.is_connect() || e.is_timeout())
    }
}

/// Result type for WebDriver operations
pub type Result<T> = std::result::Result<T, Error>;

/// Element location strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Locator {
    using: &'static str,
    value: String,
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Self {
            using: "css selector",
            value: selector.into(),
        }
    }

    pub fn xpath(expr: impl Into<String>) -> Self {
        Self {
            using: "xpath",
            value: expr.into(),
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.using, self.value)
    }
}

/// Reference to an element in the current session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    id: String,
}

impl Element {
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Session capabilities sent with `POST /session`
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    browser_name: String,
    args: Vec<String>,
    prefs: serde_json::Map<String, Value>,
}

impl Capabilities {
    pub fn chrome() -> Self {
        Self {
            browser_name: "chrome".to_string(),
            ..Default::default()
        }
    }

    /// Send downloads to `dir` without prompting
    pub fn download_dir(mut self, dir: impl AsRef<str>) -> Self {
        self.prefs.insert(
            "download.default_directory".to_string(),
            Value::String(dir.as_ref().to_string()),
        );
        self.prefs
            .insert("download.prompt_for_download".to_string(), Value::Bool(false));
        self.prefs
            .insert("download.directory_upgrade".to_string(), Value::Bool(true));
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn to_json(&self) -> Value {
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": self.browser_name,
                    "goog:chromeOptions": {
                        "args": self.args,
                        "prefs": self.prefs,
                    }
                }
            }
        })
    }
}

#[derive(Debug, Deserialize)]
struct ErrorValue {
    error: String,
    #[serde(default)]
    message: String,
}

/// Decode a WebDriver response body into its `value` member
///
/// Error responses carry `{"value": {"error": ..., "message": ...}}` and a
/// non-2xx status.
pub fn decode_response(success: bool, body: &str) -> Result<Value> {
    let mut parsed: Value = serde_json::from_str(body)?;
    let value = parsed
        .get_mut("value")
        .map(Value::take)
        .ok_or_else(|| Error::Protocol(format!("missing `value` in response: {}", body)))?;

    if success {
        return Ok(value);
    }

    match serde_json::from_value::<ErrorValue>(value) {
        Ok(err) => Err(Error::WebDriver {
            error: err.error,
            message: err.message,
        }),
        Err(_) => Err(Error::Protocol(format!("unrecognised error response: {}", body))),
    }
}

fn element_from_value(value: &Value) -> Result<Element> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(|id| Element { id: id.to_string() })
        .ok_or_else(|| Error::Protocol(format!("expected element reference, got {}", value)))
}

/// An open WebDriver session
#[derive(Debug)]
pub struct Client {
    http: reqwest::Client,
    endpoint: String,
    session_id: String,
}

impl Client {
    /// Start a new browser session at `endpoint` (e.g. `http://localhost:9515`)
    pub async fn new_session(endpoint: &str, caps: &Capabilities) -> Result<Self> {
        let http = reqwest::Client::new();
        let endpoint = endpoint.trim_end_matches('/').to_string();

        let response = http
            .post(format!("{}/session", endpoint))
            .json(&caps.to_json())
            .send()
            .await?;
        let success = response.status().is_success();
        let body = response.text().await?;
        let value = decode_response(success, &body)?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Protocol("new session response has no sessionId".to_string()))?
            .to_string();

        tracing::debug!(session = %session_id, "WebDriver session started");

        Ok(Self {
            http,
            endpoint,
            session_id,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}/session/{}{}", self.endpoint, self.session_id, path)
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value> {
        let response = self.http.post(self.url(path)).json(&body).send().await?;
        let success = response.status().is_success();
        let text = response.text().await?;
        decode_response(success, &text)
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let response = self.http.get(self.url(path)).send().await?;
        let success = response.status().is_success();
        let text = response.text().await?;
        decode_response(success, &text)
    }

    /// Navigate the current window to `url`
    pub async fn goto(&self, url: &str) -> Result<()> {
        self.post("/url", json!({ "url": url })).await?;
        Ok(())
    }

    pub async fn current_url(&self) -> Result<String> {
        let value = self.get("/url").await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::Protocol(format!("expected URL string, got {}", value)))
    }

    /// Find the first element matching `locator`
    pub async fn find(&self, locator: &Locator) -> Result<Element> {
        let value = self.post("/element", serde_json::to_value(locator)?).await?;
        element_from_value(&value)
    }

    pub async fn click(&self, element: &Element) -> Result<()> {
        self.post(&format!("/element/{}/click", element.id), json!({}))
            .await?;
        Ok(())
    }

    pub async fn send_keys(&self, element: &Element, text: &str) -> Result<()> {
        self.post(
            &format!("/element/{}/value", element.id),
            json!({ "text": text }),
        )
        .await?;
        Ok(())
    }

    /// Run a synchronous script in the page
    pub async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value> {
        self.post("/execute/sync", json!({ "script": script, "args": args }))
            .await
    }

    /// End the session and close the browser
    pub async fn delete_session(&self) -> Result<()> {
        let response = self
            .http
            .delete(format!("{}/session/{}", self.endpoint, self.session_id))
            .send()
            .await?;
        let success = response.status().is_success();
        let text = response.text().await?;
        decode_response(success, &text)?;
        tracing::debug!(session = %self.session_id, "WebDriver session closed");
        Ok(())
    }
}
