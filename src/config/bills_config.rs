//! Credentials file handling
//!
//! `config.ini` is a flat key-value file with a single unnamed section.
//! Only the handful of keys below are understood; anything else is ignored
//! with a debug log line.

use crate::{BillsError, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// File name looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "config.ini";

/// Billing application used when `BASE_URL` is not set
pub const DEFAULT_BASE_URL: &str = "https://stage.d3l8lrlzxpuhlm.amplifyapp.com";

/// chromedriver's default listen address
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";

const KEY_USER_ID: &str = "USER_ID";
const KEY_USER_PW: &str = "USER_PW";
const KEY_BASE_URL: &str = "BASE_URL";
const KEY_WEBDRIVER_URL: &str = "WEBDRIVER_URL";

/// Account used to sign in to the billing application
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user_id: String,
    password: String,
}

impl Credentials {
    pub fn new(user_id: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user_id", &self.user_id)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Contents of `config.ini`
#[derive(Debug, Clone)]
pub struct BillsConfig {
    pub credentials: Credentials,
    pub base_url: String,
    pub webdriver_url: String,
}

impl BillsConfig {
    /// Path of the config file inside `workdir`
    pub fn default_path(workdir: &Path) -> PathBuf {
        workdir.join(CONFIG_FILE_NAME)
    }

    /// Load configuration from a specific path
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(BillsError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        tracing::info!(path = %path.display(), "Loading configuration");

        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse config file text
    pub fn parse(content: &str) -> Result<Self> {
        let mut values = parse_ini(content)?;

        let mut required = |key: &str| {
            values
                .remove(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| BillsError::Config(format!("`{}` is missing from {}", key, CONFIG_FILE_NAME)))
        };
        let user_id = required(KEY_USER_ID)?;
        let password = required(KEY_USER_PW)?;

        let base_url = values
            .remove(KEY_BASE_URL)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let webdriver_url = values
            .remove(KEY_WEBDRIVER_URL)
            .unwrap_or_else(|| DEFAULT_WEBDRIVER_URL.to_string());

        for key in values.keys() {
            tracing::debug!(key = %key, "Ignoring unknown config key");
        }

        Ok(Self {
            credentials: Credentials::new(user_id, password),
            base_url,
            webdriver_url,
        })
    }
}

/// Read `KEY = value` pairs from the unnamed section
///
/// Keys are case-insensitive (stored uppercase). `#` and `;` start comment
/// lines; a `;` or `#` preceded by whitespace starts an inline comment.
/// Any named section other than `[DEFAULT]` is a configuration error, since
/// its keys would otherwise be silently dropped.
fn parse_ini(content: &str) -> Result<HashMap<String, String>> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut values = HashMap::new();

    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            if !section.trim().eq_ignore_ascii_case("DEFAULT") {
                return Err(BillsError::Config(format!(
                    "{} line {}: unexpected section [{}]; only [DEFAULT] is supported",
                    CONFIG_FILE_NAME,
                    index + 1,
                    section.trim()
                )));
            }
            continue;
        }

        let (key, value) = line
            .split_once('=')
            .or_else(|| line.split_once(':'))
            .ok_or_else(|| {
                BillsError::Config(format!(
                    "{} line {}: expected KEY = value",
                    CONFIG_FILE_NAME,
                    index + 1
                ))
            })?;

        values.insert(key.trim().to_uppercase(), strip_inline_comment(value).to_string());
    }

    Ok(values)
}

fn strip_inline_comment(value: &str) -> &str {
    let bytes = value.as_bytes();
    let cut = (1..bytes.len())
        .find(|&i| (bytes[i] == b';' || bytes[i] == b'#') && bytes[i - 1].is_ascii_whitespace())
        .unwrap_or(bytes.len());
    value[..cut].trim()
}
