//! Configuration system
//!
//! Loads `config.ini` from the working directory:
//!
//! ```text
//! [DEFAULT]
//! USER_ID = billing@example.com
//! USER_PW = secret
//! BASE_URL = https://billing.example.com       ; optional
//! WEBDRIVER_URL = http://localhost:9515        ; optional
//! ```
//!
//! The section header is optional; keys outside any section belong to the
//! unnamed default section. Command-line flags override the optional keys.

mod bills_config;
pub mod validation;

pub use bills_config::{
    BillsConfig, Credentials, CONFIG_FILE_NAME, DEFAULT_BASE_URL, DEFAULT_WEBDRIVER_URL,
};
pub use validation::{validate_config, validate_config_result, ValidationError};
