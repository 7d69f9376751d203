//! Configuration validation
//!
//! Checks a loaded configuration before any browser is started:
//! - URLs use http or https
//! - URLs carry a host

use super::bills_config::BillsConfig;
use crate::BillsError;

/// Validation error details
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validation result
pub type ValidationResult = std::result::Result<(), Vec<ValidationError>>;

/// Validate a billpull configuration
pub fn validate_config(config: &BillsConfig) -> ValidationResult {
    let mut errors = Vec::new();

    for (field, url) in [
        ("BASE_URL", &config.base_url),
        ("WEBDRIVER_URL", &config.webdriver_url),
    ] {
        let rest = url
            .strip_prefix("http://")
            .or_else(|| url.strip_prefix("https://"));
        match rest {
            None => errors.push(ValidationError::new(
                field,
                format!("must start with http:// or https://, got `{}`", url),
            )),
            Some(rest) if rest.trim_matches('/').is_empty() => {
                errors.push(ValidationError::new(field, "has no host"))
            }
            Some(_) => {}
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate and fold all problems into one configuration error
pub fn validate_config_result(config: &BillsConfig) -> crate::Result<()> {
    validate_config(config).map_err(|errors| {
        BillsError::Config(
            errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;

    fn config(base_url: &str, webdriver_url: &str) -> BillsConfig {
        BillsConfig {
            credentials: Credentials::new("ops", "secret"),
            base_url: base_url.to_string(),
            webdriver_url: webdriver_url.to_string(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = config("https://billing.example.com", "http://localhost:9515");
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_bad_urls_reported_together() {
        let config = config("billing.example.com", "localhost:9515");
        let errors = validate_config(&config).unwrap_err();

        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].field, "BASE_URL");
        assert_eq!(errors[1].field, "WEBDRIVER_URL");

        let err = validate_config_result(&config).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("BASE_URL"));
    }

    #[test]
    fn test_url_without_host() {
        let errors = validate_config(&config("https://", "http://localhost:9515")).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "has no host");
    }
}
