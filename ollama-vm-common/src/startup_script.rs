//! Boot script embedded in instance metadata at creation time.
//!
//! The template has exactly one parameter, the model to pull. Everything
//! else, including the idle watchdog, is fixed text: changing the poll
//! interval or threshold changes when every provisioned VM powers itself off.

use thiserror::Error;

const TEMPLATE: &str = include_str!("../templates/startup-script.sh");
const MODEL_PLACEHOLDER: &str = "{{model_name}}";

/// Seconds between two watchdog checks on the VM.
pub const WATCHDOG_POLL_SECONDS: u64 = 60;
/// Idle time after which the VM powers itself off.
pub const WATCHDOG_IDLE_THRESHOLD_SECONDS: u64 = 900;

const MAX_MODEL_NAME_LEN: usize = 128;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelNameError {
    #[error("modelName must not be empty")]
    Empty,
    #[error("modelName is longer than 128 characters")]
    TooLong,
    #[error("modelName contains unsupported character {0:?}")]
    InvalidChar(char),
}

/// Model names end up in a shell command, so only registry-style names are
/// accepted (`llama2`, `llama3:8b`, `library/mistral:7b-instruct`).
pub fn validate_model_name(model_name: &str) -> Result<(), ModelNameError> {
    if model_name.is_empty() {
        return Err(ModelNameError::Empty);
    }
    if model_name.len() > MAX_MODEL_NAME_LEN {
        return Err(ModelNameError::TooLong);
    }
    if let Some(c) = model_name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '/' | '-')))
    {
        return Err(ModelNameError::InvalidChar(c));
    }
    Ok(())
}

pub fn render(model_name: &str) -> Result<String, ModelNameError> {
    validate_model_name(model_name)?;
    Ok(TEMPLATE.replace(MODEL_PLACEHOLDER, model_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_has_single_parameter() {
        assert_eq!(TEMPLATE.matches(MODEL_PLACEHOLDER).count(), 1);
        assert_eq!(TEMPLATE.matches("{{").count(), 1);
    }

    #[test]
    fn render_substitutes_pull_command() {
        let script = render("llama3:8b").unwrap();
        assert!(script.starts_with("#!/bin/bash"));
        assert!(script.contains("docker exec ollama ollama pull llama3:8b\n"));
        assert!(!script.contains(MODEL_PLACEHOLDER));
    }

    #[test]
    fn watchdog_contract_matches_constants() {
        assert!(TEMPLATE.contains(&format!("POLL_SECONDS={}\n", WATCHDOG_POLL_SECONDS)));
        assert!(TEMPLATE.contains(&format!(
            "IDLE_THRESHOLD_SECONDS={}\n",
            WATCHDOG_IDLE_THRESHOLD_SECONDS
        )));
        assert!(TEMPLATE.contains("last-activity-timestamp"));
        assert!(TEMPLATE.contains("startup-timestamp"));
        assert!(TEMPLATE.contains("shutdown -h now"));
    }

    #[test]
    fn watchdog_treats_missing_marker_as_empty() {
        // A missing attribute is an HTTP 404 with an HTML body; only a
        // failing curl leaves the variable empty so the fallback runs.
        let lookups: Vec<&str> = TEMPLATE
            .lines()
            .filter(|l| l.contains("$METADATA_URL/"))
            .collect();
        assert_eq!(lookups.len(), 2);
        for line in lookups {
            assert!(line.contains("curl -sf "), "lookup without -f: {line}");
        }
        let last = TEMPLATE.find("$METADATA_URL/last-activity-timestamp").unwrap();
        let fallback = TEMPLATE.find("$METADATA_URL/startup-timestamp").unwrap();
        assert!(last < fallback);
    }

    #[test]
    fn rejects_shell_metacharacters() {
        assert_eq!(render(""), Err(ModelNameError::Empty));
        assert_eq!(
            render("llama2; rm -rf /"),
            Err(ModelNameError::InvalidChar(';'))
        );
        assert_eq!(render("$(id)"), Err(ModelNameError::InvalidChar('$')));
        assert_eq!(render(&"a".repeat(200)), Err(ModelNameError::TooLong));
        assert!(render("library/mistral:7b-instruct-v0.2_q4").is_ok());
    }
}
