//! Configuration validation rules.

use super::schema::Config;

/// Validate configuration and return aggregated validation errors.
pub fn validate_config(config: &Config) -> crate::Result<()> {
    let mut errors = Vec::new();

    if config.server.host.trim().is_empty() {
        errors.push("server.host must not be empty".to_string());
    }
    if config.model.model.trim().is_empty() {
        errors.push("model.model must not be empty".to_string());
    }
    if !(0.0..=2.0).contains(&config.model.temperature) {
        errors.push("model.temperature must be in [0.0, 2.0]".to_string());
    }
    if config.model.max_output_tokens == 0 {
        errors.push("model.max_output_tokens must be > 0".to_string());
    }
    if config.model.timeout_secs == Some(0) {
        errors.push("model.timeout_secs must be > 0 when set".to_string());
    }
    if let Some(base) = &config.model.api_base {
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            errors.push("model.api_base must start with http:// or https://".to_string());
        }
    }
    if config.sessions.idle_timeout_secs == 0 {
        errors.push("sessions.idle_timeout_secs must be > 0".to_string());
    }
    if !matches!(config.logging.format.to_lowercase().as_str(), "text" | "json") {
        errors.push("logging.format must be 'text' or 'json'".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(crate::Error::Validation(errors.join("; ")))
    }
}
