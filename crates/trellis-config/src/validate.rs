//! Post-parse configuration validation.

use trellis_core::Capability;

use crate::error::{ConfigError, ConfigResult};
use crate::types::HostConfig;

/// Validate a deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &HostConfig) -> ConfigResult<()> {
    validate_logging(config)?;
    validate_router(config)?;
    validate_permissions(config)?;
    Ok(())
}

fn validate_logging(config: &HostConfig) -> ConfigResult<()> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.logging.level.as_str()) {
        return Err(ConfigError::ValidationError {
            field: "logging.level".to_owned(),
            message: format!(
                "unsupported log level '{}'; expected one of: {}",
                config.logging.level,
                valid_levels.join(", ")
            ),
        });
    }

    let valid_formats = ["pretty", "compact", "json", "full"];
    if !valid_formats.contains(&config.logging.format.as_str()) {
        return Err(ConfigError::ValidationError {
            field: "logging.format".to_owned(),
            message: format!(
                "unsupported log format '{}'; expected one of: {}",
                config.logging.format,
                valid_formats.join(", ")
            ),
        });
    }

    Ok(())
}

fn validate_router(config: &HostConfig) -> ConfigResult<()> {
    if config.router.channel_capacity == 0 {
        return Err(ConfigError::ValidationError {
            field: "router.channel_capacity".to_owned(),
            message: "channel_capacity must be greater than 0".to_owned(),
        });
    }
    if config.router.dedupe_window == 0 {
        return Err(ConfigError::ValidationError {
            field: "router.dedupe_window".to_owned(),
            message: "dedupe_window must be greater than 0".to_owned(),
        });
    }
    Ok(())
}

fn validate_permissions(config: &HostConfig) -> ConfigResult<()> {
    for name in &config.permissions.auto_grant {
        if name.parse::<Capability>().is_err() {
            let known: Vec<&str> = Capability::ALL.into_iter().map(Capability::as_str).collect();
            return Err(ConfigError::ValidationError {
                field: "permissions.auto_grant".to_owned(),
                message: format!(
                    "unknown capability '{name}'; expected one of: {}",
                    known.join(", ")
                ),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_field(result: ConfigResult<()>, expected: &str) {
        match result {
            Err(ConfigError::ValidationError { field, .. }) => assert_eq!(field, expected),
            other => panic!("expected validation error on {expected}, got {other:?}"),
        }
    }

    #[test]
    fn defaults_are_valid() {
        validate(&HostConfig::default()).unwrap();
    }

    #[test]
    fn rejects_bad_logging() {
        let mut config = HostConfig::default();
        config.logging.level = "loud".into();
        assert_field(validate(&config), "logging.level");

        let mut config = HostConfig::default();
        config.logging.format = "xml".into();
        assert_field(validate(&config), "logging.format");
    }

    #[test]
    fn rejects_zero_router_sizes() {
        let mut config = HostConfig::default();
        config.router.channel_capacity = 0;
        assert_field(validate(&config), "router.channel_capacity");

        let mut config = HostConfig::default();
        config.router.dedupe_window = 0;
        assert_field(validate(&config), "router.dedupe_window");
    }

    #[test]
    fn rejects_unknown_capability() {
        let mut config = HostConfig::default();
        config.permissions.auto_grant = vec!["storage".into(), "telepathy".into()];
        assert_field(validate(&config), "permissions.auto_grant");
    }
}
