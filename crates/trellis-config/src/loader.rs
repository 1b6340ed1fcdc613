//! Config file discovery and loading.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::types::HostConfig;
use crate::validate;

/// Name of the host configuration file.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Parse and validate configuration from a TOML string.
///
/// `origin` names the source in error messages.
///
/// # Errors
///
/// Returns [`ConfigError::ParseError`] for malformed TOML and
/// [`ConfigError::ValidationError`] for out-of-range values.
pub fn parse(content: &str, origin: &str) -> ConfigResult<HostConfig> {
    let config: HostConfig = toml::from_str(content).map_err(|e| ConfigError::ParseError {
        path: origin.to_owned(),
        source: e,
    })?;
    validate::validate(&config)?;
    Ok(config)
}

/// Load and validate a config file.
///
/// # Errors
///
/// Returns [`ConfigError::ReadError`] if the file cannot be read, otherwise
/// as for [`parse`].
pub fn load_file(path: &Path) -> ConfigResult<HostConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    let config = parse(&content, &path.display().to_string())?;
    info!(path = %path.display(), "loaded host config");
    Ok(config)
}

/// Load `path` if given, else the default location if a file exists
/// there, else the built-in defaults.
///
/// # Errors
///
/// As for [`load_file`]. A missing file at the default location is not an
/// error; a missing explicit `path` is.
pub fn load(path: Option<&Path>) -> ConfigResult<HostConfig> {
    if let Some(path) = path {
        return load_file(path);
    }
    match default_config_path() {
        Ok(path) if path.is_file() => load_file(&path),
        Ok(path) => {
            debug!(path = %path.display(), "no host config found, using defaults");
            Ok(HostConfig::default())
        },
        Err(ConfigError::NoConfigDir) => {
            debug!("no configuration directory on this platform, using defaults");
            Ok(HostConfig::default())
        },
        Err(e) => Err(e),
    }
}

/// Platform configuration path, e.g. `~/.config/trellis/config.toml`.
///
/// # Errors
///
/// Returns [`ConfigError::NoConfigDir`] if the platform has no home
/// directory.
pub fn default_config_path() -> ConfigResult<PathBuf> {
    directories::ProjectDirs::from("", "", "trellis")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
        .ok_or(ConfigError::NoConfigDir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
[logging]
level = "debug"
format = "json"
directives = ["trellis_events=trace"]

[router]
dedupe_window = 16

[permissions]
auto_grant = ["storage", "messaging"]
"#;

    #[test]
    fn parses_partial_file_with_defaults() {
        let config = parse(SAMPLE, "<test>").unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.directives.len(), 1);
        assert_eq!(config.router.dedupe_window, 16);
        assert_eq!(
            config.router.channel_capacity,
            crate::DEFAULT_CHANNEL_CAPACITY
        );
        assert_eq!(config.permissions.auto_grant_capabilities().len(), 2);
    }

    #[test]
    fn empty_file_is_default() {
        assert_eq!(parse("", "<empty>").unwrap(), HostConfig::default());
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = parse("[router\n", "bad.toml").unwrap_err();
        match err {
            ConfigError::ParseError { path, .. } => assert_eq!(path, "bad.toml"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn load_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, SAMPLE).unwrap();

        let config = load(Some(&path)).unwrap();
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn explicit_missing_path_is_read_error() {
        let dir = TempDir::new().unwrap();
        let err = load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }

    #[test]
    fn invalid_values_fail_on_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[permissions]\nauto_grant = [\"root\"]\n").unwrap();
        assert!(matches!(
            load_file(&path),
            Err(ConfigError::ValidationError { .. })
        ));
    }
}
