//! Host configuration flowing into the registry and logging.

use tempfile::TempDir;
use trellis_config::{CONFIG_FILE_NAME, ConfigError, HostConfig};
use trellis_core::Capability;
use trellis_plugins::PluginRegistry;
use trellis_telemetry::{LogConfig, LogFormat};
use trellis_test::manifest_requesting;

const HOST_TOML: &str = r#"
[logging]
level = "debug"
format = "json"
directives = ["trellis_events=trace"]

[router]
channel_capacity = 64
dedupe_window = 128

[permissions]
auto_grant = ["storage", "ui"]
"#;

#[tokio::test]
async fn config_drives_the_registry() {
    let config = HostConfig::from_toml_str(HOST_TOML).unwrap();
    let registry = PluginRegistry::builder().config(&config).build();

    let id = registry
        .register(&manifest_requesting("notes", &["storage", "network"]))
        .unwrap();
    assert!(registry.has_permission(&id, Capability::Storage));
    assert!(!registry.has_permission(&id, Capability::Ui));
    assert!(!registry.has_permission(&id, Capability::Network));

    // The config installs a channel, so the registry can listen.
    let listener = registry.listen().unwrap();
    assert!(listener.is_some());
}

#[test]
fn logging_section_maps_to_log_config() {
    let config = HostConfig::from_toml_str(HOST_TOML).unwrap();
    let log = LogConfig::from(&config.logging);
    assert_eq!(log.level, "debug");
    assert_eq!(log.format, LogFormat::Json);
    assert_eq!(log.directives, vec!["trellis_events=trace".to_string()]);
}

#[test]
fn file_round_trip_and_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    let config = HostConfig::from_toml_str(HOST_TOML).unwrap();
    std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();

    assert_eq!(HostConfig::load(Some(path.as_path())).unwrap(), config);
    assert_eq!(
        HostConfig::from_toml_str("").unwrap(),
        HostConfig::default()
    );
}

#[test]
fn invalid_config_is_rejected() {
    let err = HostConfig::from_toml_str("[permissions]\nauto_grant = [\"telepathy\"]\n")
        .unwrap_err();
    assert!(matches!(err, ConfigError::ValidationError { .. }));

    let err = HostConfig::from_toml_str("[router\n").unwrap_err();
    assert!(matches!(err, ConfigError::ParseError { .. }));
}
