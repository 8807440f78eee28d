use std::io::Write;

use serial_test::serial;

use super::*;

#[test]
fn test_config_default() {
    let config = Config::default();
    assert_eq!(config.core.snapshot_version_interval, 500);
    assert_eq!(config.core.number_of_events_per_read, 2000);
    assert!(config.core.priority_async_event_bus);
    assert!(config.archive.enabled);
    assert_eq!(config.archive.event_archive_type, EventArchiveType::Delete);
    assert!(config.grains.is_empty());
}

#[test]
fn test_from_yaml_partial_sections() {
    let config = Config::from_yaml(
        r#"
core:
  snapshot_version_interval: 10
archive:
  enabled: false
  event_archive_type: move
"#,
    )
    .unwrap();

    assert_eq!(config.core.snapshot_version_interval, 10);
    assert_eq!(config.core.min_snapshot_version_interval, 1);
    assert!(!config.archive.enabled);
    assert_eq!(config.archive.event_archive_type, EventArchiveType::Move);
}

#[test]
fn test_options_for_grain_override() {
    let config = Config::from_yaml(
        r#"
core:
  snapshot_version_interval: 10
grains:
  account:
    core:
      snapshot_version_interval: 2
"#,
    )
    .unwrap();

    let (core, archive) = config.options_for("account");
    assert_eq!(core.snapshot_version_interval, 2);
    assert_eq!(archive, config.archive);

    let (core, _) = config.options_for("order");
    assert_eq!(core.snapshot_version_interval, 10);
}

#[test]
fn test_validate_rejects_zero_page_size() {
    let err = Config::from_yaml(
        r#"
core:
  number_of_events_per_read: 0
"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("core.number_of_events_per_read"));
}

#[test]
fn test_validate_rejects_bad_override() {
    let mut config = Config::for_test();
    config.grains.insert(
        "account".to_string(),
        GrainOverrides {
            core: None,
            archive: Some(ArchiveOptions {
                version_interval: 0,
                ..ArchiveOptions::default()
            }),
        },
    );
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("grains.account.archive.version_interval"));
}

#[test]
#[serial]
fn test_load_from_file_and_env() {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    writeln!(file, "core:\n  snapshot_version_interval: 7\n  max_batch_size: 3").unwrap();
    let path = file.path().to_str().unwrap().to_string();

    std::env::set_var("GRAINLOG__CORE__SNAPSHOT_VERSION_INTERVAL", "9");
    let config = Config::load(Some(&path));
    std::env::remove_var("GRAINLOG__CORE__SNAPSHOT_VERSION_INTERVAL");

    let config = config.unwrap();
    assert_eq!(config.core.snapshot_version_interval, 9);
    assert_eq!(config.core.max_batch_size, 3);
}

#[test]
#[serial]
fn test_load_missing_required_file_fails() {
    let result = Config::load(Some("/nonexistent/grainlog-missing.yaml"));
    assert!(matches!(result, Err(ConfigError::Load(_))));
}
