mod util;

use catalog_search::config::StoreConfig;
use serial_test::serial;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use util::EnvGuard;

#[test]
#[serial]
fn environment_overrides_file_values() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("catalog.toml");
    std::fs::write(&path, "db_path = \"/from/file.db\"\nretention_secs = 10\n").unwrap();

    let _db = EnvGuard::set("CATALOG_DB", "/from/env.db");
    let _retention = EnvGuard::set("CATALOG_RETENTION_SECS", "90");
    let config = StoreConfig::load(Some(&path)).unwrap();

    assert_eq!(config.db_path, PathBuf::from("/from/env.db"));
    assert_eq!(config.retention(), Duration::from_secs(90));
}

#[test]
#[serial]
fn defaults_apply_without_file_or_environment() {
    let _db = EnvGuard::remove("CATALOG_DB");
    let _retention = EnvGuard::remove("CATALOG_RETENTION_SECS");
    let config = StoreConfig::load(None).unwrap();

    assert_eq!(config, StoreConfig::default());
    assert_eq!(config.retention(), Duration::from_secs(7 * 24 * 60 * 60));
    assert!(config.db_path.ends_with("catalog.db"));
}

#[test]
#[serial]
fn non_numeric_retention_is_rejected() {
    let _retention = EnvGuard::set("CATALOG_RETENTION_SECS", "a week");
    let err = StoreConfig::load(None).unwrap_err();
    assert!(format!("{err:#}").contains("CATALOG_RETENTION_SECS"));
}
