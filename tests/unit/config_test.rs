//! Tests for configuration validation

use std::io::Write;

use overseer::config::{OverseerConfig, PoolConfig, StoreConfig, StoreKind};
use overseer::util::HourMinTime;

#[test]
fn test_overseer_config_defaults() {
    let cfg = OverseerConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.pool.max_ok_return_code, 4);
    assert_eq!(cfg.pool.new_day_proc, HourMinTime::default());
    assert_eq!(cfg.time_interval_secs, 1);
    assert_eq!(cfg.store.kind, StoreKind::InMemory);
}

#[test]
fn test_pool_config_invalid_shards() {
    let invalid = PoolConfig {
        shards: 0,
        ..PoolConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_pool_config_invalid_return_code() {
    let invalid = PoolConfig {
        max_ok_return_code: -1,
        ..PoolConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_nested_errors_name_the_section() {
    let mut cfg = OverseerConfig::default();
    cfg.pool.sync_interval_secs = 600;
    let err = cfg.validate().unwrap_err();
    assert!(err.starts_with("pool invalid"), "{err}");

    let mut cfg = OverseerConfig::default();
    cfg.resources.tickets.collection.clear();
    assert!(cfg.validate().unwrap_err().contains("resources.tickets"));

    let mut cfg = OverseerConfig::default();
    cfg.journal.max_entries = 0;
    assert!(cfg.validate().unwrap_err().contains("journal.max_entries"));
}

#[test]
fn test_collections_must_be_distinct() {
    let mut cfg = OverseerConfig::default();
    cfg.journal.collection = cfg.pool.collection.clone();
    assert_eq!(
        cfg.validate().unwrap_err(),
        "journal.collection and pool.collection both use collection 'tasks'"
    );

    let mut cfg = OverseerConfig::default();
    cfg.pool.sequence_collection = cfg.pool.collection.clone();
    assert!(cfg.validate().unwrap_err().starts_with("pool invalid"));
}

#[test]
fn test_from_json_str_rejects_unknown_store_kind() {
    let err = OverseerConfig::from_json_str(r#"{"store": {"kind": "postgres"}}"#).unwrap_err();
    assert!(err.starts_with("parse error"), "{err}");
}

#[test]
fn test_from_json_str_file_store() {
    let cfg = OverseerConfig::from_json_str(r#"{"store": {"kind": "file", "path": "/tmp/overseer"}}"#).unwrap();
    assert_eq!(
        cfg.store,
        StoreConfig {
            kind: StoreKind::File,
            path: Some("/tmp/overseer".into()),
        }
    );
    assert!(OverseerConfig::from_json_str(r#"{"store": {"kind": "file"}}"#).is_err());
}

#[test]
fn test_from_json_str_rejects_bad_time() {
    assert!(OverseerConfig::from_json_str(r#"{"pool": {"new_day_proc": "25:00"}}"#).is_err());
    assert!(OverseerConfig::from_json_str(r#"{"pool": {"new_day_proc": "7:30"}}"#).is_err());
}

#[test]
fn test_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"pool": {{"max_ok_return_code": 0, "retention_days": 3}}, "journal": {{"max_entries": 50}}}}"#
    )
    .unwrap();

    let cfg = OverseerConfig::from_file(file.path()).unwrap();
    assert_eq!(cfg.pool.max_ok_return_code, 0);
    assert_eq!(cfg.pool.retention_days, 3);
    assert_eq!(cfg.journal.max_entries, 50);
    assert_eq!(cfg.resources.flags.collection, "flags");
}

#[test]
fn test_from_file_missing() {
    let dir = tempfile::tempdir().unwrap();
    let err = OverseerConfig::from_file(dir.path().join("absent.json")).unwrap_err();
    assert!(format!("{err:#}").contains("reading configuration"));
}
