//! Tests for task definitions and the in-memory definition provider

use std::fs;

use overseer::core::definition::{DefinitionProvider, OrderType, TaskDefinition, TaskSelector, TaskType};
use overseer::core::PoolError;
use overseer::infra::InMemoryDefinitionProvider;
use serde_json::json;

#[test]
fn test_definition_validation() {
    let mut def = TaskDefinition::new("GROUP", "TASK");
    assert!(def.validate().is_ok());

    def.schedule.order_type = OrderType::Weekday;
    assert!(def.validate().is_err(), "weekday schedule needs values");
    def.schedule.values = vec![8];
    assert!(def.validate().is_err());
    def.schedule.values = vec![1, 7];
    assert!(def.validate().is_ok());

    def.schedule.months = vec![13];
    assert!(def.validate().is_err());
    def.schedule.months.clear();

    def.cyclic.is_cyclic = true;
    assert!(def.validate().is_err(), "cyclic task needs max runs and interval");
    def.cyclic.max_runs = 3;
    def.cyclic.interval_minutes = 5;
    assert!(def.validate().is_ok());
}

#[test]
fn test_definition_from_json() {
    let def: TaskDefinition = serde_json::from_value(json!({
        "group": "BATCH",
        "name": "LOAD",
        "task_type": "os",
        "schedule": {"order_type": "weekday", "values": [1, 3, 5], "from": "10:00"},
        "in_tickets": [{"name": "LOAD_READY", "odate": "ODATE"}],
        "flags": [{"name": "DB", "policy": "EXL"}],
        "action": {"return_code": 0}
    }))
    .unwrap();
    assert_eq!(def.task_type, TaskType::Os);
    assert_eq!(def.schedule.order_type, OrderType::Weekday);
    assert_eq!(def.schedule.from.map(|t| t.to_string()), Some("10:00".to_string()));
    assert_eq!(def.in_tickets.len(), 1);
    assert!(!def.confirm);
    assert!(def.validate().is_ok());
}

#[test]
fn test_provider_resolves_selectors() {
    let provider = InMemoryDefinitionProvider::from_definitions([
        TaskDefinition::new("BATCH", "LOAD"),
        TaskDefinition::new("BATCH", "REPORT"),
    ])
    .unwrap();

    let defs = provider
        .get_tasks(&[TaskSelector::new("BATCH", "REPORT"), TaskSelector::new("BATCH", "LOAD")])
        .unwrap();
    assert_eq!(defs[0].name, "REPORT");
    assert_eq!(defs[1].name, "LOAD");

    let err = provider.get_tasks(&[TaskSelector::new("BATCH", "MISSING")]).unwrap_err();
    assert!(matches!(err, PoolError::Definition(_)));

    assert!(provider.remove("BATCH", "LOAD"));
    assert!(!provider.remove("BATCH", "LOAD"));
    assert_eq!(provider.get_task_model_list("BATCH").unwrap().len(), 1);
}

#[test]
fn test_provider_rejects_invalid_definition() {
    let provider = InMemoryDefinitionProvider::new();
    assert!(provider.add(TaskDefinition::new("BAD GROUP", "T")).is_err());
    assert!(provider.get_groups().is_empty());
}

#[test]
fn test_load_dir() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("single.json"),
        json!({"group": "G1", "name": "A", "task_type": "dummy", "schedule": {"order_type": "daily"}}).to_string(),
    )
    .unwrap();
    fs::write(
        dir.path().join("many.json"),
        json!([
            {"group": "G2", "name": "B", "task_type": "dummy", "schedule": {"order_type": "manual"}},
            {"group": "G2", "name": "C", "task_type": "dummy", "schedule": {"order_type": "manual"}}
        ])
        .to_string(),
    )
    .unwrap();
    fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let provider = InMemoryDefinitionProvider::load_dir(dir.path()).unwrap();
    assert_eq!(provider.get_groups(), vec!["G1".to_string(), "G2".to_string()]);
    assert_eq!(provider.get_task_model_list("G*").unwrap().len(), 3);
}

#[test]
fn test_load_dir_reports_broken_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("broken.json"), "{not json").unwrap();
    let err = InMemoryDefinitionProvider::load_dir(dir.path()).unwrap_err();
    assert!(format!("{err:#}").contains("broken.json"));
}
