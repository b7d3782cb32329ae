//! Tests for error types

use overseer::core::events::RouteName;
use overseer::core::{CollectionError, DispatchError, PoolError, ResourceError, StoreError, WorkError};
use overseer::util::TaskOrderId;

#[test]
fn test_resource_error_display() {
    let err = ResourceError::DuplicateResource;
    assert_eq!(format!("{}", err), "ticket with given name and odate already exists");

    let err = ResourceError::FlagExclusiveBlockedByShared;
    assert_eq!(format!("{}", err), "exclusive flag blocked by shared holders");
}

#[test]
fn test_store_error_maps_to_resource_error() {
    assert_eq!(
        ResourceError::from(StoreError::KeyExists("t:A:".into())),
        ResourceError::DuplicateResource
    );
    assert_eq!(ResourceError::from(StoreError::KeyNotFound("f:A".into())), ResourceError::NotFound);
    assert_eq!(
        ResourceError::from(StoreError::Backend("disk".into())),
        ResourceError::Backend("disk".into())
    );
}

#[test]
fn test_pool_error_display() {
    let err = PoolError::UnableFindTask(TaskOrderId::from("A0001"));
    assert_eq!(format!("{}", err), "unable to find task with id: A0001");

    let err = PoolError::NotSubmitted("Scheduling criteria does not meet".into());
    assert_eq!(format!("{}", err), "task not submitted: Scheduling criteria does not meet");
}

#[test]
fn test_dispatch_error_is_transparent_in_pool_error() {
    let err: PoolError = DispatchError::NoResponse.into();
    assert_eq!(format!("{}", err), "no response received");

    let err = DispatchError::InvalidRouteName(RouteName::Journal);
    assert!(format!("{}", err).starts_with("invalid route name"));
}

#[test]
fn test_work_and_collection_error_display() {
    assert_eq!(
        format!("{}", WorkError::NoConverter("OS".into())),
        "no converter registered for task type: OS"
    );
    assert_eq!(format!("{}", CollectionError::NotFound("seq".into())), "document not found: seq");
}
