mod common;

use common::Harness;
use vessel_shim::{DeleteRequest, ErrorKind, ShimError, StartRequest, StateRequest};
use vessel_vm::State;

#[tokio::test]
async fn test_recover_after_restart() {
    let h = Harness::new();
    h.create_sandbox("s1").await.unwrap();
    h.create_container("c1", "s1").await.unwrap();
    h.create_container("c2", "s1").await.unwrap();
    for id in ["s1", "c1"] {
        h.service
            .start(StartRequest {
                id: id.into(),
                exec_id: None,
            })
            .await
            .unwrap();
    }

    let service = h.restarted();
    assert_eq!(service.recover("s1").await.unwrap(), 3);
    assert!(service.registry().sandbox().await.is_some());

    let state = service
        .state(StateRequest {
            id: "c1".into(),
            exec_id: None,
        })
        .await
        .unwrap();
    assert_eq!(state.status, State::Running);
    assert!(service.registry().get("s1").await.unwrap().is_sandbox());

    service
        .delete(DeleteRequest {
            id: "c1".into(),
            exec_id: None,
        })
        .await
        .unwrap();
    assert_eq!(service.mappings().fetch("c1").await.unwrap(), None);
}

#[tokio::test]
async fn test_recover_drops_stale_mappings() {
    let h = Harness::new();
    h.create_sandbox("s1").await.unwrap();
    h.service.mappings().add("c9", "s1").await.unwrap();
    h.service.mappings().add("x1", "other").await.unwrap();

    let service = h.restarted();
    assert_eq!(service.recover("s1").await.unwrap(), 1);
    assert_eq!(service.mappings().fetch("c9").await.unwrap(), None);
    assert_eq!(
        service.mappings().fetch("x1").await.unwrap().as_deref(),
        Some("other")
    );
}

#[tokio::test]
async fn test_recover_unknown_sandbox() {
    let h = Harness::new();
    let err = h.restarted().recover("s1").await.unwrap_err();
    assert!(matches!(err, ShimError::SandboxNotCreated(_)));
}

#[tokio::test]
async fn test_recover_engine_failure() {
    let h = Harness::new();
    h.create_sandbox("s1").await.unwrap();
    h.engine.fail("fetch_sandbox").await;

    let service = h.restarted();
    let err = service.recover("s1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Engine);
    assert!(service.registry().is_empty().await);
}
