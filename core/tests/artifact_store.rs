use commerce_core::{
    error::EngineError,
    store::{ArtifactStore, RunArtifact},
};

fn store() -> ArtifactStore {
    let store = ArtifactStore::in_memory().expect("in-memory store");
    store.migrate().expect("migration");
    store
}

fn artifact(signature: &str, payload: serde_json::Value) -> RunArtifact {
    RunArtifact {
        module_name: "kpi".to_string(),
        parameter_signature: signature.to_string(),
        payload,
        created_at: "2024-06-01T00:00:00+00:00".to_string(),
    }
}

#[test]
fn put_then_get_returns_the_identical_payload() {
    let store = store();
    let payload = serde_json::json!({
        "total_revenue": 150.0,
        "order_count": 5,
        "daily": [10.0, 20.0, 30.0, 40.0, 50.0],
    });

    store.put(&artifact("sig1", payload.clone())).expect("put");
    let fetched = store.get("kpi", "sig1").expect("get");

    assert_eq!(fetched.payload, payload);
    assert_eq!(fetched.module_name, "kpi");
    assert_eq!(fetched.parameter_signature, "sig1");
}

#[test]
fn unused_signature_is_not_found() {
    let store = store();
    store
        .put(&artifact("sig1", serde_json::json!({"v": 1})))
        .expect("put");

    let err = store.get("kpi", "sig2").expect_err("must miss");
    match err {
        EngineError::NotFound { module, signature } => {
            assert_eq!(module, "kpi");
            assert_eq!(signature, "sig2");
        }
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[test]
fn module_name_is_part_of_the_key() {
    let store = store();
    store
        .put(&artifact("sig1", serde_json::json!({"v": 1})))
        .expect("put");

    assert!(matches!(
        store.get("forecasting", "sig1"),
        Err(EngineError::NotFound { .. })
    ));
}

#[test]
fn rerunning_the_same_key_overwrites_in_place() {
    let store = store();
    store
        .put(&artifact("sig1", serde_json::json!({"v": 1})))
        .expect("first put");
    store
        .put(&artifact("sig1", serde_json::json!({"v": 2})))
        .expect("second put");

    let fetched = store.get("kpi", "sig1").expect("get");
    assert_eq!(fetched.payload, serde_json::json!({"v": 2}));
    assert_eq!(store.signatures("kpi").expect("signatures"), vec!["sig1"]);
}

#[test]
fn signatures_list_is_sorted() {
    let store = store();
    for sig in ["b", "a", "c"] {
        store
            .put(&artifact(sig, serde_json::json!({})))
            .expect("put");
    }
    assert_eq!(
        store.signatures("kpi").expect("signatures"),
        vec!["a", "b", "c"]
    );
}
