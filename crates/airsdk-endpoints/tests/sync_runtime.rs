use std::sync::Arc;
use std::time::Duration;

use airsdk_core::Method;
use airsdk_endpoints::{AirApi, AirError, ClientOptions, FlushMode, Payload};
use airsdk_transport::{CollectionRules, Injection, MemoryTransport};
use serde_json::{json, Value};

fn server() -> Arc<MemoryTransport> {
    Arc::new(
        MemoryTransport::new()
            .with_collection("simulations", CollectionRules::new().read_only("state"))
            .with_collection("simulations/nodes", CollectionRules::new())
            .with_collection(
                "images",
                CollectionRules::new()
                    .require("name")
                    .default_value("published", json!(false)),
            ),
    )
}

fn api(server: &Arc<MemoryTransport>, options: ClientOptions) -> AirApi {
    AirApi::with_transport(server.clone(), options).unwrap()
}

#[tokio::test]
async fn save_clears_dirty_set_and_adopts_server_values() {
    let server = server();
    let sim = server.seed("simulations", json!({"name": "lab", "documentation": null}));
    let api = api(&server, ClientOptions::default());

    let mut model = api.simulations().get(sim.as_str()).await.unwrap();
    model.set("name", "lab-2").await.unwrap();
    model.set("documentation", "readme").await.unwrap();
    model.save().await.unwrap();

    assert!(!model.is_dirty());
    let stored = server.record("simulations", &sim).unwrap();
    assert_eq!(model.get("name").unwrap(), stored["name"]);
    assert_eq!(model.get("documentation").unwrap(), stored["documentation"]);
}

#[tokio::test]
async fn unchanged_instance_saves_without_requests() {
    let server = server();
    let sim = server.seed("simulations", json!({"name": "lab"}));
    let api = api(&server, ClientOptions::default());

    let mut model = api.simulations().get(sim.as_str()).await.unwrap();
    model.save().await.unwrap();
    model.set("name", "lab").await.unwrap();
    model.save().await.unwrap();

    assert_eq!(server.count(Method::Patch, "simulations/"), 0);
}

#[tokio::test]
async fn references_are_fetched_once() {
    let server = server();
    let sim = server.seed("simulations", json!({"name": "lab"}));
    let node = server.seed("simulations/nodes", json!({"name": "leaf01", "simulation": sim}));
    let api = api(&server, ClientOptions::default());

    let model = api.nodes().get(node.as_str()).await.unwrap();
    server.clear_log();

    let first = model.resolve("simulation").await.unwrap().unwrap();
    let second = model.resolve("simulation").await.unwrap().unwrap();

    assert!(first.same_resource(&second));
    assert_eq!(server.count(Method::Get, &format!("simulations/{sim}")), 1);
}

#[tokio::test]
async fn create_strips_hints_and_rejects_server_assigned_fields() {
    let server = server();
    let api = api(&server, ClientOptions::default());

    let image = api
        .images()
        .create(Payload::new().with("name", "cumulus").with("size", 10))
        .await
        .unwrap();
    let sent = server
        .requests()
        .into_iter()
        .find(|r| r.method == Method::Post)
        .and_then(|r| r.body)
        .unwrap();
    assert!(sent.get("size").is_none());
    assert_eq!(image.get("published").unwrap(), json!(false));

    server.clear_log();
    let err = api
        .images()
        .create(Payload::new().with("name", "cumulus").with("published", true))
        .await
        .unwrap_err();
    match err {
        AirError::ValidationRejected { fields, .. } => assert_eq!(fields, vec!["published"]),
        other => panic!("unexpected error: {other}"),
    }
    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn listing_issues_one_request_per_page() {
    let server = server();
    for i in 0..5 {
        server.seed("images", json!({"name": format!("image-{i}")}));
    }
    let api = api(&server, ClientOptions::default().with_page_size(2));

    let mut cursor = api.images().iter().unwrap();
    let mut names = Vec::new();
    while let Some(image) = cursor.try_next().await.unwrap() {
        names.push(image.get_str("name").unwrap());
        assert_eq!(server.count(Method::Get, "images"), cursor.pages_fetched());
    }

    assert_eq!(names.len(), 5);
    assert_eq!(server.count(Method::Get, "images"), 3);
    assert_eq!(cursor.total(), Some(5));
}

#[tokio::test]
async fn fresh_cursor_restarts_from_the_beginning() {
    let server = server();
    for i in 0..3 {
        server.seed("images", json!({"name": format!("image-{i}")}));
    }
    let api = api(&server, ClientOptions::default().with_page_size(2));

    let first = api.images().iter().unwrap().first().await.unwrap().unwrap();
    let again = api.images().iter().unwrap().first().await.unwrap().unwrap();
    assert!(first.same_resource(&again));
}

#[tokio::test]
async fn endpoint_update_is_visible_through_get() {
    let server = server();
    let sim = server.seed("simulations", json!({"name": "lab"}));
    let api = api(&server, ClientOptions::default());

    let held = api.simulations().get(sim.as_str()).await.unwrap();
    api.simulations()
        .update(sim.as_str(), Payload::new().with("name", "new"))
        .await
        .unwrap();

    let fetched = api.simulations().get(sim.as_str()).await.unwrap();
    assert_eq!(fetched.get("name").unwrap(), json!("new"));
    assert_eq!(held.get("name").unwrap(), json!("new"));
}

#[tokio::test]
async fn deleted_resources_are_not_found_and_stale() {
    let server = server();
    let sim = server.seed("simulations", json!({"name": "lab"}));
    let api = api(&server, ClientOptions::default());

    let held = api.simulations().get(sim.as_str()).await.unwrap();
    api.simulations().delete(sim.as_str()).await.unwrap();

    let err = api.simulations().get(sim.as_str()).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(matches!(
        held.get("name").unwrap_err(),
        AirError::StaleReference { .. }
    ));

    let err = api.simulations().delete(sim.as_str()).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn rejected_flush_keeps_every_pending_change() {
    let server = server();
    let sim = server.seed("simulations", json!({"name": "lab", "documentation": null}));
    let api = api(&server, ClientOptions::default());

    let mut model = api.simulations().get(sim.as_str()).await.unwrap();
    model.set("name", "x".repeat(300)).await.unwrap();
    model.set("documentation", "readme").await.unwrap();

    server.inject(Injection::Status(400, json!({"name": ["Ensure this field has no more than 256 characters."]})));
    let err = model.save().await.unwrap_err();
    match &err {
        AirError::ValidationRejected { fields, detail, .. } => {
            assert_eq!(fields, &vec!["name".to_string()]);
            assert!(detail.get("name").is_some());
        }
        other => panic!("unexpected error: {other}"),
    }
    let mut dirty = model.dirty_fields();
    dirty.sort();
    assert_eq!(dirty, vec!["documentation", "name"]);

    model.set("name", "lab-2").await.unwrap();
    model.save().await.unwrap();
    let patch = server.requests().pop().unwrap();
    assert_eq!(
        patch.body,
        Some(json!({"name": "lab-2", "documentation": "readme"}))
    );
}

#[tokio::test]
async fn timed_out_flush_changes_nothing_locally() {
    let server = server();
    let sim = server.seed("simulations", json!({"name": "lab"}));
    let api = api(&server, ClientOptions::default());

    let mut model = api.simulations().get(sim.as_str()).await.unwrap();
    model.set("name", "lab-2").await.unwrap();
    server.inject(Injection::Timeout);

    let err = model.save().await.unwrap_err();
    assert!(matches!(err, AirError::Timeout(_)));
    assert_eq!(model.dirty_fields(), vec!["name"]);
    assert_eq!(model.get("name").unwrap(), json!("lab-2"));
    assert_eq!(server.record("simulations", &sim).unwrap()["name"], "lab");
}

#[tokio::test]
async fn immediate_flush_models_patch_on_every_set() {
    let server = server();
    let sim = server.seed("simulations", json!({"name": "lab"}));
    let options = ClientOptions::default().with_flush("Simulation", FlushMode::Immediate);
    let api = api(&server, options);

    let mut model = api.simulations().get(sim.as_str()).await.unwrap();
    model.set("name", "lab-2").await.unwrap();

    assert!(!model.is_dirty());
    assert_eq!(server.count(Method::Patch, "simulations/"), 1);
    assert_eq!(server.record("simulations", &sim).unwrap()["name"], "lab-2");
}

#[tokio::test]
async fn legacy_flag_matches_timestamp_presence() {
    let server = server();
    let asleep = server.seed("simulations", json!({"name": "a", "sleep_at": "2024-03-01T08:00:00Z"}));
    let awake = server.seed("simulations", json!({"name": "b", "sleep_at": null}));
    let api = api(&server, ClientOptions::default());

    for (key, expected) in [(asleep, true), (awake, false)] {
        let mut model = api.simulations().get(key.as_str()).await.unwrap();
        let canonical = model.get("sleep_at").unwrap();
        let legacy = model.legacy();
        let first = legacy.get("sleep").unwrap();
        let second = legacy.get("sleep").unwrap();
        assert_eq!(first, Value::Bool(expected));
        assert_eq!(first, second);
        assert_eq!(first, Value::Bool(!canonical.is_null()));
    }
}

#[tokio::test]
async fn request_timeout_applies_to_every_call() {
    let server = server();
    let sim = server.seed("simulations", json!({"name": "lab"}));
    let options = ClientOptions::default().with_request_timeout(Duration::from_secs(5));
    let api = api(&server, options);

    server.inject(Injection::Timeout);
    let err = api.simulations().get(sim.as_str()).await.unwrap_err();
    assert!(err.is_transient());
    assert!(matches!(err, AirError::Timeout(d) if d == Duration::from_secs(5)));
}
