//! Find-or-create behaviour of the loader against the in-memory server.

use std::sync::Arc;
use std::time::Duration;

use grano_client::test_support::MemoryServer;
use grano_client::{Entity, Grano, Method};
use grano_core::GranoError;
use grano_loader::{BuildState, LoaderError, Loader, Signature};
use serde_json::{json, Value};

async fn setup(server: &MemoryServer) -> Loader {
    server.insert_project("demo", "Demo");
    let project = Grano::with_client(server.client())
        .project("demo")
        .await
        .unwrap();
    Loader::new(project, Some("http://example.org/source".into()))
}

fn schema_names(doc: &Value) -> Vec<String> {
    doc["schemata"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_saves_create_once() {
    let server = MemoryServer::new().with_latency(Duration::from_millis(5));
    let loader = setup(&server).await;

    let mut handles = Vec::new();
    for _ in 0..16 {
        let loader = loader.clone();
        handles.push(tokio::spawn(async move {
            let builder = loader.make_entity(["person"], None);
            builder.set("name", "Angela Merkel");
            builder.entity().await.unwrap().id().unwrap().to_string()
        }));
    }
    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap());
    }

    assert_eq!(server.entities().len(), 1);
    assert!(ids.iter().all(|id| id == &ids[0]));
    let stats = loader.stats();
    assert_eq!(stats.created, 1);
    assert_eq!(stats.updated, 15);
    assert_eq!(loader.locks().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_relation_saves_create_once() {
    let server = MemoryServer::new().with_latency(Duration::from_millis(2));
    let loader = setup(&server).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let loader = loader.clone();
        handles.push(tokio::spawn(async move {
            let a = loader.make_entity(["person"], None);
            a.set("name", "A");
            let b = loader.make_entity(["person"], None);
            b.set("name", "B");
            loader
                .make_relation("knows", &a, &b, None)
                .relation()
                .await
                .unwrap()
                .id()
                .unwrap()
                .to_string()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(server.entities().len(), 2);
    assert_eq!(server.relations().len(), 1);
}

#[tokio::test]
async fn test_relation_signature_composition() {
    let server = MemoryServer::new();
    let loader = setup(&server).await;

    let a = loader.make_entity(["person"], None);
    a.set("name", "X");
    let b = loader.make_entity(["person"], None);
    b.set("name", "Y");
    let relation = loader.make_relation("knows", &a, &b, None);

    let mut expected = Signature::new();
    expected.push_nested(Signature::from_values(["X"]));
    expected.push_nested(Signature::from_values(["Y"]));

    let first = relation.signature();
    assert_eq!(first, expected);
    assert_eq!(relation.signature(), first);
    assert_eq!(serde_json::to_value(&first).unwrap(), json!([["X"], ["Y"]]));
    assert_eq!(relation.signature().key().unwrap(), first.key().unwrap());
}

#[tokio::test]
async fn test_merge_into_existing_entity() {
    let server = MemoryServer::new();
    let loader = setup(&server).await;
    let existing = server.insert_entity("demo", &["base"], &[("name", "N"), ("a", "1")]);

    let builder = loader.make_entity(["person"], None);
    builder.set("name", "N").set("b", "2");
    let entity = builder.entity().await.unwrap();
    assert_eq!(entity.id().unwrap(), existing);

    let doc = server.entity(&existing).unwrap();
    assert_eq!(schema_names(&doc), vec!["base", "person"]);
    assert_eq!(doc["properties"]["a"]["value"], "1");
    assert_eq!(doc["properties"]["b"]["value"], "2");
    assert_eq!(doc["properties"]["b"]["source_url"], "http://example.org/source");
    assert_eq!(server.entities().len(), 1);
    assert_eq!(loader.stats().updated, 1);
}

#[tokio::test]
async fn test_historic_name_matches() {
    let server = MemoryServer::new();
    let loader = setup(&server).await;

    let first = loader.make_entity(["person"], None);
    first.set("name", "Old Name");
    let mut entity = first.entity().await.unwrap();
    entity
        .data_mut()
        .object_mut("properties")
        .insert("name".into(), json!({"name": "name", "value": "New Name", "active": true}));
    entity.save().await.unwrap();

    let again = loader.make_entity(["person"], None);
    again.set("name", "Old Name");
    assert_eq!(again.entity().await.unwrap().id().unwrap(), entity.id().unwrap());
    assert_eq!(server.entities().len(), 1);
}

#[tokio::test]
async fn test_ambiguous_match_updates_first() {
    let server = MemoryServer::new();
    let loader = setup(&server).await;
    let first = server.insert_entity("demo", &["base"], &[("name", "Dup")]);
    let second = server.insert_entity("demo", &["base"], &[("name", "Dup")]);

    let builder = loader.make_entity(["person"], None);
    builder.set("name", "Dup");
    let entity = builder.entity().await.unwrap();

    assert_eq!(entity.id().unwrap(), first);
    assert_eq!(server.entities().len(), 2);
    assert_eq!(schema_names(&server.entity(&second).unwrap()), vec!["base"]);
    let stats = loader.stats();
    assert_eq!(stats.ambiguous, 1);
    assert_eq!(stats.updated, 1);
}

#[tokio::test]
async fn test_validation_failure_is_contained() {
    let server = MemoryServer::new();
    let loader = setup(&server).await;
    server.require_property("born");

    let rejected = loader.make_entity(["person"], None);
    rejected.set("name", "No Birthday");
    assert!(rejected.save().await.unwrap().is_none());
    assert_eq!(rejected.state(), BuildState::Failed);
    let diagnostic = rejected.diagnostic().unwrap();
    assert!(diagnostic.message.contains("born"));

    let before = server.requests().len();
    assert!(rejected.save().await.unwrap().is_none());
    assert_eq!(server.requests().len(), before);
    assert!(matches!(
        rejected.entity().await,
        Err(LoaderError::Unresolved { kind: "Entity", .. })
    ));

    let accepted = loader.make_entity(["person"], None);
    accepted.set("name", "Has Birthday").set("born", 1970i64);
    assert!(accepted.save().await.unwrap().is_some());
    assert_eq!(accepted.state(), BuildState::Resolved);

    let stats = loader.stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.created, 1);
    assert_eq!(loader.diagnostics().len(), 1);
}

#[tokio::test]
async fn test_relation_with_failed_endpoint() {
    let server = MemoryServer::new();
    let loader = setup(&server).await;
    server.reject_schema("spy");

    let source = loader.make_entity(["spy"], None);
    source.set("name", "Mallory");
    let target = loader.make_entity(["person"], None);
    target.set("name", "Alice");
    let relation = loader.make_relation("watches", &source, &target, None);

    let err = relation.save().await.unwrap_err();
    assert!(matches!(err, LoaderError::UnresolvedEndpoint { endpoint: "source" }));
    assert_eq!(relation.state(), BuildState::Pending);
    assert_eq!(source.state(), BuildState::Failed);
    assert!(server.relations().is_empty());
}

#[tokio::test]
async fn test_missing_unique_value_fails_before_any_request() {
    let server = MemoryServer::new();
    let loader = setup(&server).await;
    server.clear_requests();

    let nameless = loader.make_entity(["person"], None);
    nameless.set("city", "Berlin");
    let err = nameless.save().await.unwrap_err();
    assert!(matches!(err, LoaderError::MissingUniqueValue { ref property } if property == "name"));
    assert_eq!(nameless.state(), BuildState::Pending);
    assert!(server.requests().is_empty());

    nameless.set("name", "Named Later");
    assert!(nameless.save().await.unwrap().is_some());
}

#[tokio::test]
async fn test_extra_unique_criteria_split_records() {
    let server = MemoryServer::new();
    let loader = setup(&server).await;

    for born in ["1950", "1960"] {
        let builder = loader.make_entity(["person"], None);
        builder
            .set("name", "John Smith")
            .set("born", born)
            .unique("born", true);
        builder.save().await.unwrap();
    }
    assert_eq!(server.entities().len(), 2);

    let last = server.last_request().unwrap();
    assert_eq!(last.method, Method::Post);
    let lookup = server
        .requests()
        .into_iter()
        .filter(|r| r.method == Method::Get && r.path == "entities")
        .last()
        .unwrap();
    assert_eq!(lookup.params["property-born"], "1960");
    assert_eq!(lookup.params["property-aliases-name"], "John Smith");
    assert_eq!(lookup.params["project"], "demo");
}

#[tokio::test]
async fn test_shared_endpoint_resolves_once() {
    let server = MemoryServer::new().with_latency(Duration::from_millis(2));
    let loader = setup(&server).await;
    server.clear_requests();

    let hub = loader.make_entity(["person"], None);
    hub.set("name", "Hub");
    let mut relations = Vec::new();
    for name in ["Spoke 1", "Spoke 2", "Spoke 3"] {
        let spoke = loader.make_entity(["person"], None);
        spoke.set("name", name);
        relations.push(Arc::new(loader.make_relation("knows", &hub, &spoke, None)));
    }

    let mut handles = Vec::new();
    for relation in relations {
        handles.push(tokio::spawn(async move { relation.save().await.unwrap() }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_some());
    }

    assert_eq!(server.entities().len(), 4);
    assert_eq!(server.relations().len(), 3);
    assert_eq!(server.count_requests(Method::Post, "entities"), 4);
}

#[tokio::test]
async fn test_settings_after_resolution_are_ignored() {
    let server = MemoryServer::new();
    let loader = setup(&server).await;

    let builder = loader.make_entity(["person"], None);
    builder.set("name", "Frozen");
    builder.save().await.unwrap();

    builder.unique("born", true).set("city", "Paris");
    assert_eq!(builder.criteria().len(), 1);
    assert!(builder.property("city").is_none());
    assert_eq!(builder.state(), BuildState::Resolved);
}

#[tokio::test]
async fn test_failed_lookup_never_creates() {
    let server = MemoryServer::new();
    let loader = setup(&server).await;
    server.insert_entity("demo", &["base"], &[("name", "Merkel")]);
    server.fail_requests(Method::Get, "entities", 503, r#"{"error": "busy"}"#);

    let builder = loader.make_entity(["person"], None);
    builder.set("name", "Merkel");
    let err = builder.save().await.unwrap_err();
    assert!(matches!(err, LoaderError::Grano(GranoError::Server(_))));
    assert_eq!(builder.state(), BuildState::Pending);
    assert_eq!(server.entities().len(), 1);
    assert_eq!(server.count_requests(Method::Post, "entities"), 0);
    assert_eq!(loader.stats().created, 0);
}

#[tokio::test]
async fn test_relation_validation_failure_is_contained() {
    let server = MemoryServer::new();
    let loader = setup(&server).await;
    server.reject_schema("spies_on");

    let a = loader.make_entity(["person"], None);
    a.set("name", "Eve");
    let b = loader.make_entity(["person"], None);
    b.set("name", "Bob");
    let relation = loader.make_relation("spies_on", &a, &b, None);

    assert!(relation.save().await.unwrap().is_none());
    assert_eq!(relation.state(), BuildState::Failed);
    assert_eq!(relation.diagnostic().unwrap().kind, "Relation");
    assert!(matches!(
        relation.relation().await,
        Err(LoaderError::Unresolved { kind: "Relation", .. })
    ));

    assert_eq!(server.entities().len(), 2);
    assert!(server.relations().is_empty());
    let stats = loader.stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.created, 2);
    assert_eq!(loader.diagnostics().len(), 1);
}

#[tokio::test]
async fn test_ambiguous_relation_match_updates_first() {
    let server = MemoryServer::new();
    let loader = setup(&server).await;
    let a_id = server.insert_entity("demo", &["base"], &[("name", "A")]);
    let b_id = server.insert_entity("demo", &["base"], &[("name", "B")]);
    let first = server.insert_relation("demo", "knows", &a_id, &b_id, &[]);
    let second = server.insert_relation("demo", "knows", &a_id, &b_id, &[]);

    let a = loader.make_entity(["person"], None);
    a.set("name", "A");
    let b = loader.make_entity(["person"], None);
    b.set("name", "B");
    let relation = loader.make_relation("knows", &a, &b, None);
    relation.set("since", "2005");
    assert_eq!(relation.relation().await.unwrap().id().unwrap(), first);

    let relations = server.relations();
    assert_eq!(relations.len(), 2);
    let by_id = |id: &str| relations.iter().find(|r| r["id"] == id).unwrap().clone();
    assert_eq!(by_id(&first)["properties"]["since"]["value"], "2005");
    assert!(by_id(&second)["properties"].get("since").is_none());

    let stats = loader.stats();
    assert_eq!(stats.ambiguous, 1);
    assert_eq!(stats.created, 0);
    assert_eq!(stats.updated, 3);
}

#[tokio::test]
async fn test_relation_update_overwrites_schema_and_endpoints() {
    let server = MemoryServer::new();
    let loader = setup(&server).await;
    let a_id = server.insert_entity("demo", &["base"], &[("name", "A")]);
    let b_id = server.insert_entity("demo", &["base"], &[("name", "B")]);
    let existing = server.insert_relation("demo", "met", &a_id, &b_id, &[("place", "Bonn")]);

    let a = loader.make_entity(["person"], None);
    a.set("name", "A");
    let b = loader.make_entity(["person"], None);
    b.set("name", "B");
    let relation = loader.make_relation("knows", &a, &b, None).relation().await.unwrap();
    assert_eq!(relation.id().unwrap(), existing);
    assert_eq!(relation.schema(), Some("knows"));

    let update = server.last_request().unwrap();
    assert_eq!(update.method, Method::Post);
    assert_eq!(update.path, format!("relations/{existing}"));
    let data = update.data.unwrap();
    assert_eq!(data["schema"], "knows");
    assert_eq!(data["source"], a_id.as_str());
    assert_eq!(data["target"], b_id.as_str());

    let stored = server.relations();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0]["schema"]["name"], "knows");
    assert_eq!(stored[0]["properties"]["place"]["value"], "Bonn");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_changes_during_resolution_are_left_out() {
    let server = MemoryServer::new().with_latency(Duration::from_millis(20));
    let loader = setup(&server).await;

    let builder = loader.make_entity(["person"], None);
    builder.set("name", "Racing");
    let saving = tokio::spawn({
        let builder = builder.clone();
        async move { builder.entity().await.unwrap() }
    });
    while builder.state() == BuildState::Pending {
        tokio::task::yield_now().await;
    }
    builder.set("city", "Paris");

    let entity: Entity = saving.await.unwrap();
    assert!(builder.property("city").is_none());
    assert!(entity.property_value("city").is_none());
    let stored = server.entity(entity.id().unwrap()).unwrap();
    assert!(stored["properties"].get("city").is_none());
}
