use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use deckhand::authoring::{
    AuthorResult, BatchSettings, DocumentSchema, MemoryClient, ReconcileOptions,
    ReconciliationEngine, RemoteError, RemoteOp, ResourceItem, ResourceSchema, Severity,
};
use deckhand::telemetry::init_test_logging;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

fn schema() -> DocumentSchema {
    DocumentSchema::new("leaderboards", "Leaderboard", "lb")
}

fn batch(size: usize) -> BatchSettings {
    BatchSettings {
        batch_size: size,
        delay: Duration::from_secs(1),
    }
}

fn local(id: &str, content: Value) -> ResourceItem<Value> {
    ResourceItem::local(id, id, format!("{}.lb", id.to_lowercase()), content)
}

fn ids<P>(items: &[ResourceItem<P>]) -> Vec<String> {
    items.iter().map(|item| item.id.clone()).collect()
}

/// Asserts the deploy partition: every accepted item lands in exactly one list.
fn assert_partition<P>(result: &AuthorResult<P>, expected_ids: &[&str]) {
    let lists = [
        &result.created,
        &result.updated,
        &result.deleted,
        &result.unchanged,
        &result.failed,
    ];
    let keys: Vec<(String, String)> = lists
        .iter()
        .flat_map(|list| list.iter())
        .map(|item| (item.id.clone(), item.path.display().to_string()))
        .collect();
    let unique: HashSet<&(String, String)> = keys.iter().collect();
    assert_eq!(keys.len(), unique.len(), "lists overlap: {:?}", keys);

    let expected: HashSet<String> = expected_ids.iter().map(|s| s.to_string()).collect();
    let actual: HashSet<String> = keys.into_iter().map(|(id, _)| id).collect();
    assert_eq!(actual, expected);
}

#[tokio::test(start_paused = true)]
async fn test_create_update_delete_example() {
    init_test_logging();
    let schema = schema();
    let client = MemoryClient::with_items(vec![
        ResourceItem::remote("B", "B", json!({"sortOrder": "asc"})),
        ResourceItem::remote("C", "C", json!({"sortOrder": "asc"})),
    ]);
    let engine = ReconciliationEngine::new(&schema, &client, batch(10));

    let result = engine
        .deploy(
            vec![
                local("A", json!({"sortOrder": "asc"})),
                local("B", json!({"sortOrder": "desc"})),
            ],
            ReconcileOptions::default().reconcile(true),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(ids(&result.created), vec!["A"]);
    assert_eq!(ids(&result.updated), vec!["B"]);
    assert_eq!(ids(&result.deleted), vec!["C"]);
    assert!(result.failed.is_empty());
    assert_partition(&result, &["A", "B", "C"]);
}

#[tokio::test(start_paused = true)]
async fn test_partition_holds_with_failures_and_duplicates() {
    let schema = schema();
    let client = MemoryClient::with_items(vec![
        ResourceItem::remote("same", "same", json!({"v": 1})),
        ResourceItem::remote("changed", "changed", json!({"v": 1})),
        ResourceItem::remote("orphan", "orphan", json!({})),
    ]);
    client.fail_on(RemoteOp::Update, "changed", RemoteError::with_status("conflict", 409));
    let engine = ReconciliationEngine::new(&schema, &client, batch(2));

    let result = engine
        .deploy(
            vec![
                local("same", json!({"v": 1})),
                local("changed", json!({"v": 2})),
                local("new", json!({})),
                ResourceItem::local("dup", "dup", "one.lb", json!({})),
                ResourceItem::local("dup", "dup", "two.lb", json!({})),
            ],
            ReconcileOptions::default().reconcile(true),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_partition(&result, &["same", "changed", "new", "dup", "orphan"]);
    assert_eq!(ids(&result.failed), vec!["dup", "dup", "changed"]);
    assert_eq!(ids(&result.unchanged), vec!["same"]);
    assert_eq!(result.exit_code(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_all_duplicates_are_rejected() {
    let schema = schema();
    let client = MemoryClient::new();
    let engine = ReconciliationEngine::new(&schema, &client, batch(10));

    let copies = (0..3)
        .map(|i| ResourceItem::local("shared", "shared", format!("copy{}.lb", i), json!({})))
        .collect();
    let result = engine
        .deploy(copies, ReconcileOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.failed.len(), 3);
    assert!(result.created.is_empty() && result.updated.is_empty());
    assert_eq!(client.calls().mutations(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_dry_run_plans_without_calls() {
    let schema = schema();
    let client = MemoryClient::with_items(vec![ResourceItem::remote("gone", "gone", json!({}))]);
    let engine = ReconciliationEngine::new(&schema, &client, batch(2));

    let local_items = (0..25).map(|i| local(&format!("R{}", i), json!({"i": i}))).collect();
    let result = engine
        .deploy(
            local_items,
            ReconcileOptions::default().dry_run(true).reconcile(true),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(client.calls().mutations(), 0);
    assert_eq!(result.created.len(), 25);
    assert_eq!(result.deleted.len(), 1);
    assert!(result.items().all(|i| i.status.severity == Severity::Info));
    assert!(result.to_string().contains("Will create:"));
}

#[tokio::test(start_paused = true)]
async fn test_second_deploy_is_a_no_op() {
    let schema = schema();
    let client = MemoryClient::with_items(vec![ResourceItem::remote("keep", "keep", json!({}))]);
    let engine = ReconciliationEngine::new(&schema, &client, batch(10));
    let local_items = || {
        vec![
            local("A", json!({"tiers": [1, 2]})),
            local("B", json!({"reset": "weekly"})),
        ]
    };

    let first = engine
        .deploy(local_items(), ReconcileOptions::default(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(first.created.len(), 2);

    let calls_before = client.calls().mutations();
    let second = engine
        .deploy(local_items(), ReconcileOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(second.is_empty());
    assert_eq!(ids(&second.unchanged), vec!["A", "B"]);
    assert_eq!(client.calls().mutations(), calls_before);
    assert_eq!(second.to_string().lines().next(), Some("Successfully deployed the following:"));
}

#[tokio::test(start_paused = true)]
async fn test_empty_local_with_reconcile_deletes_everything() {
    let schema = schema();
    let client = MemoryClient::with_items(vec![
        ResourceItem::remote("x", "x", json!({})),
        ResourceItem::remote("y", "y", json!({})),
    ]);
    let engine = ReconciliationEngine::new(&schema, &client, batch(10));

    let result = engine
        .deploy(
            Vec::new(),
            ReconcileOptions::default().reconcile(true),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(ids(&result.deleted), vec!["x", "y"]);
    assert!(client.items().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_mutations_run_in_delayed_waves() {
    let schema = schema();
    let client = MemoryClient::new().with_latency(Duration::from_millis(100));
    let engine = ReconciliationEngine::new(&schema, &client, batch(2));
    let start = tokio::time::Instant::now();

    let local_items = (0..5).map(|i| local(&format!("R{}", i), json!({}))).collect();
    let result = engine
        .deploy(local_items, ReconcileOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.created.len(), 5);
    assert_eq!(client.max_in_flight(), 2);
    // Three waves of 100ms each, separated by two 1s delays.
    assert_eq!(start.elapsed(), Duration::from_millis(2300));
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Trigger {
    event_type: String,
    action_urn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    filter: Option<String>,
}

/// Triggers are addressed by their event type, and filters compare without
/// surrounding whitespace.
struct TriggerSchema;

impl ResourceSchema for TriggerSchema {
    type Payload = Trigger;

    fn service(&self) -> &str {
        "triggers"
    }

    fn type_name(&self) -> &str {
        "Trigger"
    }

    fn file_extension(&self) -> &str {
        "tr"
    }

    fn identifier(&self, _name: &str, payload: &Trigger) -> String {
        payload.event_type.clone()
    }

    fn content_eq(&self, local: &Trigger, remote: &Trigger) -> bool {
        let trimmed = |t: &Trigger| t.filter.as_deref().map(str::trim).map(str::to_string);
        local.event_type == remote.event_type
            && local.action_urn == remote.action_urn
            && trimmed(local) == trimmed(remote)
    }
}

#[tokio::test(start_paused = true)]
async fn test_typed_schema_uses_its_comparer() {
    let schema = TriggerSchema;
    let remote = Trigger {
        event_type: "player.created".to_string(),
        action_urn: "urn:cloud-code:welcome".to_string(),
        filter: Some("level > 1".to_string()),
    };
    let client = MemoryClient::with_items(vec![ResourceItem::remote(
        "player.created",
        "welcome",
        remote.clone(),
    )]);
    let engine = ReconciliationEngine::new(&schema, &client, batch(10));

    let loader_fs = deckhand::authoring::LocalFileSystem;
    let loader = deckhand::authoring::ResourceLoader::new(&schema, &loader_fs);
    let items = loader
        .parse(
            "welcome:\n  eventType: player.created\n  actionUrn: urn:cloud-code:welcome\n  filter: '  level > 1 '\n",
            Path::new("welcome.tr"),
        )
        .unwrap();
    assert_eq!(items[0].id, "player.created");

    let result = engine
        .deploy(items, ReconcileOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(result.is_empty());
    assert_eq!(result.unchanged.len(), 1);
    assert_eq!(client.items()[0].content, Some(remote));
}
