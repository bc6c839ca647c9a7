//! Integration tests for inbound message handling: routing, replies and
//! acknowledgement decisions

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;

use nango_server::nats::ReplyStatus;
use nango_server::{
    Action, ActionContext, ActionError, ActionRegistry, Connection, ConnectionStore, Database,
    DatabaseConfig, Delivery, DieselConnectionStore, Disposition, ErrorKind,
    IntegrationConfigRegistry, MessageChannelManager, OutboundEnvelope, ReplySink, Result,
    ServerContext, ServerError, ServerSettings,
};

const INTEGRATIONS: &str = r#"
integrations:
  - github:
      base_url: https://api.github.com/
  - slack:
      base_url: https://slack.com/api/
      call_auth:
        mode: AUTH_HEADER_TOKEN
"#;

/// Records every published reply
#[derive(Default)]
struct RecordingSink {
    replies: Mutex<Vec<(String, OutboundEnvelope)>>,
    fail: AtomicBool,
}

impl RecordingSink {
    fn replies(&self) -> Vec<(String, OutboundEnvelope)> {
        self.replies.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReplySink for RecordingSink {
    async fn publish_reply(&self, reply_target: &str, envelope: &OutboundEnvelope) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ServerError::Transport("connection closed".to_string()));
        }
        self.replies
            .lock()
            .unwrap()
            .push((reply_target.to_string(), envelope.clone()));
        Ok(())
    }
}

/// Store whose backend is down
struct UnavailableStore;

impl ConnectionStore for UnavailableStore {
    fn insert_unique(&self, _connection: &Connection) -> Result<()> {
        Err(ServerError::StoreUnavailable("database is locked".to_string()))
    }

    fn find(&self, _integration: &str, _user_id: &str) -> Result<Option<Connection>> {
        Err(ServerError::StoreUnavailable("database is locked".to_string()))
    }
}

/// Echoes its input and counts invocations
struct Echo {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Action for Echo {
    async fn execute(&mut self, ctx: &ActionContext, input: Value) -> std::result::Result<Value, ActionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ctx.log().info("echoing");
        Ok(json!({"echo": input, "token": ctx.connection().access_token}))
    }
}

struct Harness {
    _dir: Option<TempDir>,
    manager: MessageChannelManager,
    sink: Arc<RecordingSink>,
    calls: Arc<AtomicUsize>,
}

fn actions(calls: &Arc<AtomicUsize>) -> ActionRegistry {
    let mut registry = ActionRegistry::new();
    for (integration, action) in [("github", "echo"), ("jira", "sync")] {
        let calls = Arc::clone(calls);
        registry.register(integration, action, move || {
            Box::new(Echo {
                calls: Arc::clone(&calls),
            }) as Box<dyn Action>
        });
    }
    registry
}

fn harness_with_store(store: Arc<dyn ConnectionStore>, dir: Option<TempDir>) -> Harness {
    let calls = Arc::new(AtomicUsize::new(0));
    let integrations = IntegrationConfigRegistry::from_yaml_str(INTEGRATIONS).unwrap();
    let ctx = ServerContext::new(ServerSettings::default(), integrations, store, actions(&calls));

    let sink = Arc::new(RecordingSink::default());
    let manager = MessageChannelManager::new(Arc::new(ctx), sink.clone());

    Harness {
        _dir: dir,
        manager,
        sink,
        calls,
    }
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db = Database::new_with_config(
        dir.path().join("nango.db").to_str().unwrap(),
        DatabaseConfig {
            max_connections: 4,
            min_idle: 1,
            ..Default::default()
        },
    )
    .expect("Failed to open database");
    db.ensure_tables().expect("Failed to create tables");

    harness_with_store(Arc::new(DieselConnectionStore::new(db)), Some(dir))
}

fn register(integration: &str, user_id: &str, token: &str) -> Delivery {
    Delivery {
        payload: json!({
            "action": "REGISTER_CONNECTION",
            "integration": integration,
            "userId": user_id,
            "oAuthAccessToken": token,
            "additionalConfig": {}
        })
        .to_string()
        .into_bytes(),
        reply_target: None,
        correlation_id: None,
    }
}

fn trigger(integration: &str, user_id: &str, action: &str, input: Value, correlation_id: &str) -> Delivery {
    Delivery {
        payload: json!({
            "action": "TRIGGER_ACTION",
            "integration": integration,
            "userId": user_id,
            "triggeredAction": action,
            "input": input
        })
        .to_string()
        .into_bytes(),
        reply_target: Some("client.replies".to_string()),
        correlation_id: Some(correlation_id.to_string()),
    }
}

fn error_kind(envelope: &OutboundEnvelope) -> ErrorKind {
    envelope.error.as_ref().expect("expected an error reply").kind
}

#[tokio::test]
async fn test_duplicate_register_is_acknowledged_without_reply() {
    let h = harness();

    assert_eq!(h.manager.handle(register("github", "user1", "tok-a")).await, Disposition::Ack);
    assert_eq!(h.manager.handle(register("github", "user1", "tok-b")).await, Disposition::Ack);

    assert!(h.sink.replies().is_empty());
    let stored = h
        .manager
        .context()
        .connections
        .lookup("github", "user1")
        .await
        .unwrap();
    assert_eq!(stored.access_token, "tok-a");
}

#[tokio::test]
async fn test_trigger_without_connection_replies_connection_not_found() {
    let h = harness();

    let input = json!({"channelId": "C1", "msg": "hi"});
    let disposition = h.manager.handle(trigger("slack", "user1", "notify", input, "corr-1")).await;

    assert_eq!(disposition, Disposition::Ack);
    let replies = h.sink.replies();
    assert_eq!(replies.len(), 1);
    let (target, envelope) = &replies[0];
    assert_eq!(target, "client.replies");
    assert_eq!(envelope.correlation_id, "corr-1");
    assert_eq!(envelope.status, ReplyStatus::Error);
    assert_eq!(error_kind(envelope), ErrorKind::ConnectionNotFound);
}

#[tokio::test]
async fn test_trigger_unimplemented_action_replies_action_not_found() {
    let h = harness();
    h.manager.handle(register("github", "user1", "tok-a")).await;

    let disposition = h
        .manager
        .handle(trigger("github", "user1", "list-repos", json!({}), "corr-2"))
        .await;

    assert_eq!(disposition, Disposition::Ack);
    let replies = h.sink.replies();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].1.correlation_id, "corr-2");
    assert_eq!(error_kind(&replies[0].1), ErrorKind::ActionNotFound);
}

#[tokio::test]
async fn test_trigger_unconfigured_integration_never_dispatches() {
    let h = harness();
    h.manager.handle(register("jira", "user1", "tok-j")).await;

    let disposition = h
        .manager
        .handle(trigger("jira", "user1", "sync", json!({}), "corr-3"))
        .await;

    assert_eq!(disposition, Disposition::Ack);
    let replies = h.sink.replies();
    assert_eq!(replies.len(), 1);
    assert_eq!(error_kind(&replies[0].1), ErrorKind::IntegrationNotFound);
    assert_eq!(h.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_trigger_success_replies_with_action_output() {
    let h = harness();
    h.manager.handle(register("github", "user1", "tok-a")).await;

    let disposition = h
        .manager
        .handle(trigger("github", "user1", "echo", json!({"page": 2}), "corr-4"))
        .await;

    assert_eq!(disposition, Disposition::Ack);
    let replies = h.sink.replies();
    assert_eq!(replies.len(), 1);
    let envelope = &replies[0].1;
    assert_eq!(envelope.status, ReplyStatus::Ok);
    assert_eq!(envelope.correlation_id, "corr-4");
    assert_eq!(
        envelope.result,
        Some(json!({"echo": {"page": 2}, "token": "tok-a"}))
    );
    assert_eq!(h.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_malformed_and_unknown_messages_are_rejected() {
    let h = harness();

    let malformed = Delivery {
        payload: b"{not json".to_vec(),
        ..Default::default()
    };
    assert_eq!(h.manager.handle(malformed).await, Disposition::Reject);

    let unknown = Delivery {
        payload: br#"{"action":"DELETE_CONNECTION","integration":"github","userId":"user1"}"#.to_vec(),
        reply_target: Some("client.replies".to_string()),
        correlation_id: Some("corr-5".to_string()),
    };
    assert_eq!(h.manager.handle(unknown).await, Disposition::Reject);

    assert!(h.sink.replies().is_empty());
}

#[tokio::test]
async fn test_trigger_without_reply_metadata_is_rejected() {
    let h = harness();

    let mut delivery = trigger("github", "user1", "echo", json!({}), "corr-6");
    delivery.reply_target = None;

    assert_eq!(h.manager.handle(delivery).await, Disposition::Reject);
    assert!(h.sink.replies().is_empty());
}

#[tokio::test]
async fn test_store_outage_leaves_messages_for_redelivery() {
    let h = harness_with_store(Arc::new(UnavailableStore), None);

    assert_eq!(
        h.manager.handle(register("github", "user1", "tok-a")).await,
        Disposition::Redeliver
    );
    assert_eq!(
        h.manager
            .handle(trigger("github", "user1", "echo", json!({}), "corr-7"))
            .await,
        Disposition::Redeliver
    );

    // No fabricated reply for infrastructure failures
    assert!(h.sink.replies().is_empty());
}

#[tokio::test]
async fn test_reply_publish_failure_leaves_message_for_redelivery() {
    let h = harness();
    h.sink.fail.store(true, Ordering::SeqCst);

    let disposition = h
        .manager
        .handle(trigger("slack", "user1", "notify", json!({}), "corr-8"))
        .await;

    assert_eq!(disposition, Disposition::Redeliver);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_triggers_each_get_one_correlated_reply() {
    let h = Arc::new(harness());
    h.manager.handle(register("github", "user1", "tok-a")).await;

    let mut handles = Vec::new();
    for i in 0..10 {
        let h = Arc::clone(&h);
        handles.push(tokio::spawn(async move {
            let action = if i % 2 == 0 { "echo" } else { "missing" };
            h.manager
                .handle(trigger("github", "user1", action, json!({"i": i}), &format!("corr-{}", i)))
                .await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), Disposition::Ack);
    }

    let mut ids: Vec<String> = h
        .sink
        .replies()
        .into_iter()
        .map(|(_, envelope)| envelope.correlation_id)
        .collect();
    ids.sort();
    let mut expected: Vec<String> = (0..10).map(|i| format!("corr-{}", i)).collect();
    expected.sort();
    assert_eq!(ids, expected);
}
