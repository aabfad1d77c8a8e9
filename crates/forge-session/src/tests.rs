//! Session store tests covering ordering, limits, and clearing.
use super::{ChatMessageRecord, ChatRole, SessionStore};

fn record(session_id: &str, content: &str) -> ChatMessageRecord {
    ChatMessageRecord::new(session_id, ChatRole::User, content)
}

#[test]
fn preserves_append_order() {
    let store = SessionStore::new();
    store.append(record("s1", "first"));
    store.append(record("s1", "second"));
    store.append(record("s1", "third"));

    let messages = store.read("s1", None);
    let contents = messages
        .iter()
        .map(|message| message.content.as_str())
        .collect::<Vec<_>>();
    assert_eq!(contents, vec!["first", "second", "third"]);
}

#[test]
fn unknown_session_reads_empty() {
    let store = SessionStore::new();
    assert!(store.read("missing", None).is_empty());
    assert!(store.read("missing", Some(5)).is_empty());
}

#[test]
fn limit_returns_suffix_in_original_order() {
    let store = SessionStore::new();
    store.append(record("s1", "hello"));
    store.append(record("s1", "world"));

    let limited = store.read("s1", Some(1));
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].content, "world");

    let oversized = store.read("s1", Some(10));
    assert_eq!(oversized.len(), 2);
    assert_eq!(oversized[0].content, "hello");
}

#[test]
fn clear_is_idempotent() {
    let store = SessionStore::new();
    store.append(record("s1", "hello"));

    store.clear("s1");
    assert!(store.read("s1", None).is_empty());

    // absent session: no panic, no error
    store.clear("s1");
    store.clear("never-existed");
}

#[test]
fn tracks_active_sessions() {
    let store = SessionStore::new();
    assert!(store.active_sessions().is_empty());

    store.append(record("s2", "b"));
    store.append(record("s1", "a"));
    assert_eq!(store.active_sessions(), vec!["s1", "s2"]);

    store.clear("s1");
    assert_eq!(store.active_sessions(), vec!["s2"]);
}

#[test]
fn sessions_are_isolated() {
    let store = SessionStore::new();
    store.append(record("s1", "one"));
    store.append(record("s2", "two"));

    assert_eq!(store.read("s1", None).len(), 1);
    assert_eq!(store.read("s2", None).len(), 1);
    assert_eq!(store.read("s1", None)[0].content, "one");
}

#[test]
fn records_carry_optional_fields() {
    let record = ChatMessageRecord::new("s1", ChatRole::Assistant, "hi")
        .with_user_id("user_7")
        .with_metadata(serde_json::json!({ "intent": "greeting" }));

    assert_eq!(record.user_id.as_deref(), Some("user_7"));
    assert_eq!(
        record
            .metadata
            .as_ref()
            .and_then(|metadata| metadata.get("intent"))
            .and_then(|value| value.as_str()),
        Some("greeting")
    );
}
