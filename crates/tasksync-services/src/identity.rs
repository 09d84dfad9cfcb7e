//! Task identity: provisional ids minted locally, canonical ids issued by the
//! service, and the extraction rules that map loosely shaped server responses
//! onto both.
//!
//! Create responses have come back in several shapes over the service's
//! lifetime (bare string, `_id` wrappers, `insertedId` spellings). Extraction
//! is an ordered list of strategies; the first one that yields an id wins.

use serde_json::{Map, Value};

use crate::task::Task;

/// Prefix of every locally minted id.
pub const PROVISIONAL_PREFIX: &str = "local-";

const CANONICAL_LEN: usize = 24;
const SCAN_MIN_LEN: usize = 12;

type Strategy = fn(&Value) -> Option<String>;

/// Extraction strategies in precedence order.
const STRATEGIES: &[(&str, Strategy)] = &[
    ("direct", direct_id),
    ("object_id", object_id),
    ("inserted_id", inserted_id),
    ("hex_scan", hex_scan),
];

const INSERTED_ID_KEYS: &[&str] = &["insertedId", "insertedID", "inserted_id"];

/// Mint a provisional id from the creation time plus a random suffix.
pub fn mint_provisional(now_ms: i64) -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("{}{}-{}", PROVISIONAL_PREFIX, now_ms, &random[..8])
}

pub fn is_provisional(id: &str) -> bool {
    id.starts_with(PROVISIONAL_PREFIX)
}

/// Strict canonical shape: exactly 24 hex characters.
///
/// Only canonical ids are worth an update/delete round-trip; anything else
/// would predictably be rejected by the service.
pub fn is_canonical(id: &str) -> bool {
    is_hex_between(id, CANONICAL_LEN, CANONICAL_LEN)
}

fn is_hex_between(s: &str, min: usize, max: usize) -> bool {
    (min..=max).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Extract the canonical id from a create response.
///
/// `None` is not an error: the caller keeps its provisional id.
pub fn resolve_created_id(response: &Value) -> Option<String> {
    STRATEGIES.iter().find_map(|(name, strategy)| {
        let id = strategy(response)?;
        tracing::debug!("Resolved created id {} via {} strategy", id, name);
        Some(id)
    })
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

fn direct_id(response: &Value) -> Option<String> {
    match response {
        Value::String(s) => non_empty(s),
        Value::Object(map) => ["_id", "id"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str).and_then(non_empty)),
        _ => None,
    }
}

/// `{"$oid": "..."}` or `{"Hex": "..."}` wrapper.
fn unwrap_object_id(value: &Value) -> Option<String> {
    let map = value.as_object()?;
    ["$oid", "Hex"]
        .iter()
        .find_map(|key| map.get(*key).and_then(Value::as_str).and_then(non_empty))
}

fn object_id(response: &Value) -> Option<String> {
    response.get("_id").and_then(unwrap_object_id)
}

fn inserted_id(response: &Value) -> Option<String> {
    let map = response.as_object()?;
    INSERTED_ID_KEYS.iter().find_map(|key| match map.get(*key)? {
        Value::String(s) => non_empty(s),
        nested @ Value::Object(_) => unwrap_object_id(nested),
        _ => None,
    })
}

/// Last resort: any top-level string field that looks like an object id.
fn hex_scan(response: &Value) -> Option<String> {
    response.as_object()?.values().find_map(|v| {
        v.as_str()
            .filter(|s| is_hex_between(s, SCAN_MIN_LEN, CANONICAL_LEN))
            .map(str::to_string)
    })
}

/// Loose truthiness for completion flags coming from the service.
fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

fn snapshot_id(map: &Map<String, Value>) -> Option<String> {
    ["_id", "id"].iter().find_map(|key| match map.get(*key)? {
        Value::String(s) => non_empty(s),
        Value::Number(n) => Some(n.to_string()),
        nested @ Value::Object(_) => unwrap_object_id(nested),
        _ => None,
    })
}

fn snapshot_text(map: &Map<String, Value>) -> Option<String> {
    ["text", "title"]
        .iter()
        .find_map(|key| map.get(*key).and_then(Value::as_str).and_then(non_empty))
}

fn snapshot_created_at(map: &Map<String, Value>) -> Option<i64> {
    let Value::Number(n) = map.get("createdAt")? else {
        return None;
    };
    n.as_i64()
        .or_else(|| n.as_f64().map(|f| f as i64))
        .filter(|ts| *ts != 0)
}

/// Normalize one task-like object from `GET /tasks`.
///
/// Returns `None` for entries that are not objects or carry no usable text.
pub fn normalize_remote_task(value: &Value, now_ms: i64) -> Option<Task> {
    let map = value.as_object()?;
    let text = snapshot_text(map)?;
    Some(Task {
        id: snapshot_id(map).unwrap_or_else(|| mint_provisional(now_ms)),
        text,
        completed: truthy(map.get("completed")),
        created_at: snapshot_created_at(map).unwrap_or(now_ms),
    })
}

/// Normalize a full remote snapshot, keeping server order and the first
/// occurrence of any duplicated id.
pub fn normalize_snapshot(items: &[Value], now_ms: i64) -> Vec<Task> {
    let mut tasks: Vec<Task> = Vec::with_capacity(items.len());
    for item in items {
        match normalize_remote_task(item, now_ms) {
            Some(task) if tasks.iter().any(|t| t.id == task.id) => {
                tracing::warn!("Dropping duplicate task id {} from server snapshot", task.id);
            }
            Some(task) => tasks.push(task),
            None => tracing::warn!("Skipping malformed task in server snapshot: {}", item),
        }
    }
    tasks
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const OID: &str = "650f1c2e9b1e8a0012345678";

    #[test]
    fn test_provisional_ids() {
        let id = mint_provisional(1_700_000_000_000);
        assert!(id.starts_with("local-1700000000000-"));
        assert!(is_provisional(&id));
        assert!(!is_canonical(&id));
        assert_ne!(id, mint_provisional(1_700_000_000_000));
    }

    #[test]
    fn test_is_canonical() {
        assert!(is_canonical(OID));
        assert!(is_canonical("650F1C2E9B1E8A0012345678"));
        assert!(!is_canonical("650f1c2e9b1e8a001234567"));
        assert!(!is_canonical("650f1c2e9b1e8a00123456789"));
        assert!(!is_canonical("zz0f1c2e9b1e8a0012345678"));
        assert!(!is_canonical(""));
    }

    #[test]
    fn test_resolve_bare_string_and_direct_fields() {
        assert_eq!(resolve_created_id(&json!("abc123")).as_deref(), Some("abc123"));
        assert_eq!(resolve_created_id(&json!({"_id": "abc123"})).as_deref(), Some("abc123"));
        assert_eq!(resolve_created_id(&json!({"id": "abc123"})).as_deref(), Some("abc123"));
    }

    #[test]
    fn test_resolve_object_id_wrappers() {
        assert_eq!(
            resolve_created_id(&json!({"_id": {"$oid": OID}})).as_deref(),
            Some(OID)
        );
        assert_eq!(
            resolve_created_id(&json!({"_id": {"Hex": OID}})).as_deref(),
            Some(OID)
        );
    }

    #[test]
    fn test_resolve_inserted_id_spellings() {
        for key in INSERTED_ID_KEYS {
            let mut map = Map::new();
            map.insert(key.to_string(), json!("abc123"));
            assert_eq!(
                resolve_created_id(&Value::Object(map)).as_deref(),
                Some("abc123"),
                "spelling {}",
                key
            );
        }
        assert_eq!(
            resolve_created_id(&json!({"insertedId": {"$oid": OID}})).as_deref(),
            Some(OID)
        );
    }

    #[test]
    fn test_direct_field_beats_inserted_id() {
        let resp = json!({"insertedId": "second", "_id": "first"});
        assert_eq!(resolve_created_id(&resp).as_deref(), Some("first"));
    }

    #[test]
    fn test_resolve_hex_scan_fallback() {
        let resp = json!({"ok": true, "ref": "0123456789ab", "note": "created"});
        assert_eq!(resolve_created_id(&resp).as_deref(), Some("0123456789ab"));

        let too_short = json!({"ref": "0123456789a"});
        assert_eq!(resolve_created_id(&too_short), None);
    }

    #[test]
    fn test_resolve_nothing() {
        assert_eq!(resolve_created_id(&Value::Null), None);
        assert_eq!(resolve_created_id(&json!({"status": "created"})), None);
        assert_eq!(resolve_created_id(&json!({"_id": ""})), None);
        assert_eq!(resolve_created_id(&json!([OID])), None);
    }

    #[test]
    fn test_normalize_title_and_underscore_id() {
        let task = normalize_remote_task(
            &json!({"_id": "x", "title": "buy milk", "completed": true}),
            42,
        )
        .unwrap();
        assert_eq!(task.id, "x");
        assert_eq!(task.text, "buy milk");
        assert!(task.completed);
        assert_eq!(task.created_at, 42);
    }

    #[test]
    fn test_normalize_fallbacks() {
        let task = normalize_remote_task(
            &json!({"id": OID, "text": "walk dog", "completed": 1, "createdAt": 1_699_999_000_000_i64}),
            42,
        )
        .unwrap();
        assert_eq!(task.id, OID);
        assert!(task.completed);
        assert_eq!(task.created_at, 1_699_999_000_000);

        let task = normalize_remote_task(&json!({"text": "no id", "completed": null}), 42).unwrap();
        assert!(is_provisional(&task.id));
        assert!(!task.completed);

        assert!(normalize_remote_task(&json!({"_id": "x", "text": "  "}), 42).is_none());
        assert!(normalize_remote_task(&json!("just a string"), 42).is_none());
    }

    #[test]
    fn test_normalize_snapshot_dedups_and_keeps_order() {
        let items = vec![
            json!({"_id": "a", "text": "first"}),
            json!({"_id": "b", "text": "second"}),
            json!({"_id": "a", "text": "dupe"}),
            json!(7),
        ];
        let tasks = normalize_snapshot(&items, 0);
        let ids: Vec<_> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(tasks[0].text, "first");
    }

    #[test]
    fn test_truthiness() {
        assert!(!truthy(None));
        assert!(!truthy(Some(&json!(0))));
        assert!(!truthy(Some(&json!(""))));
        assert!(truthy(Some(&json!("yes"))));
        assert!(truthy(Some(&json!({}))));
    }
}
