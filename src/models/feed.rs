use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Change-feed event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Insert,
    Delete,
    Update,
}

/// One push notification from the backend change feed.
///
/// `new_record` is populated for inserts and updates, `old_record` for
/// deletes and updates. Records arrive as raw JSON; the consumer decides
/// what to deserialize them into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_record: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_record: Option<Value>,
}

impl ChangeEvent {
    pub fn insert(record: Value) -> Self {
        Self {
            event_type: EventType::Insert,
            new_record: Some(record),
            old_record: None,
        }
    }

    pub fn delete(record: Value) -> Self {
        Self {
            event_type: EventType::Delete,
            new_record: None,
            old_record: Some(record),
        }
    }
}

/// Frame sent to the change-feed service to open a server-side filtered
/// subscription on a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeFrame {
    pub action: String,
    pub collection: String,
    pub events: Vec<EventType>,
    pub filter: Value,
    pub access_token: String,
}

impl SubscribeFrame {
    pub fn owner_scoped(collection: &str, user_id: &str, access_token: &str) -> Self {
        Self {
            action: "subscribe".to_string(),
            collection: collection.to_string(),
            events: vec![EventType::Insert, EventType::Delete],
            filter: serde_json::json!({ "user_id": user_id }),
            access_token: access_token.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&EventType::Insert).unwrap(),
            "\"insert\""
        );
        assert_eq!(
            serde_json::to_string(&EventType::Delete).unwrap(),
            "\"delete\""
        );
    }

    #[test]
    fn test_change_event_deserializes_without_old_record() {
        let event: ChangeEvent = serde_json::from_value(json!({
            "event_type": "insert",
            "new_record": {"id": "bm_1", "title": "Example"}
        }))
        .unwrap();
        assert_eq!(event.event_type, EventType::Insert);
        assert!(event.new_record.is_some());
        assert!(event.old_record.is_none());
    }

    #[test]
    fn test_owner_scoped_subscribe_frame() {
        let frame = SubscribeFrame::owner_scoped("bookmarks", "user_1", "token");
        assert_eq!(frame.action, "subscribe");
        assert_eq!(frame.events, vec![EventType::Insert, EventType::Delete]);
        assert_eq!(frame.filter, json!({ "user_id": "user_1" }));
    }
}
