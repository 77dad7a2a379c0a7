use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const ITEM_KEYS: &[&str] = &["items", "data", "results"];
/// Keys naming the cursor of the *next* page, in priority order. A bare
/// `cursor` is read as the next cursor, never as an echo of the request.
/// The first key present decides, so `nextCursor: null` ends the list even
/// when `cursor` is also sent.
const CURSOR_KEYS: &[&str] = &["nextCursor", "next_cursor", "cursor"];
const HAS_MORE_KEYS: &[&str] = &["hasMore", "has_more"];

/// One page of a list read, before item normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListPage {
    pub items: Vec<Value>,
    pub next_cursor: Option<String>,
    /// The backend sent a cursor key, even if its value was null.
    pub cursor_signalled: bool,
    pub has_more: Option<bool>,
}

impl ListPage {
    /// Accepts `{ items, nextCursor?, cursor?, hasMore? }` or a bare array.
    pub fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Array(items) => Ok(Self {
                items,
                ..Self::default()
            }),
            Value::Object(map) => Self::from_envelope(map),
            Value::Null => Ok(Self::default()),
            other => Err(format!("unexpected list payload: {other}")),
        }
    }

    fn from_envelope(mut map: Map<String, Value>) -> Result<Self, String> {
        let items = match ITEM_KEYS.iter().find_map(|key| map.remove(*key)) {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => return Err(format!("list items must be an array, got {other}")),
        };

        let mut cursor_signalled = false;
        let mut next_cursor = None;
        for key in CURSOR_KEYS {
            let Some(value) = map.get(*key) else {
                continue;
            };
            cursor_signalled = true;
            next_cursor = match value {
                Value::String(cursor) if !cursor.is_empty() => Some(cursor.clone()),
                Value::Number(cursor) => Some(cursor.to_string()),
                _ => None,
            };
            break;
        }

        let has_more = HAS_MORE_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_bool));

        Ok(Self {
            items,
            next_cursor,
            cursor_signalled,
            has_more,
        })
    }

    /// True when the backend said anything about continuation.
    pub fn has_explicit_signal(&self) -> bool {
        self.cursor_signalled || self.has_more.is_some()
    }
}

/// Envelope shape the backend is expected to send.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEnvelope {
    pub items: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn bare_array_has_no_continuation_signal() {
        let page = ListPage::from_value(json!([{ "id": "a" }])).expect("page");
        assert_eq!(page.items.len(), 1);
        assert!(!page.has_explicit_signal());
    }

    #[test]
    fn null_next_cursor_is_an_explicit_end() {
        let page = ListPage::from_value(json!({ "items": [], "nextCursor": null })).expect("page");
        assert!(page.cursor_signalled);
        assert_eq!(page.next_cursor, None);
    }

    #[test]
    fn reads_next_cursor_before_cursor() {
        let page = ListPage::from_value(json!({
            "items": [{ "id": "a" }],
            "nextCursor": "p2",
            "cursor": "p1"
        }))
        .expect("page");
        assert_eq!(page.next_cursor.as_deref(), Some("p2"));
    }

    #[test]
    fn null_next_cursor_is_not_overridden_by_cursor() {
        let page = ListPage::from_value(json!({
            "items": [{ "id": "a" }],
            "nextCursor": null,
            "cursor": "p1"
        }))
        .expect("page");
        assert!(page.cursor_signalled);
        assert_eq!(page.next_cursor, None);
    }

    #[test]
    fn rejects_non_array_items() {
        assert!(ListPage::from_value(json!({ "items": "nope" })).is_err());
    }
}
