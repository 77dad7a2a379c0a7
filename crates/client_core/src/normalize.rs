//! Mapping of heterogeneous backend records onto canonical entities.
//!
//! Every canonical field has an ordered list of candidate source fields; the
//! first candidate holding a usable value wins. Records without an id are
//! dropped.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use shared::domain::{
    AlertEvent, AlertEventId, AlertRule, AlertRuleId, Instance, InstanceId, Recommendation,
    RecommendationId, RecommendationStatus, Severity,
};
use tracing::debug;

const ENABLED_FIELDS: &[&str] = &["enabled", "isEnabled", "active"];
const STATUS_FIELDS: &[&str] = &["status", "state"];
const SEVERITY_FIELDS: &[&str] = &["severity", "level", "priority"];
const INSTANCE_REF_FIELDS: &[&str] = &["instanceId", "instance_id"];

/// A list item with a stable id, built from a raw backend record.
pub trait Entity: Clone + Send + Sync + 'static {
    /// Returns `None` when no candidate id field holds a non-empty value.
    fn from_raw(raw: Value) -> Option<Self>;

    fn id(&self) -> &str;

    /// Backend payload, with local edits written under canonical keys.
    fn raw(&self) -> &Value;

    fn enabled(&self) -> Option<bool> {
        None
    }

    /// Returns `false` when the entity has no enabled flag.
    fn set_enabled(&mut self, _enabled: bool) -> bool {
        false
    }

    fn status(&self) -> Option<String> {
        None
    }

    /// Returns `false` when the entity has no status field.
    fn set_status(&mut self, _status: &str) -> bool {
        false
    }
}

pub fn pick_string(raw: &Value, candidates: &[&str]) -> Option<String> {
    let map = raw.as_object()?;
    candidates.iter().find_map(|key| match map.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

pub fn pick_bool(raw: &Value, candidates: &[&str]) -> Option<bool> {
    let map = raw.as_object()?;
    candidates.iter().find_map(|key| match map.get(*key)? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

pub fn pick_f64(raw: &Value, candidates: &[&str]) -> Option<f64> {
    let map = raw.as_object()?;
    candidates.iter().find_map(|key| match map.get(*key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

pub fn pick_timestamp(raw: &Value, candidates: &[&str]) -> Option<DateTime<Utc>> {
    let map = raw.as_object()?;
    candidates.iter().find_map(|key| {
        let text = map.get(*key)?.as_str()?;
        DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|ts| ts.with_timezone(&Utc))
    })
}

/// Normalizes a page of raw records, dropping the ones without an id.
pub fn normalize_all<T: Entity>(raws: Vec<Value>) -> Vec<T> {
    let total = raws.len();
    let items: Vec<T> = raws.into_iter().filter_map(T::from_raw).collect();
    if items.len() < total {
        debug!(
            dropped = total - items.len(),
            total, "normalize: dropped records without an id"
        );
    }
    items
}

/// Shallow object merge; keys in `patch` win.
pub fn merge_raw(base: &Value, patch: &Value) -> Value {
    let mut merged = base.as_object().cloned().unwrap_or_default();
    if let Some(patch) = patch.as_object() {
        for (key, value) in patch {
            merged.insert(key.clone(), value.clone());
        }
    }
    Value::Object(merged)
}

/// Re-normalizes `current` with `patch` laid over its raw payload.
///
/// Returns `None` if the patch names a different record or the merge loses the id.
pub fn absorb<T: Entity>(current: &T, patch: &Value) -> Option<T> {
    patch.as_object()?;
    let merged = T::from_raw(merge_raw(current.raw(), patch))?;
    (merged.id() == current.id()).then_some(merged)
}

fn set_raw_field(raw: &mut Value, key: &str, value: Value) {
    if !raw.is_object() {
        *raw = Value::Object(Map::new());
    }
    if let Some(map) = raw.as_object_mut() {
        map.insert(key.to_string(), value);
    }
}

impl Entity for Instance {
    fn from_raw(raw: Value) -> Option<Self> {
        let id = pick_string(
            &raw,
            &["id", "_id", "instanceId", "instance_id", "uuid", "key"],
        )?;
        Some(Self {
            name: pick_string(&raw, &["name", "displayName", "label"]).unwrap_or_else(|| id.clone()),
            uri: pick_string(&raw, &["uri", "connectionString", "url"]).unwrap_or_default(),
            enabled: pick_bool(&raw, ENABLED_FIELDS).unwrap_or(false),
            notes: pick_string(&raw, &["notes", "description"]),
            id: InstanceId(id),
            raw,
        })
    }

    fn id(&self) -> &str {
        self.id.as_str()
    }

    fn raw(&self) -> &Value {
        &self.raw
    }

    fn enabled(&self) -> Option<bool> {
        Some(self.enabled)
    }

    fn set_enabled(&mut self, enabled: bool) -> bool {
        self.enabled = enabled;
        set_raw_field(&mut self.raw, "enabled", Value::Bool(enabled));
        true
    }
}

impl Entity for AlertRule {
    fn from_raw(raw: Value) -> Option<Self> {
        let id = pick_string(&raw, &["id", "_id", "ruleId", "rule_id", "uuid", "key"])?;
        Some(Self {
            name: pick_string(&raw, &["name", "title"]).unwrap_or_else(|| id.clone()),
            enabled: pick_bool(&raw, ENABLED_FIELDS).unwrap_or(true),
            severity: pick_string(&raw, SEVERITY_FIELDS)
                .map(|s| Severity::parse(&s))
                .unwrap_or(Severity::Unknown),
            metric: pick_string(&raw, &["metric", "metricName"]).unwrap_or_default(),
            comparator: pick_string(&raw, &["comparator", "operator", "op"]).unwrap_or_default(),
            threshold: pick_f64(&raw, &["threshold", "value"]),
            instance_id: pick_string(&raw, INSTANCE_REF_FIELDS).map(InstanceId),
            description: pick_string(&raw, &["description"]),
            id: AlertRuleId(id),
            raw,
        })
    }

    fn id(&self) -> &str {
        self.id.as_str()
    }

    fn raw(&self) -> &Value {
        &self.raw
    }

    fn enabled(&self) -> Option<bool> {
        Some(self.enabled)
    }

    fn set_enabled(&mut self, enabled: bool) -> bool {
        self.enabled = enabled;
        set_raw_field(&mut self.raw, "enabled", Value::Bool(enabled));
        true
    }
}

impl Entity for AlertEvent {
    fn from_raw(raw: Value) -> Option<Self> {
        let id = pick_string(&raw, &["id", "_id", "eventId", "event_id", "uuid", "key"])?;
        Some(Self {
            rule_id: pick_string(&raw, &["ruleId", "rule_id"]).map(AlertRuleId),
            severity: pick_string(&raw, SEVERITY_FIELDS)
                .map(|s| Severity::parse(&s))
                .unwrap_or(Severity::Unknown),
            status: pick_string(&raw, STATUS_FIELDS).unwrap_or_else(|| "open".to_string()),
            message: pick_string(&raw, &["message", "summary", "title", "description"])
                .unwrap_or_default(),
            triggered_at: pick_timestamp(
                &raw,
                &["triggeredAt", "triggered_at", "createdAt", "timestamp"],
            ),
            id: AlertEventId(id),
            raw,
        })
    }

    fn id(&self) -> &str {
        self.id.as_str()
    }

    fn raw(&self) -> &Value {
        &self.raw
    }

    fn status(&self) -> Option<String> {
        Some(self.status.clone())
    }

    fn set_status(&mut self, status: &str) -> bool {
        self.status = status.to_string();
        set_raw_field(&mut self.raw, "status", Value::String(status.to_string()));
        true
    }
}

impl Entity for Recommendation {
    fn from_raw(raw: Value) -> Option<Self> {
        let id = pick_string(
            &raw,
            &[
                "id",
                "_id",
                "recommendationId",
                "recommendation_id",
                "uuid",
                "key",
            ],
        )?;
        Some(Self {
            title: pick_string(&raw, &["title", "name"]).unwrap_or_else(|| id.clone()),
            description: pick_string(&raw, &["description", "details", "body"]).unwrap_or_default(),
            kind: pick_string(&raw, &["type", "kind", "category"]).unwrap_or_default(),
            status: pick_string(&raw, STATUS_FIELDS)
                .map(|s| RecommendationStatus::parse(&s))
                .unwrap_or_default(),
            severity: pick_string(&raw, SEVERITY_FIELDS)
                .map(|s| Severity::parse(&s))
                .unwrap_or(Severity::Unknown),
            instance_id: pick_string(&raw, INSTANCE_REF_FIELDS).map(InstanceId),
            id: RecommendationId(id),
            raw,
        })
    }

    fn id(&self) -> &str {
        self.id.as_str()
    }

    fn raw(&self) -> &Value {
        &self.raw
    }

    fn status(&self) -> Option<String> {
        Some(self.status.as_str().to_string())
    }

    fn set_status(&mut self, status: &str) -> bool {
        self.status = RecommendationStatus::parse(status);
        set_raw_field(&mut self.raw, "status", Value::String(status.to_string()));
        true
    }
}

#[cfg(test)]
#[path = "tests/normalize_tests.rs"]
mod tests;
