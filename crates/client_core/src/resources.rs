//! Per-domain list resources backed by [`ApiClient`].

use async_trait::async_trait;
use serde_json::{json, Value};
use shared::domain::{AlertEvent, AlertRule, Instance, Recommendation, RecommendationStatus};

use crate::{
    api_client::{ApiClient, RequestOptions},
    error::RequestError,
    list_state::Filters,
    normalize::Entity,
};

/// One list read: current filters plus either a cursor or an offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub filters: Filters,
    pub limit: usize,
    pub cursor: Option<String>,
    /// Used only when appending without a cursor.
    pub offset: Option<usize>,
}

impl PageQuery {
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .filters
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        pairs.push(("limit".to_string(), self.limit.to_string()));
        if let Some(cursor) = &self.cursor {
            pairs.push(("cursor".to_string(), cursor.clone()));
        } else if let Some(offset) = self.offset {
            pairs.push(("offset".to_string(), offset.to_string()));
        }
        pairs
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Enable,
    Disable,
    SetStatus(String),
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Toggle,
    StatusChange,
    Delete,
    Upsert,
}

impl Mutation {
    pub fn kind(&self) -> MutationKind {
        match self {
            Self::Enable | Self::Disable => MutationKind::Toggle,
            Self::SetStatus(_) => MutationKind::StatusChange,
            Self::Delete => MutationKind::Delete,
        }
    }

    /// Past-tense verb for success notifications.
    pub fn done_verb(&self) -> String {
        match self {
            Self::Enable => "enabled".to_string(),
            Self::Disable => "disabled".to_string(),
            Self::SetStatus(status) => format!("marked {status}"),
            Self::Delete => "deleted".to_string(),
        }
    }
}

#[async_trait]
pub trait ListResource: Send + Sync {
    type Item: Entity;

    /// Singular, lowercase noun used in notifications ("alert rule").
    fn label(&self) -> &'static str;

    async fn fetch_page(&self, query: &PageQuery) -> Result<Value, RequestError>;

    /// Returns the server's representation of the item, or an acknowledgement.
    async fn write(&self, id: &str, mutation: &Mutation) -> Result<Value, RequestError>;

    /// Creates (`id == None`) or replaces an item.
    async fn upsert(&self, _id: Option<&str>, _payload: &Value) -> Result<Value, RequestError> {
        Err(RequestError::Unsupported(format!(
            "saving a {} is not available",
            self.label()
        )))
    }
}

fn unsupported(label: &str, mutation: &Mutation) -> RequestError {
    RequestError::Unsupported(format!("{label} cannot be {}", mutation.done_verb()))
}

async fn fetch_collection(
    api: &ApiClient,
    collection: &str,
    query: &PageQuery,
) -> Result<Value, RequestError> {
    api.request(
        collection,
        RequestOptions::get().with_query(query.to_query_pairs()),
    )
    .await
}

async fn toggle_or_delete(
    api: &ApiClient,
    collection: &str,
    label: &str,
    id: &str,
    mutation: &Mutation,
) -> Result<Value, RequestError> {
    match mutation {
        Mutation::Enable => {
            let options = RequestOptions::patch(json!({ "enabled": true })).at(id);
            api.request(collection, options).await
        }
        Mutation::Disable => {
            let options = RequestOptions::patch(json!({ "enabled": false })).at(id);
            api.request(collection, options).await
        }
        Mutation::Delete => api.request(collection, RequestOptions::delete().at(id)).await,
        Mutation::SetStatus(_) => Err(unsupported(label, mutation)),
    }
}

async fn save(
    api: &ApiClient,
    collection: &str,
    id: Option<&str>,
    payload: &Value,
) -> Result<Value, RequestError> {
    match id {
        Some(id) => {
            api.request(collection, RequestOptions::put(payload.clone()).at(id))
                .await
        }
        None => api.request(collection, RequestOptions::post(payload.clone())).await,
    }
}

pub struct InstancesResource {
    api: ApiClient,
}

impl InstancesResource {
    const COLLECTION: &'static str = "/instances";

    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ListResource for InstancesResource {
    type Item = Instance;

    fn label(&self) -> &'static str {
        "instance"
    }

    async fn fetch_page(&self, query: &PageQuery) -> Result<Value, RequestError> {
        fetch_collection(&self.api, Self::COLLECTION, query).await
    }

    async fn write(&self, id: &str, mutation: &Mutation) -> Result<Value, RequestError> {
        toggle_or_delete(&self.api, Self::COLLECTION, self.label(), id, mutation).await
    }

    async fn upsert(&self, id: Option<&str>, payload: &Value) -> Result<Value, RequestError> {
        save(&self.api, Self::COLLECTION, id, payload).await
    }
}

pub struct AlertRulesResource {
    api: ApiClient,
}

impl AlertRulesResource {
    const COLLECTION: &'static str = "/alerts/rules";

    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ListResource for AlertRulesResource {
    type Item = AlertRule;

    fn label(&self) -> &'static str {
        "alert rule"
    }

    async fn fetch_page(&self, query: &PageQuery) -> Result<Value, RequestError> {
        fetch_collection(&self.api, Self::COLLECTION, query).await
    }

    async fn write(&self, id: &str, mutation: &Mutation) -> Result<Value, RequestError> {
        toggle_or_delete(&self.api, Self::COLLECTION, self.label(), id, mutation).await
    }

    async fn upsert(&self, id: Option<&str>, payload: &Value) -> Result<Value, RequestError> {
        save(&self.api, Self::COLLECTION, id, payload).await
    }
}

/// Fired alerts; read-only apart from status changes (acknowledge/resolve).
pub struct AlertEventsResource {
    api: ApiClient,
}

impl AlertEventsResource {
    const COLLECTION: &'static str = "/alerts/events";

    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ListResource for AlertEventsResource {
    type Item = AlertEvent;

    fn label(&self) -> &'static str {
        "alert event"
    }

    async fn fetch_page(&self, query: &PageQuery) -> Result<Value, RequestError> {
        fetch_collection(&self.api, Self::COLLECTION, query).await
    }

    async fn write(&self, id: &str, mutation: &Mutation) -> Result<Value, RequestError> {
        match mutation {
            Mutation::SetStatus(status) => {
                self.api
                    .request(
                        Self::COLLECTION,
                        RequestOptions::patch(json!({ "status": status })).at(id),
                    )
                    .await
            }
            other => Err(unsupported(self.label(), other)),
        }
    }
}

pub struct RecommendationsResource {
    api: ApiClient,
}

impl RecommendationsResource {
    const COLLECTION: &'static str = "/recommendations";

    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    async fn set_status(&self, id: &str, status: &str) -> Result<Value, RequestError> {
        let action = match RecommendationStatus::parse(status) {
            RecommendationStatus::Applied => "apply",
            RecommendationStatus::Dismissed => "dismiss",
            RecommendationStatus::Open => "restore",
            RecommendationStatus::Other(_) => {
                return self
                    .api
                    .request(
                        Self::COLLECTION,
                        RequestOptions::patch(json!({ "status": status })).at(id),
                    )
                    .await;
            }
        };
        self.api
            .request(
                Self::COLLECTION,
                RequestOptions::post(json!({})).at(id).at(action),
            )
            .await
    }
}

#[async_trait]
impl ListResource for RecommendationsResource {
    type Item = Recommendation;

    fn label(&self) -> &'static str {
        "recommendation"
    }

    async fn fetch_page(&self, query: &PageQuery) -> Result<Value, RequestError> {
        fetch_collection(&self.api, Self::COLLECTION, query).await
    }

    async fn write(&self, id: &str, mutation: &Mutation) -> Result<Value, RequestError> {
        match mutation {
            Mutation::SetStatus(status) => self.set_status(id, status).await,
            other => Err(unsupported(self.label(), other)),
        }
    }
}

#[cfg(test)]
#[path = "tests/resources_tests.rs"]
mod tests;
