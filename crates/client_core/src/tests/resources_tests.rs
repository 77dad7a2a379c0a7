use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::{Method, Uri},
    Json, Router,
};
use shared::protocol::ListEnvelope;
use tokio::{net::TcpListener, sync::Mutex};

use super::*;

#[derive(Debug, Clone)]
struct RecordedRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Value,
}

#[derive(Clone, Default)]
struct ServerState {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

async fn record(
    State(state): State<ServerState>,
    method: Method,
    uri: Uri,
    Query(query): Query<Vec<(String, String)>>,
    body: String,
) -> Json<Value> {
    let body = serde_json::from_str(&body).unwrap_or(Value::Null);
    let reply = if method == Method::GET {
        serde_json::to_value(ListEnvelope {
            items: vec![json!({ "id": "first" })],
            next_cursor: Some("c2".into()),
        })
        .expect("envelope")
    } else {
        json!({ "ok": true })
    };
    state.requests.lock().await.push(RecordedRequest {
        method,
        path: uri.path().to_string(),
        query,
        body,
    });
    Json(reply)
}

async fn spawn_recording_server() -> Result<(ApiClient, ServerState)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = ServerState::default();
    let app = Router::new().fallback(record).with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((ApiClient::new(format!("http://{addr}/api"))?, state))
}

async fn only_request(state: &ServerState) -> RecordedRequest {
    let requests = state.requests.lock().await;
    assert_eq!(requests.len(), 1, "expected exactly one request");
    requests[0].clone()
}

#[test]
fn query_pairs_prefer_cursor_over_offset() {
    let mut filters = Filters::new();
    filters.insert("severity".into(), "high".into());
    filters.insert("status".into(), String::new());

    let with_cursor = PageQuery {
        filters: filters.clone(),
        limit: 10,
        cursor: Some("c9".into()),
        offset: Some(20),
    };
    assert_eq!(
        with_cursor.to_query_pairs(),
        vec![
            ("severity".to_string(), "high".to_string()),
            ("limit".to_string(), "10".to_string()),
            ("cursor".to_string(), "c9".to_string()),
        ]
    );

    let with_offset = PageQuery {
        filters,
        limit: 10,
        cursor: None,
        offset: Some(20),
    };
    assert!(with_offset
        .to_query_pairs()
        .contains(&("offset".to_string(), "20".to_string())));
}

#[test]
fn mutation_kinds_and_verbs() {
    assert_eq!(Mutation::Enable.kind(), MutationKind::Toggle);
    assert_eq!(
        Mutation::SetStatus("resolved".into()).kind(),
        MutationKind::StatusChange
    );
    assert_eq!(Mutation::Delete.done_verb(), "deleted");
    assert_eq!(
        Mutation::SetStatus("acknowledged".into()).done_verb(),
        "marked acknowledged"
    );
}

#[tokio::test]
async fn fetch_page_sends_filters_limit_and_cursor() -> Result<()> {
    let (api, state) = spawn_recording_server().await?;
    let resource = InstancesResource::new(api);

    let mut filters = Filters::new();
    filters.insert("search".into(), "prod".into());
    let value = resource
        .fetch_page(&PageQuery {
            filters,
            limit: 25,
            cursor: Some("c1".into()),
            offset: None,
        })
        .await?;

    assert_eq!(value["nextCursor"], "c2");
    let request = only_request(&state).await;
    assert_eq!(request.method, Method::GET);
    assert_eq!(request.path, "/api/instances");
    assert_eq!(
        request.query,
        vec![
            ("search".to_string(), "prod".to_string()),
            ("limit".to_string(), "25".to_string()),
            ("cursor".to_string(), "c1".to_string()),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn disabling_a_rule_patches_enabled_false() -> Result<()> {
    let (api, state) = spawn_recording_server().await?;
    let resource = AlertRulesResource::new(api);

    resource.write("r1", &Mutation::Disable).await?;

    let request = only_request(&state).await;
    assert_eq!(request.method, Method::PATCH);
    assert_eq!(request.path, "/api/alerts/rules/r1");
    assert_eq!(request.body, json!({ "enabled": false }));
    Ok(())
}

#[tokio::test]
async fn deleting_an_instance_sends_delete() -> Result<()> {
    let (api, state) = spawn_recording_server().await?;
    let resource = InstancesResource::new(api);

    resource.write("db 1", &Mutation::Delete).await?;

    let request = only_request(&state).await;
    assert_eq!(request.method, Method::DELETE);
    assert_eq!(request.path, "/api/instances/db%201");
    Ok(())
}

#[tokio::test]
async fn ids_are_percent_encoded_in_paths() -> Result<()> {
    let (api, state) = spawn_recording_server().await?;
    let resource = AlertRulesResource::new(api);

    resource.write("a b/c?d", &Mutation::Enable).await?;

    let request = only_request(&state).await;
    assert_eq!(request.path, "/api/alerts/rules/a%20b%2Fc%3Fd");
    assert!(request.query.is_empty());
    Ok(())
}

#[tokio::test]
async fn creating_a_rule_posts_to_the_collection() -> Result<()> {
    let (api, state) = spawn_recording_server().await?;
    let resource = AlertRulesResource::new(api);

    let payload = json!({ "name": "High CPU", "metric": "cpu", "threshold": 90 });
    resource.upsert(None, &payload).await?;

    let request = only_request(&state).await;
    assert_eq!(request.method, Method::POST);
    assert_eq!(request.path, "/api/alerts/rules");
    assert_eq!(request.body, payload);
    Ok(())
}

#[tokio::test]
async fn recommendation_actions_use_dedicated_endpoints() -> Result<()> {
    let (api, state) = spawn_recording_server().await?;
    let resource = RecommendationsResource::new(api);

    resource
        .write("rec1", &Mutation::SetStatus("applied".into()))
        .await?;
    resource
        .write("rec1", &Mutation::SetStatus("snoozed".into()))
        .await?;

    let requests = state.requests.lock().await;
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].method, Method::POST);
    assert_eq!(requests[0].path, "/api/recommendations/rec1/apply");
    assert_eq!(requests[1].method, Method::PATCH);
    assert_eq!(requests[1].path, "/api/recommendations/rec1");
    assert_eq!(requests[1].body, json!({ "status": "snoozed" }));
    Ok(())
}

#[tokio::test]
async fn unsupported_mutations_fail_without_a_request() -> Result<()> {
    let (api, state) = spawn_recording_server().await?;
    let events = AlertEventsResource::new(api.clone());
    let recommendations = RecommendationsResource::new(api);

    let err = events
        .write("e1", &Mutation::Enable)
        .await
        .expect_err("events have no enabled flag");
    assert!(matches!(err, RequestError::Unsupported(_)));

    let err = recommendations
        .upsert(Some("rec1"), &json!({ "title": "x" }))
        .await
        .expect_err("recommendations cannot be edited");
    assert!(matches!(err, RequestError::Unsupported(_)));

    assert!(state.requests.lock().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn event_status_change_patches_status() -> Result<()> {
    let (api, state) = spawn_recording_server().await?;
    let resource = AlertEventsResource::new(api);

    resource
        .write("e1", &Mutation::SetStatus("acknowledged".into()))
        .await?;

    let request = only_request(&state).await;
    assert_eq!(request.method, Method::PATCH);
    assert_eq!(request.path, "/api/alerts/events/e1");
    assert_eq!(request.body, json!({ "status": "acknowledged" }));
    Ok(())
}
