use std::{collections::HashMap, sync::Arc};

use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use serde_json::json;
use shared::error::ErrorBody;
use tokio::{net::TcpListener, sync::Mutex};

use super::*;

#[derive(Clone, Default)]
struct ServerState {
    queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
}

async fn list_items(
    State(state): State<ServerState>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    state.queries.lock().await.push(query);
    Json(json!([{ "id": "i1", "name": "primary" }]))
}

async fn spawn_api_server() -> Result<(String, ServerState)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = ServerState::default();
    let app = Router::new()
        .route("/api/items", get(list_items))
        .route("/api/missing", get(|| async { StatusCode::NOT_FOUND }))
        .route(
            "/api/boom",
            get(|| async {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorBody::detail("database unavailable")),
                )
            }),
        )
        .route(
            "/api/plain",
            get(|| async { (StatusCode::BAD_GATEWAY, "upstream went away") }),
        )
        .route("/api/items/i1", delete(|| async { StatusCode::NO_CONTENT }))
        .route("/api/garbage", get(|| async { "{not json" }))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}/api/"), state))
}

#[tokio::test]
async fn request_returns_parsed_json_and_sends_query() -> Result<()> {
    let (base_url, state) = spawn_api_server().await?;
    let client = ApiClient::new(base_url)?;

    let data = client
        .request(
            "/items",
            RequestOptions::get().with_query([("severity", "high"), ("limit", "25")]),
        )
        .await?;

    assert_eq!(data, json!([{ "id": "i1", "name": "primary" }]));
    let queries = state.queries.lock().await;
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].get("severity").map(String::as_str), Some("high"));
    assert_eq!(queries[0].get("limit").map(String::as_str), Some("25"));
    Ok(())
}

#[tokio::test]
async fn base_url_trailing_slash_is_trimmed() -> Result<()> {
    let client = ApiClient::new("  http://127.0.0.1:3001/api/  ")?;
    assert_eq!(client.base_url(), "http://127.0.0.1:3001/api");
    Ok(())
}

#[tokio::test]
async fn not_found_is_classified_without_a_body() -> Result<()> {
    let (base_url, _) = spawn_api_server().await?;
    let client = ApiClient::new(base_url)?;

    let err = client
        .request("missing", RequestOptions::get())
        .await
        .expect_err("404 must fail");
    assert!(err.is_not_found());
    assert_eq!(err.user_message(), "Request failed (404)");
    Ok(())
}

#[tokio::test]
async fn error_detail_becomes_the_message() -> Result<()> {
    let (base_url, _) = spawn_api_server().await?;
    let client = ApiClient::new(base_url)?;

    let err = client
        .request("boom", RequestOptions::get())
        .await
        .expect_err("500 must fail");
    assert_eq!(err.status(), Some(500));
    assert_eq!(err.user_message(), "database unavailable");
    assert!(!err.is_network());

    let err = client
        .request("plain", RequestOptions::get())
        .await
        .expect_err("502 must fail");
    assert_eq!(err.user_message(), "Request failed (502)");
    assert!(err.is_network());
    Ok(())
}

#[tokio::test]
async fn empty_success_body_is_null() -> Result<()> {
    let (base_url, _) = spawn_api_server().await?;
    let client = ApiClient::new(base_url)?;

    let data = client.request("items/i1", RequestOptions::delete()).await?;
    assert_eq!(data, Value::Null);
    Ok(())
}

#[tokio::test]
async fn malformed_success_body_is_a_decode_error() -> Result<()> {
    let (base_url, _) = spawn_api_server().await?;
    let client = ApiClient::new(base_url)?;

    let err = client
        .request("garbage", RequestOptions::get())
        .await
        .expect_err("bad json must fail");
    assert!(matches!(err, RequestError::Decode(_)));
    Ok(())
}

#[tokio::test]
async fn try_request_reports_status_instead_of_failing() -> Result<()> {
    let (base_url, _) = spawn_api_server().await?;
    let client = ApiClient::new(base_url)?;

    let ok = client.try_request("items", RequestOptions::get()).await;
    assert!(ok.ok);
    assert_eq!(ok.status, Some(200));
    assert!(ok.data.is_some());

    let missing = client.try_request("missing", RequestOptions::get()).await;
    assert!(!missing.ok);
    assert_eq!(missing.status, Some(404));
    assert!(missing.data.is_none());
    assert!(missing.error.is_some_and(|err| err.is_not_found()));
    Ok(())
}

#[tokio::test]
async fn refused_connection_is_a_network_error() -> Result<()> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let client = ApiClient::new(format!("http://{addr}/api"))?;
    let response = client.try_request("items", RequestOptions::get()).await;

    assert!(!response.ok);
    assert_eq!(response.status, None);
    assert!(response.error.is_some_and(|err| err.is_network()));
    Ok(())
}
