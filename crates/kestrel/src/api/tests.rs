//! Integration tests for the host HTTP API.
//!
//! Plain HTTP endpoints are driven in-process with `tower::ServiceExt::oneshot()`.
//! Channel tests bind a real listener and talk WebSocket through
//! `tokio-tungstenite`.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use http_body_util::BodyExt;
use kestrel_gateway::{BucketLimits, PluginManifest};
use kestrel_telemetry::MetricsRegistry;
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message;
use tower::ServiceExt;

use super::router::{create_router, AppState};
use crate::config::KestrelConfig;
use crate::server::build_state;

// ---------------------------------------------------------------------------
// Test harness
// ---------------------------------------------------------------------------

fn manifest(name: &str, topics: &[&str]) -> PluginManifest {
    let topics: Vec<String> = topics.iter().map(|t| format!("\"{}\"", t)).collect();
    PluginManifest::from_toml(&format!(
        r#"
[plugin]
name = "{}"
version = "1.0.0"
entry = "index.html"

[permissions]
topics = [{}]
"#,
        name,
        topics.join(", ")
    ))
    .unwrap()
}

/// Router state with `ticker` and `listener` loaded.
fn make_state(config: KestrelConfig) -> AppState {
    let state = build_state(&config, Arc::new(MetricsRegistry::new())).unwrap();
    state
        .gateway
        .load_plugin(manifest("ticker", &["public:tick"]))
        .unwrap();
    state.gateway.load_plugin(manifest("listener", &[])).unwrap();
    state
}

fn make_app() -> (AppState, Router) {
    let state = make_state(KestrelConfig::default());
    let app = create_router(state.clone());
    (state, app)
}

/// Send one request through the router and return the response parts.
async fn send(app: Router, req: Request<Body>) -> (StatusCode, header::HeaderMap, Bytes) {
    let resp: Response = app.oneshot(req).await.expect("router returned error");
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    (status, headers, body)
}

/// Parse body bytes as JSON.
fn json_body(body: &Bytes) -> Value {
    serde_json::from_slice(body).expect("response is not valid JSON")
}

fn empty_req(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Build a batch submission for `app_id`.
fn batch_req(app_id: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/batch")
        .header("content-type", "application/json")
        .header("x-app-id", app_id)
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn batch(id: &str, calls: Value) -> Value {
    json!({ "type": "api:batch", "id": id, "calls": calls })
}

// ---------------------------------------------------------------------------
// Admin endpoints
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_reports_loaded_plugins() {
    let (_, app) = make_app();
    let (status, _, body) = send(app, empty_req(Method::GET, "/__kestrel/health")).await;

    assert_eq!(status, StatusCode::OK);
    let body = json_body(&body);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["plugins"], 2);
    assert_eq!(body["channels"], 0);
}

#[tokio::test]
async fn plugins_are_listed_sorted() {
    let (_, app) = make_app();
    let (status, _, body) = send(app, empty_req(Method::GET, "/__kestrel/plugins")).await;

    assert_eq!(status, StatusCode::OK);
    let body = json_body(&body);
    let ids: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, ["listener", "ticker"]);
    assert_eq!(body[1]["topics"], json!(["public:tick"]));
    assert_eq!(body[1]["connected"], false);
}

#[tokio::test]
async fn metrics_render_in_prometheus_format() {
    let (_, app) = make_app();
    send(
        app.clone(),
        batch_req(
            "ticker",
            batch("m1", json!([{ "method": "bus.publish", "args": { "topic": "public:tick" } }])),
        ),
    )
    .await;

    let (status, headers, body) = send(app, empty_req(Method::GET, "/__kestrel/metrics")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));

    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("kestrel_capability_calls_total"));
    assert!(text.contains(r#"method="bus.publish""#));
    assert!(text.contains("kestrel_bus_events_total"));
}

// ---------------------------------------------------------------------------
// POST /api/batch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn batch_results_follow_call_order() {
    let (state, app) = make_app();
    let (status, _, body) = send(
        app,
        batch_req(
            "ticker",
            batch(
                "b1",
                json!([
                    { "method": "alerts.write.raise", "args": { "severity": "warning", "title": "disk" } },
                    { "method": "nope.nothing" },
                    { "method": "bus.subscribe", "args": { "topic": "system:alerts" } },
                    { "method": "alerts.write.raise", "args": { "severity": "loud", "title": "x" } }
                ]),
            ),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let body = json_body(&body);
    assert_eq!(body["rid"], "b1");
    let results = body["result"]["results"].as_array().unwrap();
    assert_eq!(results.len(), 4);
    assert_eq!(results[0]["ok"], true);
    assert_eq!(results[1]["error"], "unknown method: nope.nothing");
    assert_eq!(results[2]["error"], "topic denied: system:alerts");
    assert!(results[3]["error"]
        .as_str()
        .unwrap()
        .starts_with("invalid args:"));

    let alerts = state.host.alerts.list();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].alert.source, "ticker");
}

#[tokio::test]
async fn missing_app_id_is_a_bad_request() {
    let (_, app) = make_app();
    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/batch")
        .header("content-type", "application/json")
        .body(Body::from(batch("b1", json!([])).to_string()))
        .unwrap();
    let (status, headers, body) = send(app, req).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(headers[header::CONTENT_TYPE], "application/problem+json");
    assert_eq!(json_body(&body)["type"], "urn:kestrel:error:bad-request");
}

#[tokio::test]
async fn unknown_app_is_not_found() {
    let (_, app) = make_app();
    let (status, _, body) = send(app, batch_req("ghost", batch("b1", json!([])))).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json_body(&body)["detail"], "unknown plugin: ghost");
}

#[tokio::test]
async fn http_bucket_answers_429_with_retry_after() {
    let config = KestrelConfig {
        http_rate: BucketLimits::new(2, 0.0),
        ..Default::default()
    };
    let state = make_state(config);
    let app = create_router(state);

    for i in 0..2 {
        let (status, _, _) = send(
            app.clone(),
            batch_req("ticker", batch(&format!("b{}", i), json!([]))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, headers, body) =
        send(app.clone(), batch_req("ticker", batch("b3", json!([])))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(headers.contains_key(header::RETRY_AFTER));
    assert_eq!(json_body(&body)["type"], "urn:kestrel:error:rate-limited");

    // Buckets are per app id.
    let (status, _, _) = send(app, batch_req("listener", batch("b4", json!([])))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn too_many_calls_rejects_the_whole_batch() {
    let (_, app) = make_app();
    let calls: Vec<Value> = (0..21)
        .map(|_| json!({ "method": "bus.subscribe", "args": { "topic": "public:tick" } }))
        .collect();
    let (status, _, body) = send(app, batch_req("listener", batch("big", json!(calls)))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body = json_body(&body);
    assert_eq!(body["rid"], "big");
    assert_eq!(body["error"], "too many calls: 21 exceeds limit of 20");
}

#[tokio::test]
async fn oversized_batch_is_rejected() {
    let (_, app) = make_app();
    let payload = "x".repeat(70 * 1024);
    let (status, _, body) = send(
        app,
        batch_req(
            "ticker",
            batch(
                "huge",
                json!([{ "method": "bus.publish", "args": { "topic": "public:tick", "payload": payload } }]),
            ),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    let body = json_body(&body);
    assert_eq!(body["rid"], "huge");
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("payload too large"));
}

#[tokio::test]
async fn malformed_batch_with_id_is_correlated() {
    let (_, app) = make_app();
    let (status, _, body) = send(
        app,
        batch_req("ticker", json!({ "type": "api:batch", "id": "r9", "calls": "nope" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body = json_body(&body);
    assert_eq!(body["rid"], "r9");
    assert!(body["error"].as_str().unwrap().starts_with("invalid batch:"));
}

// ---------------------------------------------------------------------------
// Plugin channels
// ---------------------------------------------------------------------------

#[tokio::test]
async fn channel_for_unknown_plugin_is_not_found() {
    let (_, app) = make_app();
    let (status, _, body) = send(app, empty_req(Method::GET, "/plugins/ghost/channel")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json_body(&body)["detail"], "unknown plugin: ghost");
}

type Client = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn connect(addr: std::net::SocketAddr, plugin: &str) -> Client {
    let url = format!("ws://{}/plugins/{}/channel", addr, plugin);
    let (socket, _) = tokio_tungstenite::connect_async(url)
        .await
        .expect("websocket handshake failed");
    socket
}

/// Next text frame as JSON, failing the test after a short wait.
async fn next_json(socket: &mut Client) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn send_json(socket: &mut Client, value: Value) {
    socket
        .send(Message::Text(value.to_string().into()))
        .await
        .unwrap();
}

#[tokio::test]
async fn channels_carry_batches_and_bus_events() {
    let (state, app) = make_app();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let mut listener_ws = connect(addr, "listener").await;
    let mut ticker_ws = connect(addr, "ticker").await;

    send_json(
        &mut listener_ws,
        batch("s1", json!([{ "method": "bus.subscribe", "args": { "topic": "public:tick" } }])),
    )
    .await;
    let reply = next_json(&mut listener_ws).await;
    assert_eq!(reply["rid"], "s1");
    assert_eq!(reply["result"]["results"][0]["ok"], true);

    // Frames that are not batches are ignored; the next reply belongs to p1.
    send_json(&mut ticker_ws, json!({ "type": "ui:resize", "w": 3 })).await;
    send_json(
        &mut ticker_ws,
        batch(
            "p1",
            json!([{ "method": "bus.publish", "args": { "topic": "public:tick", "payload": { "n": 1 } } }]),
        ),
    )
    .await;
    let reply = next_json(&mut ticker_ws).await;
    assert_eq!(reply["rid"], "p1");
    assert_eq!(reply["result"]["results"][0]["ok"], true);

    let event = next_json(&mut listener_ws).await;
    assert_eq!(
        event,
        json!({ "type": "bus:event", "topic": "public:tick", "from": "ticker", "payload": { "n": 1 } })
    );

    // Closing the socket detaches the plugin's port.
    assert!(state.gateway.ports().is_attached("listener"));
    listener_ws.close(None).await.unwrap();
    for _ in 0..50 {
        if !state.gateway.ports().is_attached("listener") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!state.gateway.ports().is_attached("listener"));
}

#[tokio::test]
async fn unloading_a_plugin_closes_its_channel() {
    let (state, app) = make_app();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server_app = app.clone();
    tokio::spawn(async move {
        axum::serve(listener, server_app).await.unwrap();
    });

    let mut socket = connect(addr, "listener").await;
    send_json(
        &mut socket,
        batch("s1", json!([{ "method": "bus.subscribe", "args": { "topic": "public:tick" } }])),
    )
    .await;
    assert_eq!(next_json(&mut socket).await["result"]["results"][0]["ok"], true);

    state.gateway.unload_plugin("listener").unwrap();

    // The host ends the socket without waiting for the iframe.
    let ended = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(ended.is_ok(), "channel stayed open after unload");
    assert!(!state.gateway.ports().is_attached("listener"));
    assert!(state.gateway.bus().subscribers("public:tick").is_empty());

    let (status, _, _) = send(app, empty_req(Method::GET, "/plugins/listener/channel")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Host collaborators and metric labels
// ---------------------------------------------------------------------------

#[tokio::test]
async fn configured_series_are_readable() {
    let mut config = KestrelConfig::default();
    config
        .series
        .insert("cpu".into(), vec![(10.0, 0.5), (0.0, 0.25), (20.0, 0.75)]);
    let app = create_router(make_state(config));

    let (status, _, body) = send(
        app,
        batch_req(
            "ticker",
            batch(
                "g1",
                json!([
                    { "method": "metrics.read.getSeries", "args": { "id": "cpu", "from": 0, "to": 15, "step": 1 } },
                    { "method": "metrics.read.getSeries", "args": { "id": "disk", "from": 0, "to": 15, "step": 1 } }
                ]),
            ),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let results = json_body(&body)["result"]["results"].clone();
    assert_eq!(results[0]["ok"], true);
    assert_eq!(results[0]["result"]["points"], json!([[0.0, 0.25], [10.0, 0.5]]));
    assert_eq!(results[1]["ok"], false);
}

fn scoped_batch_req(app_id: &str, scope: &str, id: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/batch")
        .header("content-type", "application/json")
        .header("x-app-id", app_id)
        .header("x-scope", scope)
        .body(Body::from(batch(id, json!([])).to_string()))
        .unwrap()
}

#[tokio::test]
async fn caller_chosen_values_do_not_become_metric_labels() {
    let config = KestrelConfig {
        http_rate: BucketLimits::new(1, 0.0),
        ..Default::default()
    };
    let app = create_router(make_state(config));

    let junk: Vec<Value> = (0..10)
        .map(|i| json!({ "method": format!("made.up.{}", i) }))
        .collect();
    send(app.clone(), batch_req("ticker", batch("j1", Value::Array(junk)))).await;

    for scope in ["scope-alpha", "scope-beta"] {
        let (status, _, _) = send(app.clone(), scoped_batch_req("ticker", scope, "a")).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _, _) = send(app.clone(), scoped_batch_req("ticker", scope, "b")).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    }

    let (_, _, body) = send(app, empty_req(Method::GET, "/__kestrel/metrics")).await;
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(!text.contains("made.up"));
    assert!(text.contains(r#"method="unknown""#));
    assert!(!text.contains("scope-alpha"));
    assert!(!text.contains("scope-beta"));
    assert!(text.contains(r#"kestrel_http_rate_limited_total{app="ticker"} 2"#));
}
