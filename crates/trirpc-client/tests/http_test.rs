mod common;

use std::time::Duration;

use serde_json::json;

use common::{register_echo, KvService};
use trirpc_client::{HttpClient, Reply};
use trirpc_common::protocol::{Call, Response, RpcError};
use trirpc_server::HttpServer;

async fn start(server: &HttpServer) -> String {
    let addr = server.listen().await.unwrap();
    format!("http://127.0.0.1:{}", addr.port())
}

#[tokio::test]
async fn query_round_trips() {
    let server = HttpServer::new().with_port(0);
    register_echo(server.dispatcher());
    let endpoint = start(&server).await;

    let client = HttpClient::new(&endpoint);
    let answer = client
        .call_and_wait(Call::query("echo", vec![json!("over http")]))
        .await
        .unwrap();
    assert_eq!(answer, Response::success(json!(["over http"])));

    client.close().await.unwrap();
    server.close().await.unwrap();
}

#[tokio::test]
async fn submit_is_fire_and_forget() {
    let server = HttpServer::new().with_port(0);
    let kv = KvService::new();
    kv.hook(server.dispatcher());
    let endpoint = start(&server).await;

    let client = HttpClient::new(&endpoint);
    let reply = client
        .emit(Call::submit("set", vec![json!("Life"), json!(42)]))
        .unwrap();
    assert!(matches!(reply, Reply::None));

    // No completion signal from a submit, so poll until the write lands.
    let mut answer = None;
    for _ in 0..50 {
        let got = client
            .call_and_wait(Call::query("get", vec![json!("Life")]))
            .await
            .unwrap();
        if got == Response::success(json!(["Life", 42])) {
            answer = Some(got);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(answer.is_some(), "submit never became visible");

    server.close().await.unwrap();
}

#[tokio::test]
async fn subscribe_is_rejected_client_side() {
    let client = HttpClient::new("http://127.0.0.1:9080");
    assert!(matches!(
        client.emit(Call::subscribe("listen", vec![json!("Life")])),
        Err(RpcError::Unsupported(_))
    ));
}

#[tokio::test]
async fn subscribe_is_rejected_on_the_wire() {
    let server = HttpServer::new().with_port(0);
    let endpoint = start(&server).await;

    let res = reqwest::Client::new()
        .post(&endpoint)
        .json(&Call::subscribe("listen", vec![json!("Life")]))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::NOT_IMPLEMENTED);

    server.close().await.unwrap();
}

#[tokio::test]
async fn non_post_methods_are_rejected() {
    let server = HttpServer::new().with_port(0);
    let endpoint = start(&server).await;

    let res = reqwest::get(&endpoint).await.unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::METHOD_NOT_ALLOWED);

    server.close().await.unwrap();
}

#[tokio::test]
async fn malformed_body_yields_bad_request() {
    let server = HttpServer::new().with_port(0);
    let endpoint = start(&server).await;

    let res = reqwest::Client::new()
        .post(&endpoint)
        .body("not json at all")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Response = res.json().await.unwrap();
    assert_eq!(body, Response::fail("parse_error"));

    server.close().await.unwrap();
}

#[tokio::test]
async fn unanswered_query_resolves_to_gateway_timeout() {
    let server = HttpServer::new()
        .with_port(0)
        .with_answer_timeout(Duration::from_millis(100));
    let endpoint = start(&server).await;

    // No handler registered at all: the answer path drops immediately.
    let res = reqwest::Client::new()
        .post(&endpoint)
        .json(&Call::query("nobody-home", vec![]))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::GATEWAY_TIMEOUT);
    let body: Response = res.json().await.unwrap();
    assert_eq!(body, Response::fail("timeout"));

    // A handler that retains the answer path without answering hits the
    // same bound, just after the full timeout.
    let retained: std::sync::Mutex<Vec<trirpc_common::dispatch::Answerer>> =
        std::sync::Mutex::new(Vec::new());
    server.register_handler("stall", move |_call, answerer| {
        if let Some(answerer) = answerer {
            retained.lock().unwrap().push(answerer.clone());
        }
    });
    let client = HttpClient::new(&endpoint);
    let answer = client
        .call_and_wait(Call::query("stall", vec![]))
        .await
        .unwrap();
    assert_eq!(answer, Response::fail("timeout"));

    server.close().await.unwrap();
}

/// Serialized echo query padded to exactly `target` bytes.
fn body_of_len(target: usize) -> String {
    let base = serde_json::to_string(&Call::query("echo", vec![json!("")])).unwrap();
    let padding = "x".repeat(target - base.len());
    let body = serde_json::to_string(&Call::query("echo", vec![json!(padding)])).unwrap();
    assert_eq!(body.len(), target);
    body
}

#[tokio::test]
async fn request_size_ceiling_is_exact() {
    let server = HttpServer::new().with_port(0).with_max_request_size(1024);
    register_echo(server.dispatcher());
    let endpoint = start(&server).await;

    let at_limit = reqwest::Client::new()
        .post(&endpoint)
        .body(body_of_len(1024))
        .send()
        .await
        .unwrap();
    assert_eq!(at_limit.status(), reqwest::StatusCode::OK);

    let over_limit = reqwest::Client::new()
        .post(&endpoint)
        .body(body_of_len(1025))
        .send()
        .await;
    assert!(over_limit.is_err(), "oversized body must abort the exchange");

    server.close().await.unwrap();
}
