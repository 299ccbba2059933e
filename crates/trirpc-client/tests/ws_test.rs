mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use common::{register_echo, KvService};
use trirpc_client::{Reply, WsClient};
use trirpc_common::protocol::{Call, Response, RpcError};
use trirpc_server::WsServer;

async fn start(server: &WsServer) -> String {
    let addr = server.listen().await.unwrap();
    format!("ws://127.0.0.1:{}", addr.port())
}

#[tokio::test]
async fn listen_and_close() {
    let server = WsServer::new().with_port(0);
    let addr = server.listen().await.unwrap();
    assert_ne!(addr.port(), 0);
    server.close().await.unwrap();
}

#[tokio::test]
async fn connect_to_dead_peer_fails() {
    assert!(matches!(
        WsClient::connect("ws://127.0.0.1:1").await,
        Err(RpcError::Connection(_))
    ));
}

#[tokio::test]
async fn query_round_trips() {
    let server = WsServer::new().with_port(0);
    register_echo(server.dispatcher());
    let url = start(&server).await;

    let client = WsClient::connect(&url).await.unwrap();
    let answer = client
        .call_and_wait(Call::query("echo", vec![json!("over websocket")]))
        .await
        .unwrap();
    assert_eq!(answer, Response::success(json!(["over websocket"])));

    client.close().await.unwrap();
    server.close().await.unwrap();
}

#[tokio::test]
async fn kv_set_then_get() {
    let server = WsServer::new().with_port(0);
    let kv = KvService::new();
    kv.hook(server.dispatcher());
    let url = start(&server).await;

    let client = WsClient::connect(&url).await.unwrap();
    client
        .emit(Call::submit("set", vec![json!("Life"), json!(42)]))
        .unwrap();
    let answer = client
        .call_and_wait(Call::query("get", vec![json!("Life")]))
        .await
        .unwrap();
    assert_eq!(answer, Response::success(json!(["Life", 42])));

    client.close().await.unwrap();
    server.close().await.unwrap();
}

#[tokio::test]
async fn concurrent_queries_correlate_independently() {
    let server = WsServer::new().with_port(0);
    register_echo(server.dispatcher());
    let url = start(&server).await;

    let client = Arc::new(WsClient::connect(&url).await.unwrap());
    let mut tasks = Vec::new();
    for i in 0..100 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            let marker = format!("marker-{i}");
            let answer = client
                .call_and_wait(Call::query("echo", vec![json!(marker.clone())]))
                .await
                .unwrap();
            assert_eq!(answer, Response::success(json!([marker])));
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    server.close().await.unwrap();
}

#[tokio::test]
async fn subscription_receives_every_push() {
    let server = WsServer::new().with_port(0);
    let kv = KvService::new();
    kv.hook(server.dispatcher());
    let url = start(&server).await;

    let client = WsClient::connect(&url).await.unwrap();
    let Reply::Stream(mut sub) = client
        .emit(Call::subscribe("listen", vec![json!("Life")]))
        .unwrap()
    else {
        panic!("subscribe must produce a stream");
    };

    client
        .emit(Call::submit("set", vec![json!("Life"), json!("first")]))
        .unwrap();
    client
        .emit(Call::submit("set", vec![json!("Life"), json!("second")]))
        .unwrap();

    assert_eq!(
        sub.next().await,
        Some(Response::success(json!(["Life", "first"])))
    );
    assert_eq!(
        sub.next().await,
        Some(Response::success(json!(["Life", "second"])))
    );

    client.close().await.unwrap();
    server.close().await.unwrap();
}

#[tokio::test]
async fn timed_out_query_errors() {
    let server = WsServer::new().with_port(0);
    server.register_handler("blackhole", |_call, _answerer| {});
    let url = start(&server).await;

    let client = WsClient::connect(&url).await.unwrap();
    let result = client
        .call_with_timeout(Call::query("blackhole", vec![]), Duration::from_millis(100))
        .await;
    assert!(matches!(result, Err(RpcError::Timeout(100))));

    client.close().await.unwrap();
    server.close().await.unwrap();
}
