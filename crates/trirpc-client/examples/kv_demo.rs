//! Key-value store served over all three transports at once.
//!
//! Run with:
//!
//! ```sh
//! cargo run --example kv_demo
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tracing::info;

use trirpc_client::{connect, Addr, Reply};
use trirpc_common::dispatch::{Answerer, Dispatcher};
use trirpc_common::protocol::{Call, Response};
use trirpc_server::{HttpServer, TcpServer, WsServer};

/// Store shared by every transport, with per-key watchers.
#[derive(Default)]
struct Store {
    map: Mutex<HashMap<String, Value>>,
    watchers: Mutex<HashMap<String, Vec<Answerer>>>,
}

impl Store {
    fn hook(self: &Arc<Self>, dispatcher: &Dispatcher) {
        let store = self.clone();
        dispatcher.register_handler("set", move |call, answerer| {
            let Some(key) = call.params.first().and_then(Value::as_str) else {
                return;
            };
            let value = call.params.get(1).cloned().unwrap_or(Value::Null);
            store.map.lock().unwrap().insert(key.to_string(), value.clone());
            if let Some(watchers) = store.watchers.lock().unwrap().get(key) {
                for watcher in watchers {
                    watcher.answer(Response::success(json!([key, value])));
                }
            }
            if let Some(answerer) = answerer {
                answerer.answer(Response::success(json!(key)));
            }
        });

        let store = self.clone();
        dispatcher.register_handler("get", move |call, answerer| {
            let Some(answerer) = answerer else { return };
            let Some(key) = call.params.first().and_then(Value::as_str) else {
                answerer.answer(Response::fail("bad_params"));
                return;
            };
            let value = store.map.lock().unwrap().get(key).cloned();
            answerer.answer(Response::success(json!([key, value])));
        });

        let store = self.clone();
        dispatcher.register_handler("listen", move |call, answerer| {
            let Some(answerer) = answerer else { return };
            let Some(key) = call.params.first().and_then(Value::as_str) else {
                return;
            };
            store
                .watchers
                .lock()
                .unwrap()
                .entry(key.to_string())
                .or_default()
                .push(answerer.clone());
        });
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let store = Arc::new(Store::default());

    let http = HttpServer::new().with_port(0);
    let tcp = TcpServer::new().with_port(0);
    let ws = WsServer::new().with_port(0);
    store.hook(http.dispatcher());
    store.hook(tcp.dispatcher());
    store.hook(ws.dispatcher());

    let http_addr = http.listen().await?;
    let tcp_addr = tcp.listen().await?;
    let ws_addr = ws.listen().await?;
    info!(%http_addr, %tcp_addr, %ws_addr, "kv store listening");

    // A websocket watcher on "Life".
    let watcher = connect(&Addr::ws("127.0.0.1", ws_addr.port())).await?;
    let Reply::Stream(mut updates) = watcher.emit(Call::subscribe("listen", vec![json!("Life")]))?
    else {
        unreachable!("subscribe always produces a stream");
    };

    // Writes arrive over http, reads over tcp.
    let writer = connect(&Addr::http("127.0.0.1", http_addr.port())).await?;
    let reader = connect(&Addr::tcp("127.0.0.1", tcp_addr.port())).await?;

    writer
        .call_and_wait(Call::query("set", vec![json!("Life"), json!(42)]))
        .await?;

    let answer = reader
        .call_and_wait(Call::query("get", vec![json!("Life")]))
        .await?;
    info!(?answer, "read back over tcp");

    if let Some(update) = updates.next().await {
        info!(?update, "watcher notified over websocket");
    }

    writer.close().await?;
    reader.close().await?;
    watcher.close().await?;
    http.close().await?;
    tcp.close().await?;
    ws.close().await?;
    Ok(())
}
