//! Shared test support: a small key-value service hooked onto a
//! dispatcher, plus the echo handler used by the concurrency tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};

use trirpc_common::dispatch::{Answerer, Dispatcher};
use trirpc_common::protocol::Response;

/// In-memory key-value store with per-key watchers.
///
/// Hooked onto a server it exposes three actions:
/// - `set [key, value]`: store, notify watchers, ack with the key
/// - `get [key]`: answer `[key, value]` (`value` null when absent)
/// - `listen [key]`: push `[key, value]` on every subsequent set
pub struct KvService {
    map: Mutex<HashMap<String, Value>>,
    watchers: Mutex<HashMap<String, Vec<Answerer>>>,
}

impl KvService {
    pub fn new() -> Arc<Self> {
        Arc::new(KvService {
            map: Mutex::new(HashMap::new()),
            watchers: Mutex::new(HashMap::new()),
        })
    }

    pub fn hook(self: &Arc<Self>, dispatcher: &Dispatcher) {
        let service = self.clone();
        dispatcher.register_handler("set", move |call, answerer| {
            let Some(key) = call.params.first().and_then(Value::as_str) else {
                return;
            };
            let value = call.params.get(1).cloned().unwrap_or(Value::Null);
            service.set(key, value);
            if let Some(answerer) = answerer {
                answerer.answer(Response::success(json!(key)));
            }
        });

        let service = self.clone();
        dispatcher.register_handler("get", move |call, answerer| {
            let Some(answerer) = answerer else { return };
            let Some(key) = call.params.first().and_then(Value::as_str) else {
                answerer.answer(Response::fail("bad_params"));
                return;
            };
            let value = service.map.lock().unwrap().get(key).cloned();
            answerer.answer(Response::success(json!([key, value])));
        });

        let service = self.clone();
        dispatcher.register_handler("listen", move |call, answerer| {
            let Some(answerer) = answerer else { return };
            let Some(key) = call.params.first().and_then(Value::as_str) else {
                return;
            };
            service
                .watchers
                .lock()
                .unwrap()
                .entry(key.to_string())
                .or_default()
                .push(answerer.clone());
        });
    }

    fn set(&self, key: &str, value: Value) {
        self.map
            .lock()
            .unwrap()
            .insert(key.to_string(), value.clone());
        if let Some(watchers) = self.watchers.lock().unwrap().get(key) {
            for watcher in watchers {
                watcher.answer(Response::success(json!([key, value])));
            }
        }
    }
}

/// Answers every query with its own params.
pub fn register_echo(dispatcher: &Dispatcher) {
    dispatcher.register_handler("echo", |call, answerer| {
        if let Some(answerer) = answerer {
            answerer.answer(Response::success(json!(call.params.clone())));
        }
    });
}
