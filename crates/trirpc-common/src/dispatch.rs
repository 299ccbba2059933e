//! Handler registry and dispatch
//!
//! Each server owns one [`Dispatcher`]: a map from action name to an
//! ordered list of handlers. Incoming calls are delivered to every
//! handler registered for their action, in registration order,
//! synchronously with respect to [`Dispatcher::emit`].
//!
//! Answers flow back through an [`Answerer`], which the transport
//! constructs per call. A `query` answerer is a take-once slot (the
//! first handler to answer wins, later answers are dropped), while a
//! `subscribe` answerer may be invoked any number of times for the
//! lifetime of the connection. Handlers that need to answer after
//! returning (subscriptions, deferred work) clone the answerer and keep
//! it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, warn};

use crate::protocol::{Call, Response};

/// A registered call handler.
///
/// Invoked synchronously by [`Dispatcher::emit`] with the call and, when
/// the call kind carries an answer path, the answerer to deliver it on.
pub type Handler = Arc<dyn Fn(&Call, Option<&Answerer>) + Send + Sync>;

type OnceSlot = Arc<Mutex<Option<Box<dyn FnOnce(Response) + Send>>>>;

#[derive(Clone)]
enum AnswerPath {
    /// Single-answer path for `query`: first answer wins.
    Once(OnceSlot),
    /// Multi-answer path for `subscribe`.
    Many(Arc<dyn Fn(Response) + Send + Sync>),
}

/// The answer path handed to handlers.
///
/// Cloneable so a handler can retain it beyond the dispatch call and
/// answer asynchronously.
#[derive(Clone)]
pub struct Answerer {
    path: AnswerPath,
}

impl Answerer {
    /// An answerer that accepts exactly one response; later answers are
    /// dropped. Used for `query` calls.
    pub fn once(deliver: impl FnOnce(Response) + Send + 'static) -> Self {
        Answerer {
            path: AnswerPath::Once(Arc::new(Mutex::new(Some(Box::new(deliver))))),
        }
    }

    /// An answerer that accepts any number of responses. Used for
    /// `subscribe` calls.
    pub fn many(deliver: impl Fn(Response) + Send + Sync + 'static) -> Self {
        Answerer {
            path: AnswerPath::Many(Arc::new(deliver)),
        }
    }

    /// Deliver a response upstream.
    ///
    /// On a take-once answerer only the first invocation is forwarded;
    /// competing answers (e.g. from multiple handlers registered for the
    /// same action) are logged and discarded.
    pub fn answer(&self, response: Response) {
        match &self.path {
            AnswerPath::Once(slot) => {
                let taken = slot.lock().expect("answer slot lock poisoned").take();
                match taken {
                    Some(deliver) => deliver(response),
                    None => debug!("dropping duplicate answer to single-answer call"),
                }
            }
            AnswerPath::Many(deliver) => deliver(response),
        }
    }
}

/// Per-server registry mapping an action name to its handlers.
///
/// Registration order is preserved and equals invocation order.
/// Registration and dispatch may race across threads, so the registry
/// sits behind an `RwLock`; `emit` only ever reads it.
#[derive(Default)]
pub struct Dispatcher {
    handlers: RwLock<HashMap<String, Vec<Handler>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `handler` to the list for `action`, creating the list if
    /// absent. There is no bound on handlers per action and registering
    /// repeatedly is not an error.
    ///
    /// Note for callers that need exactly-once answer semantics: register
    /// at most one answering handler per action. The answer path drops
    /// competing answers rather than forwarding them, but which handler's
    /// answer wins is registration order, not an enforced contract.
    pub fn register_handler(
        &self,
        action: impl Into<String>,
        handler: impl Fn(&Call, Option<&Answerer>) + Send + Sync + 'static,
    ) {
        let mut handlers = self.handlers.write().expect("handler registry lock poisoned");
        handlers
            .entry(action.into())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Delivers `call` to every handler registered for its action, in
    /// registration order.
    ///
    /// A call with no registered handler is not an error: it is logged as
    /// a warning and dropped, and the caller (if any is waiting) learns
    /// nothing; bounding that wait is the transport's job.
    pub fn emit(&self, call: &Call, answerer: Option<&Answerer>) {
        // Handlers run outside the read guard so they may register
        // further handlers without deadlocking.
        let matched: Vec<Handler> = {
            let handlers = self.handlers.read().expect("handler registry lock poisoned");
            match handlers.get(&call.action) {
                Some(list) if !list.is_empty() => list.clone(),
                _ => {
                    warn!(action = %call.action, "emitted call has no registered handler");
                    return;
                }
            }
        };

        for handler in matched {
            handler(call, answerer);
        }
    }
}
