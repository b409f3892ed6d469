//! Scripted in-memory transport for tests.
//!
//! Replies are registered per `(method, path)`. Queued replies are consumed
//! in order; a standing reply answers every request once the queue is
//! empty. Deferred replies let a test hold a response back and release it
//! later, which is how out-of-order confirmations are staged.
//!
//! ```rust,ignore
//! let mock = MockTransport::new();
//! mock.with_csrf();
//! let first = mock.defer(Method::POST, endpoints::CART_UPDATE);
//! // ... start the operation, then:
//! first.respond(200, json!({"items": []}));
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use reqwest::header::{HeaderValue, SET_COOKIE};
use reqwest::{Method, StatusCode};
use serde_json::{Value, json};
use tokio::sync::{oneshot, watch};

use crate::http::{ApiRequest, RawResponse, Transport, TransportError, endpoints};

/// CSRF token served by [`MockTransport::with_csrf`].
pub const TEST_CSRF_TOKEN: &str = "test-csrf-token";

type Outcome = Result<RawResponse, TransportError>;

enum Reply {
    Ready(Outcome),
    Deferred(oneshot::Receiver<Outcome>),
}

#[derive(Default)]
struct Route {
    queue: VecDeque<Reply>,
    standing: Option<RawResponse>,
}

/// Transport that answers from a script instead of the network.
pub struct MockTransport {
    routes: Mutex<HashMap<(Method, String), Route>>,
    log: Mutex<Vec<ApiRequest>>,
    sent: watch::Sender<usize>,
}

/// Handle for a reply the test releases later.
pub struct Deferred {
    tx: oneshot::Sender<Outcome>,
}

impl Deferred {
    /// Release the reply with a status and JSON body.
    pub fn respond(self, status: u16, body: Value) {
        let _ = self.tx.send(Ok(response(status, &body)));
    }

    /// Release the reply as a transport failure.
    pub fn fail(self) {
        let _ = self
            .tx
            .send(Err(TransportError::Other("connection reset".to_string())));
    }
}

fn response(status: u16, body: &Value) -> RawResponse {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    RawResponse::json(status, body)
}

impl MockTransport {
    /// Create an empty script.
    #[must_use]
    pub fn new() -> Arc<Self> {
        let (sent, _) = watch::channel(0);
        Arc::new(Self {
            routes: Mutex::new(HashMap::new()),
            log: Mutex::new(Vec::new()),
            sent,
        })
    }

    /// Serve [`TEST_CSRF_TOKEN`] from the bootstrap endpoint indefinitely.
    pub fn with_csrf(&self) -> &Self {
        self.always(
            Method::GET,
            endpoints::CSRF,
            200,
            json!({"csrfToken": TEST_CSRF_TOKEN}),
        )
    }

    /// Queue one JSON reply.
    pub fn reply(&self, method: Method, path: &str, status: u16, body: Value) -> &Self {
        self.push(method, path, Reply::Ready(Ok(response(status, &body))))
    }

    /// Queue one JSON reply carrying a `Set-Cookie` header.
    pub fn reply_with_cookie(
        &self,
        method: Method,
        path: &str,
        status: u16,
        body: Value,
        cookie: &'static str,
    ) -> &Self {
        let mut raw = response(status, &body);
        raw.headers
            .append(SET_COOKIE, HeaderValue::from_static(cookie));
        self.push(method, path, Reply::Ready(Ok(raw)))
    }

    /// Queue one transport failure.
    pub fn fail(&self, method: Method, path: &str) -> &Self {
        self.push(
            method,
            path,
            Reply::Ready(Err(TransportError::Other("connection refused".to_string()))),
        )
    }

    /// Answer every request to this route once its queue is drained.
    pub fn always(&self, method: Method, path: &str, status: u16, body: Value) -> &Self {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((method, path.to_string()))
            .or_default()
            .standing = Some(response(status, &body));
        self
    }

    /// Queue a reply that is released through the returned handle.
    #[must_use]
    pub fn defer(&self, method: Method, path: &str) -> Deferred {
        let (tx, rx) = oneshot::channel();
        self.push(method, path, Reply::Deferred(rx));
        Deferred { tx }
    }

    /// Every request sent so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Requests sent to one path, in order.
    #[must_use]
    pub fn requests_to(&self, path: &str) -> Vec<ApiRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }

    /// Wait until at least `count` requests have been sent.
    pub async fn wait_for_requests(&self, count: usize) {
        let mut rx = self.sent.subscribe();
        let _ = rx.wait_for(|sent| *sent >= count).await;
    }

    fn push(&self, method: Method, path: &str, reply: Reply) -> &Self {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((method, path.to_string()))
            .or_default()
            .queue
            .push_back(reply);
        self
    }

    fn next_reply(&self, request: &ApiRequest) -> Reply {
        let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(route) = routes.get_mut(&(request.method.clone(), request.path.clone())) else {
            return Reply::Ready(Err(TransportError::Other(format!(
                "no scripted reply for {} {}",
                request.method, request.path
            ))));
        };
        route.queue.pop_front().unwrap_or_else(|| match &route.standing {
            Some(raw) => Reply::Ready(Ok(raw.clone())),
            None => Reply::Ready(Err(TransportError::Other(format!(
                "scripted replies for {} {} exhausted",
                request.method, request.path
            )))),
        })
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: ApiRequest) -> Result<RawResponse, TransportError> {
        let reply = self.next_reply(&request);
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        self.sent.send_modify(|sent| *sent += 1);

        match reply {
            Reply::Ready(outcome) => outcome,
            Reply::Deferred(rx) => rx
                .await
                .unwrap_or_else(|_| Err(TransportError::Other("deferred reply dropped".to_string()))),
        }
    }
}
