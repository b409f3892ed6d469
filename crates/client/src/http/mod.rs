//! HTTP access layer.
//!
//! Every backend call goes through [`ApiClient`]. It is the single place
//! that:
//!
//! - attaches the CSRF header to mutating requests, bootstrapping the token
//!   first when none is held (the bootstrap always completes before the
//!   dependent request is sent)
//! - classifies failures into [`ApiError`]
//! - announces 401 responses to registered [`UnauthorizedListener`]s
//!
//! It never mutates session or cart state itself; callers own that.
//!
//! # Example
//!
//! ```rust,ignore
//! use ojas_client::http::{ApiClient, ReqwestTransport, endpoints};
//!
//! let transport = Arc::new(ReqwestTransport::new(&config)?);
//! let api = ApiClient::new(transport, &config);
//! let cart = api.request(Method::GET, endpoints::CART, None).await?;
//! ```

mod csrf;
pub mod endpoints;
mod error;
mod transport;

pub use error::{ApiError, ApiErrorKind};
pub use transport::{
    ApiRequest, FormPart, FormValue, RawResponse, ReqwestTransport, RequestBody, Transport,
    TransportError,
};

use std::sync::{Arc, PoisonError, RwLock, Weak};

use reqwest::Method;
use reqwest::header::{HeaderName, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::config::ClientConfig;

/// Notified synchronously whenever any request comes back 401.
pub trait UnauthorizedListener: Send + Sync {
    fn on_unauthorized(&self);
}

/// Client for the storefront backend.
///
/// Cheap to clone; clones share the transport, the CSRF token and the
/// listener registry.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    transport: Arc<dyn Transport>,
    csrf_header: HeaderName,
    csrf_cookie: String,
    /// Held across the bootstrap call so concurrent mutations share one.
    csrf_token: Mutex<Option<SecretString>>,
    listeners: RwLock<Vec<Weak<dyn UnauthorizedListener>>>,
}

impl ApiClient {
    /// Create a client over the given transport.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, config: &ClientConfig) -> Self {
        Self {
            inner: Arc::new(ApiClientInner {
                transport,
                csrf_header: config.csrf_header.clone(),
                csrf_cookie: config.csrf_cookie.clone(),
                csrf_token: Mutex::new(None),
                listeners: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Register a listener for 401 responses.
    ///
    /// Held weakly; a dropped listener is skipped and pruned.
    pub fn on_unauthorized(&self, listener: Weak<dyn UnauthorizedListener>) {
        let mut listeners = self
            .inner
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        listeners.retain(|l| l.strong_count() > 0);
        listeners.push(listener);
    }

    /// Send a request and return the decoded JSON body.
    ///
    /// # Errors
    ///
    /// Returns the classified `ApiError` for transport failures and
    /// non-success responses.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        let mut request = ApiRequest::new(method, path);
        if let Some(body) = body {
            request = request.json(body);
        }
        self.execute(request).await
    }

    /// `GET` a path and decode the body into `T`.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the body has the wrong shape.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(ApiRequest::get(path)).await
    }

    /// Execute a request and decode the body into `T`.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the body has the wrong shape.
    pub async fn send<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let value = self.execute(request).await?;
        serde_json::from_value(value).map_err(|e| {
            let err = ApiError::malformed(reqwest::StatusCode::OK, e);
            report_server_fault(&err, "Unexpected response shape");
            err
        })
    }

    /// Execute a request and return the decoded JSON body.
    ///
    /// Mutating requests carry the CSRF header. If the backend rejects the
    /// token, it is discarded, re-bootstrapped, and the request is sent one
    /// more time; CSRF is checked before the view runs, so the rejected
    /// attempt cannot have changed anything.
    ///
    /// # Errors
    ///
    /// Returns the classified `ApiError`.
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    pub async fn execute(&self, request: ApiRequest) -> Result<Value, ApiError> {
        if !request.is_mutating() {
            let response = self.dispatch(request).await?;
            return self.finish(response).await;
        }

        let response = self.dispatch_with_csrf(request.clone()).await?;
        match self.finish(response).await {
            Err(err) if err.is_csrf_rejection() => {
                warn!("CSRF token rejected; bootstrapping a fresh token");
                self.reset_csrf().await;
                let response = self.dispatch_with_csrf(request).await?;
                self.finish(response).await
            }
            outcome => outcome,
        }
    }

    /// Forget the held CSRF token; the next mutating call bootstraps again.
    pub async fn reset_csrf(&self) {
        *self.inner.csrf_token.lock().await = None;
    }

    async fn dispatch(&self, request: ApiRequest) -> Result<RawResponse, ApiError> {
        self.inner.transport.send(request).await.map_err(|e| {
            warn!(error = %e, "Request failed before a response arrived");
            ApiError::network(&e)
        })
    }

    async fn dispatch_with_csrf(&self, mut request: ApiRequest) -> Result<RawResponse, ApiError> {
        let token = self.csrf_token().await?;
        let value = HeaderValue::from_str(token.expose_secret())
            .map_err(|e| ApiError::malformed(reqwest::StatusCode::OK, e))?;
        request
            .headers
            .insert(self.inner.csrf_header.clone(), value);
        self.dispatch(request).await
    }

    /// Current token, bootstrapping one if none is held.
    async fn csrf_token(&self) -> Result<SecretString, ApiError> {
        let mut held = self.inner.csrf_token.lock().await;
        if let Some(token) = held.as_ref() {
            return Ok(token.clone());
        }

        debug!("Bootstrapping CSRF token");
        let response = self.dispatch(ApiRequest::get(endpoints::CSRF)).await?;
        let body = response.body_value();
        if let Some(kind) = ApiErrorKind::from_status(response.status) {
            let err = ApiError::from_response(response.status, body);
            if kind == ApiErrorKind::Unauthorized {
                self.notify_unauthorized();
            }
            return Err(err);
        }

        let token = csrf::from_body(&body)
            .or_else(|| csrf::from_set_cookie(&response.headers, &self.inner.csrf_cookie))
            .ok_or_else(|| {
                ApiError::malformed(response.status, "CSRF bootstrap returned no token")
            })?;
        *held = Some(token.clone());
        Ok(token)
    }

    /// Classify a response, picking up any rotated CSRF cookie on the way.
    async fn finish(&self, response: RawResponse) -> Result<Value, ApiError> {
        if let Some(rotated) = csrf::from_set_cookie(&response.headers, &self.inner.csrf_cookie) {
            debug!("CSRF cookie rotated by response");
            *self.inner.csrf_token.lock().await = Some(rotated);
        }

        let body = response.body_value();
        let Some(kind) = ApiErrorKind::from_status(response.status) else {
            return Ok(body);
        };

        let err = ApiError::from_response(response.status, body);
        match kind {
            ApiErrorKind::Unauthorized => {
                debug!("Backend reported an invalid session");
                self.notify_unauthorized();
            }
            ApiErrorKind::ServerFault => report_server_fault(&err, "Backend server fault"),
            _ => debug!(error = %err, "Request rejected"),
        }
        Err(err)
    }

    fn notify_unauthorized(&self) {
        let listeners: Vec<_> = self
            .inner
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        for listener in listeners {
            listener.on_unauthorized();
        }
    }
}

/// Capture a server fault to Sentry and log it with the event ID.
fn report_server_fault(err: &ApiError, message: &str) {
    let event_id = sentry::capture_error(err);
    tracing::error!(error = %err, sentry_event_id = %event_id, "{message}");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::testing::MockTransport;

    fn client(mock: &Arc<MockTransport>) -> ApiClient {
        ApiClient::new(mock.clone(), &ClientConfig::for_tests())
    }

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl UnauthorizedListener for Counter {
        fn on_unauthorized(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_get_skips_csrf() {
        let mock = MockTransport::new();
        mock.reply(Method::GET, endpoints::CART, 200, json!({"items": []}));

        let api = client(&mock);
        api.request(Method::GET, endpoints::CART, None).await.unwrap();

        let paths: Vec<_> = mock.requests().into_iter().map(|r| r.path).collect();
        assert_eq!(paths, vec![endpoints::CART.to_string()]);
    }

    #[tokio::test]
    async fn test_bootstrap_precedes_first_mutation_only() {
        let mock = MockTransport::new();
        mock.reply(Method::GET, endpoints::CSRF, 200, json!({"csrfToken": "tok-1"}));
        mock.always(Method::POST, endpoints::CART_ADD, 200, json!({"items": []}));

        let api = client(&mock);
        api.request(Method::POST, endpoints::CART_ADD, Some(json!({})))
            .await
            .unwrap();
        api.request(Method::POST, endpoints::CART_ADD, Some(json!({})))
            .await
            .unwrap();

        let requests = mock.requests();
        let paths: Vec<_> = requests.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![endpoints::CSRF, endpoints::CART_ADD, endpoints::CART_ADD]
        );
        for request in &requests[1..] {
            assert_eq!(request.headers.get("X-CSRFToken").unwrap(), "tok-1");
        }
    }

    #[tokio::test]
    async fn test_csrf_rejection_rebootstraps_once() {
        let mock = MockTransport::new();
        mock.reply(Method::GET, endpoints::CSRF, 200, json!({"csrfToken": "old"}));
        mock.reply(Method::GET, endpoints::CSRF, 200, json!({"csrfToken": "new"}));
        mock.reply(
            Method::POST,
            endpoints::CART_ADD,
            403,
            json!({"detail": "CSRF Failed: CSRF token incorrect."}),
        );
        mock.reply(Method::POST, endpoints::CART_ADD, 200, json!({"items": []}));

        let api = client(&mock);
        api.request(Method::POST, endpoints::CART_ADD, Some(json!({})))
            .await
            .unwrap();

        let adds = mock.requests_to(endpoints::CART_ADD);
        assert_eq!(adds.len(), 2);
        assert_eq!(adds[1].headers.get("X-CSRFToken").unwrap(), "new");
    }

    #[tokio::test]
    async fn test_network_failure_is_not_retried() {
        let mock = MockTransport::new();
        mock.always(Method::GET, endpoints::CSRF, 200, json!({"csrfToken": "tok"}));
        mock.fail(Method::POST, endpoints::CART_ADD);

        let api = client(&mock);
        let err = api
            .request(Method::POST, endpoints::CART_ADD, Some(json!({})))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ApiErrorKind::Network);
        assert_eq!(mock.requests_to(endpoints::CART_ADD).len(), 1);
    }

    #[tokio::test]
    async fn test_unauthorized_notifies_listeners() {
        let mock = MockTransport::new();
        mock.reply(Method::GET, endpoints::ORDERS, 401, json!({"detail": "Not authenticated"}));

        let api = client(&mock);
        let counter = Arc::new(Counter::default());
        let weak: Weak<Counter> = Arc::downgrade(&counter);
        api.on_unauthorized(weak);

        let err = api.get::<Value>(endpoints::ORDERS).await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rotated_cookie_replaces_token() {
        let mock = MockTransport::new();
        mock.reply(Method::GET, endpoints::CSRF, 200, json!({"csrfToken": "before"}));
        mock.reply_with_cookie(
            Method::POST,
            endpoints::LOGIN,
            200,
            json!({"id": 1}),
            "csrftoken=after; Path=/",
        );
        mock.reply(Method::POST, endpoints::CART_ADD, 200, json!({"items": []}));

        let api = client(&mock);
        api.request(Method::POST, endpoints::LOGIN, Some(json!({})))
            .await
            .unwrap();
        api.request(Method::POST, endpoints::CART_ADD, Some(json!({})))
            .await
            .unwrap();

        let add = &mock.requests_to(endpoints::CART_ADD)[0];
        assert_eq!(add.headers.get("X-CSRFToken").unwrap(), "after");
        assert_eq!(mock.requests_to(endpoints::CSRF).len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_success_body() {
        let mock = MockTransport::new();
        mock.reply(Method::GET, endpoints::CART, 200, json!({"items": "nope"}));

        #[derive(Debug, serde::Deserialize)]
        struct Shape {
            #[allow(dead_code)]
            items: Vec<u32>,
        }

        let api = client(&mock);
        let err = api.get::<Shape>(endpoints::CART).await.unwrap_err();
        assert_eq!(err.kind(), ApiErrorKind::ServerFault);
    }

    /// Sentry events captured while running `f` to completion.
    fn captured_during(
        f: impl std::future::Future<Output = ()>,
    ) -> Vec<sentry::protocol::Event<'static>> {
        sentry::test::with_captured_events(|| {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap()
                .block_on(f);
        })
    }

    #[test]
    fn test_malformed_success_body_is_reported() {
        let mock = MockTransport::new();
        mock.reply(Method::GET, endpoints::PROFILE, 200, json!(["not", "a", "profile"]));
        let api = client(&mock);

        let events = captured_during(async move {
            let err = api
                .get::<std::collections::HashMap<String, String>>(endpoints::PROFILE)
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ApiErrorKind::ServerFault);
        });

        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_server_fault_status_is_reported() {
        let mock = MockTransport::new();
        mock.reply(Method::GET, endpoints::ORDERS, 500, json!({"error": "boom"}));
        let api = client(&mock);

        let events = captured_during(async move {
            api.get::<Value>(endpoints::ORDERS).await.unwrap_err();
        });

        assert_eq!(events.len(), 1);
    }
}
