//! Session store.
//!
//! Tracks whether this tab is signed in. The state lives in a
//! `tokio::sync::watch` channel so views can subscribe; every transition
//! goes through the store.
//!
//! # Ordering
//!
//! Each transition that starts a new session epoch (login start, logout,
//! a 401 demotion) bumps a generation counter inside the same channel
//! update that changes the state. An in-flight login or re-validation
//! remembers the generation it started under and applies its outcome only
//! if the counter has not moved. This is what keeps a late login response
//! from resurrecting a session the user already logged out of.
//!
//! Login and re-validation are serialized against each other. Logout is
//! not: it must win immediately even while a login is stuck on the network.

mod error;

pub use error::AuthError;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, instrument, warn};

use ojas_core::{Email, EmailError, SessionStatus, User};

use crate::http::{ApiClient, ApiError, ApiErrorKind, ApiRequest, UnauthorizedListener, endpoints};
use crate::telemetry::{add_breadcrumb, clear_sentry_user, set_sentry_user};

/// Current session state. Only `Authenticated` carries a user.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Session {
    #[default]
    Anonymous,
    Authenticating,
    Authenticated(User),
    /// The last re-validation reached no verdict.
    Error,
}

impl Session {
    /// Status without the user.
    #[must_use]
    pub const fn status(&self) -> SessionStatus {
        match self {
            Self::Anonymous => SessionStatus::Anonymous,
            Self::Authenticating => SessionStatus::Authenticating,
            Self::Authenticated(_) => SessionStatus::Authenticated,
            Self::Error => SessionStatus::Error,
        }
    }

    /// The signed-in user, if any.
    #[must_use]
    pub const fn user(&self) -> Option<&User> {
        match self {
            Self::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    /// Whether a user is signed in.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

/// Email and password for a first-party sign-in.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: Email,
    pub password: SecretString,
}

impl Credentials {
    /// Validate the email and wrap the password.
    ///
    /// # Errors
    ///
    /// Returns an error if the email is malformed.
    pub fn new(email: &str, password: impl Into<String>) -> Result<Self, EmailError> {
        Ok(Self {
            email: Email::parse(email)?,
            password: SecretString::from(password.into()),
        })
    }
}

/// User payloads arrive either bare or wrapped as `{"user": {...}}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum UserPayload {
    Bare(User),
    Wrapped { user: Option<User> },
}

/// Extract a user from a response body, if it carries one.
fn user_from_payload(value: Value) -> Result<Option<User>, ApiError> {
    if !value.is_object() {
        return Ok(None);
    }
    match serde_json::from_value::<UserPayload>(value) {
        Ok(UserPayload::Bare(user)) => Ok(Some(user)),
        Ok(UserPayload::Wrapped { user }) => Ok(user),
        Err(e) => {
            warn!(error = %e, "Unexpected user payload");
            Err(ApiError::malformed(reqwest::StatusCode::OK, e))
        }
    }
}

/// Tab-scoped session state and the operations that change it.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    api: ApiClient,
    state: watch::Sender<Session>,
    /// Only read or written inside `state` updates.
    generation: AtomicU64,
    /// Serializes login and re-validation.
    transitions: Mutex<()>,
}

impl SessionInner {
    /// Start a new epoch with `next` as its state. Returns the epoch.
    fn begin(&self, next: Session) -> u64 {
        let mut generation = 0;
        self.state.send_modify(|state| {
            generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *state = next;
        });
        generation
    }

    /// Apply `next` if no newer epoch has started since `generation`.
    ///
    /// Returns whether the outcome was still current. Subscribers are only
    /// woken when the state actually changes.
    fn settle(&self, generation: u64, next: Session) -> bool {
        let mut current = false;
        self.state.send_if_modified(|state| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            current = true;
            if *state == next {
                return false;
            }
            *state = next;
            true
        });
        current
    }
}

impl UnauthorizedListener for SessionInner {
    /// Any 401 ends a confirmed session.
    ///
    /// An in-flight sign-in is left alone: its own 401 is a rejected
    /// password, and the login path reports it.
    fn on_unauthorized(&self) {
        let mut demoted = false;
        self.state.send_if_modified(|state| {
            if !matches!(state, Session::Authenticated(_) | Session::Error) {
                return false;
            }
            self.generation.fetch_add(1, Ordering::SeqCst);
            *state = Session::Anonymous;
            demoted = true;
            true
        });
        if demoted {
            clear_sentry_user();
            info!("Session rejected by backend; now anonymous");
        }
    }
}

impl SessionStore {
    /// Create a store and register it for 401 notifications.
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        let (state, _) = watch::channel(Session::Anonymous);
        let inner = Arc::new(SessionInner {
            api,
            state,
            generation: AtomicU64::new(0),
            transitions: Mutex::new(()),
        });
        let listener: Weak<SessionInner> = Arc::downgrade(&inner);
        inner.api.on_unauthorized(listener);
        Self { inner }
    }

    /// Current state.
    #[must_use]
    pub fn snapshot(&self) -> Session {
        self.inner.state.borrow().clone()
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.inner.state.borrow().status()
    }

    /// Signed-in user, if any.
    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.inner.state.borrow().user().cloned()
    }

    /// Subscribe to state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.state.subscribe()
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns the backend's classified error unchanged, or
    /// [`AuthError::Superseded`] if a logout landed while the request was
    /// in flight.
    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    pub async fn login(&self, credentials: &Credentials) -> Result<User, AuthError> {
        let request = ApiRequest::post(endpoints::LOGIN).json(json!({
            "email": credentials.email.as_str(),
            "password": credentials.password.expose_secret(),
        }));
        self.authenticate("password", request).await
    }

    /// Sign in with a token issued by a third-party identity provider.
    ///
    /// # Errors
    ///
    /// Same as [`SessionStore::login`].
    #[instrument(skip(self, id_token))]
    pub async fn login_with_external_credential(
        &self,
        id_token: &SecretString,
    ) -> Result<User, AuthError> {
        let request = ApiRequest::post(endpoints::GOOGLE_LOGIN).json(json!({
            "id_token": id_token.expose_secret(),
        }));
        self.authenticate("google", request).await
    }

    async fn authenticate(&self, method: &str, request: ApiRequest) -> Result<User, AuthError> {
        let _serial = self.inner.transitions.lock().await;
        let generation = self.inner.begin(Session::Authenticating);
        add_breadcrumb("auth", "Sign-in started", Some(&[("method", method)]));

        match self.exchange(request).await {
            Ok(user) => {
                if !self
                    .inner
                    .settle(generation, Session::Authenticated(user.clone()))
                {
                    info!(user_id = %user.id, "Sign-in completed after logout; discarded");
                    return Err(AuthError::Superseded);
                }
                set_sentry_user(&user);
                info!(user_id = %user.id, method, "Signed in");
                Ok(user)
            }
            Err(err) => {
                self.inner.settle(generation, Session::Anonymous);
                add_breadcrumb("auth", "Sign-in failed", Some(&[("method", method)]));
                debug!(error = %err, "Sign-in rejected");
                Err(err.into())
            }
        }
    }

    /// Post the sign-in request and resolve the user it established.
    ///
    /// Backends that answer a successful sign-in without the user record
    /// are asked for the session's user afterwards.
    async fn exchange(&self, request: ApiRequest) -> Result<User, ApiError> {
        let body = self.inner.api.execute(request).await?;
        if let Some(user) = user_from_payload(body)? {
            return Ok(user);
        }
        self.fetch_current_user().await?.ok_or_else(|| {
            ApiError::new(
                ApiErrorKind::Unauthorized,
                "sign-in succeeded but the backend reports no session",
            )
        })
    }

    /// Ask the backend who the session belongs to.
    ///
    /// 401, 403 and 404 all mean "nobody".
    async fn fetch_current_user(&self) -> Result<Option<User>, ApiError> {
        match self
            .inner
            .api
            .execute(ApiRequest::get(endpoints::SESSION_USER))
            .await
        {
            Ok(body) => user_from_payload(body),
            Err(err)
                if matches!(
                    err.kind(),
                    ApiErrorKind::Unauthorized | ApiErrorKind::Forbidden | ApiErrorKind::NotFound
                ) =>
            {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// End the session.
    ///
    /// Local state is cleared before the backend is told, so the tab is
    /// anonymous even if the call never arrives. Failures are logged and
    /// otherwise ignored.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        self.inner.begin(Session::Anonymous);
        clear_sentry_user();
        add_breadcrumb("auth", "Signed out", None);

        if let Err(err) = self
            .inner
            .api
            .execute(ApiRequest::post(endpoints::LOGOUT))
            .await
        {
            warn!(error = %err, "Backend logout failed; local session already cleared");
        }
    }

    /// Re-validate the session against the backend.
    ///
    /// Never fails. A definite answer moves the state to `Authenticated`
    /// or `Anonymous`. A network or server fault keeps a confirmed session;
    /// any other unexpected answer becomes `Error`. Calling this
    /// again without a server-side change leaves the state, and
    /// subscribers, untouched.
    #[instrument(skip(self))]
    pub async fn check_auth(&self) -> Option<User> {
        let _serial = self.inner.transitions.lock().await;
        let generation = self.inner.generation.load(Ordering::SeqCst);

        let next = match self.fetch_current_user().await {
            Ok(Some(user)) => Session::Authenticated(user),
            Ok(None) => Session::Anonymous,
            Err(err) => {
                warn!(error = %err, "Session check reached no verdict");
                match self.snapshot() {
                    confirmed @ Session::Authenticated(_) if err.kind().is_transient() => {
                        confirmed
                    }
                    _ => Session::Error,
                }
            }
        };

        if self.inner.settle(generation, next) {
            match self.user() {
                Some(user) => set_sentry_user(&user),
                None => clear_sentry_user(),
            }
        }
        self.user()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use reqwest::Method;

    use super::*;
    use crate::config::ClientConfig;
    use crate::testing::MockTransport;

    fn user_json() -> Value {
        json!({
            "id": 7,
            "username": "asha",
            "first_name": "Asha",
            "last_name": "Rao",
            "email": "asha@ojasritu.in"
        })
    }

    fn store(mock: &Arc<MockTransport>) -> SessionStore {
        mock.with_csrf();
        SessionStore::new(ApiClient::new(mock.clone(), &ClientConfig::for_tests()))
    }

    fn credentials() -> Credentials {
        Credentials::new("asha@ojasritu.in", "hunter22").unwrap()
    }

    #[test]
    fn test_user_payload_shapes() {
        let bare = user_from_payload(user_json()).unwrap().unwrap();
        assert_eq!(bare.username, "asha");

        let wrapped = user_from_payload(json!({"user": user_json()})).unwrap();
        assert_eq!(wrapped.unwrap().id.as_i32(), 7);

        assert!(user_from_payload(json!({"user": null})).unwrap().is_none());
        assert!(user_from_payload(json!({"detail": "Logged in"})).unwrap().is_none());
        assert!(user_from_payload(Value::Null).unwrap().is_none());
        assert!(user_from_payload(json!({"user": {"id": "x"}})).is_err());
    }

    #[test]
    fn test_credentials_reject_bad_email() {
        assert!(Credentials::new("not-an-email", "pw").is_err());
    }

    #[tokio::test]
    async fn test_login_success() {
        let mock = MockTransport::new();
        mock.reply(Method::POST, endpoints::LOGIN, 200, json!({"user": user_json()}));
        let session = store(&mock);

        let user = session.login(&credentials()).await.unwrap();

        assert_eq!(user.display_name(), "Asha");
        assert_eq!(session.status(), SessionStatus::Authenticated);
        let body = mock.requests_to(endpoints::LOGIN)[0].json_body().cloned().unwrap();
        assert_eq!(body["email"], "asha@ojasritu.in");
        assert_eq!(body["password"], "hunter22");
    }

    #[tokio::test]
    async fn test_login_failure_reverts_and_passes_error_through() {
        let mock = MockTransport::new();
        mock.reply(
            Method::POST,
            endpoints::LOGIN,
            401,
            json!({"error": "Invalid email or password"}),
        );
        let session = store(&mock);

        let err = session.login(&credentials()).await.unwrap_err();

        let api = err.api_error().unwrap();
        assert_eq!(api.kind(), ApiErrorKind::Unauthorized);
        assert_eq!(err.user_message(), "Invalid email or password");
        assert_eq!(session.snapshot(), Session::Anonymous);
    }

    #[tokio::test]
    async fn test_login_without_user_fetches_session_user() {
        let mock = MockTransport::new();
        mock.reply(Method::POST, endpoints::GOOGLE_LOGIN, 200, json!({"detail": "ok"}));
        mock.reply(Method::GET, endpoints::SESSION_USER, 200, user_json());
        let session = store(&mock);

        let token = SecretString::from("google-id-token".to_string());
        let user = session.login_with_external_credential(&token).await.unwrap();

        assert_eq!(user.id.as_i32(), 7);
        let body = mock.requests_to(endpoints::GOOGLE_LOGIN)[0]
            .json_body()
            .cloned()
            .unwrap();
        assert_eq!(body, json!({"id_token": "google-id-token"}));
    }

    #[tokio::test]
    async fn test_logout_wins_over_inflight_login() {
        let mock = MockTransport::new();
        let pending = mock.defer(Method::POST, endpoints::LOGIN);
        mock.reply(Method::POST, endpoints::LOGOUT, 204, Value::Null);
        let session = store(&mock);

        let task = tokio::spawn({
            let session = session.clone();
            async move { session.login(&credentials()).await }
        });
        // CSRF bootstrap + login
        mock.wait_for_requests(2).await;
        assert_eq!(session.status(), SessionStatus::Authenticating);

        session.logout().await;
        pending.respond(200, user_json());

        let outcome = task.await.unwrap();
        assert!(matches!(outcome, Err(AuthError::Superseded)));
        assert_eq!(session.snapshot(), Session::Anonymous);
    }

    #[tokio::test]
    async fn test_logout_during_partition_still_anonymous() {
        let mock = MockTransport::new();
        mock.reply(Method::POST, endpoints::LOGIN, 200, user_json());
        mock.fail(Method::POST, endpoints::LOGOUT);
        let session = store(&mock);
        session.login(&credentials()).await.unwrap();

        session.logout().await;

        assert_eq!(session.snapshot(), Session::Anonymous);
    }

    #[tokio::test]
    async fn test_check_auth_is_idempotent() {
        let mock = MockTransport::new();
        mock.always(Method::GET, endpoints::SESSION_USER, 200, user_json());
        let session = store(&mock);
        let mut rx = session.subscribe();

        let first = session.check_auth().await;
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        let second = session.check_auth().await;
        assert_eq!(first, second);
        assert!(!rx.has_changed().unwrap());
        assert_eq!(session.status(), SessionStatus::Authenticated);
    }

    #[tokio::test]
    async fn test_check_auth_verdicts() {
        let mock = MockTransport::new();
        mock.reply(Method::GET, endpoints::SESSION_USER, 200, user_json());
        mock.reply(Method::GET, endpoints::SESSION_USER, 503, json!({}));
        mock.reply(Method::GET, endpoints::SESSION_USER, 403, json!({"detail": "nope"}));
        mock.fail(Method::GET, endpoints::SESSION_USER);
        let session = store(&mock);

        assert!(session.check_auth().await.is_some());
        // Server fault keeps a confirmed session.
        assert!(session.check_auth().await.is_some());
        assert_eq!(session.status(), SessionStatus::Authenticated);
        // A definite "nobody".
        assert!(session.check_auth().await.is_none());
        assert_eq!(session.status(), SessionStatus::Anonymous);
        // No verdict without a confirmed session.
        assert!(session.check_auth().await.is_none());
        assert_eq!(session.status(), SessionStatus::Error);
    }

    #[tokio::test]
    async fn test_check_auth_unexpected_rejection_is_error() {
        let mock = MockTransport::new();
        mock.reply(Method::GET, endpoints::SESSION_USER, 200, user_json());
        mock.reply(Method::GET, endpoints::SESSION_USER, 400, json!({"detail": "Bad request"}));
        let session = store(&mock);

        assert!(session.check_auth().await.is_some());
        assert!(session.check_auth().await.is_none());
        assert_eq!(session.status(), SessionStatus::Error);
    }

    #[tokio::test]
    async fn test_any_unauthorized_response_demotes() {
        let mock = MockTransport::new();
        mock.reply(Method::POST, endpoints::LOGIN, 200, user_json());
        mock.reply(Method::GET, endpoints::ORDERS, 401, json!({"detail": "expired"}));
        let session = store(&mock);
        session.login(&credentials()).await.unwrap();

        let api = session.inner.api.clone();
        let err = api.get::<Value>(endpoints::ORDERS).await.unwrap_err();

        assert!(err.is_unauthorized());
        assert_eq!(session.snapshot(), Session::Anonymous);
    }
}
