//! Session flows through the storefront facade.

#![allow(clippy::unwrap_used)]

use ojas_client::AppError;
use ojas_client::guard::{Access, can_enter};
use ojas_client::http::{ApiErrorKind, endpoints};
use ojas_client::session::{Credentials, Session};
use ojas_core::SessionStatus;
use ojas_integration_tests::{cart_body, storefront, user_json};
use reqwest::Method;
use secrecy::SecretString;
use serde_json::{Value, json};

fn credentials() -> Credentials {
    Credentials::new("asha@ojasritu.in", "correct horse").unwrap()
}

#[tokio::test]
async fn test_login_then_unauthorized_refresh_demotes_session() {
    let (storefront, mock) = storefront();
    mock.reply(Method::POST, endpoints::LOGIN, 200, json!({"user": user_json()}));
    mock.reply(Method::GET, endpoints::CART, 200, cart_body(&[(1, 500, 1)]));
    mock.reply(Method::GET, endpoints::CART, 401, json!({"detail": "Session expired"}));

    storefront.login(&credentials()).await.unwrap();
    assert_eq!(storefront.session().status(), SessionStatus::Authenticated);

    let err = storefront.cart().refresh().await.unwrap_err();

    assert_eq!(err.kind(), ApiErrorKind::Unauthorized);
    assert_eq!(storefront.session().snapshot(), Session::Anonymous);
    assert!(storefront.session().user().is_none());
    assert!(!can_enter(storefront.session().status()));
    assert!(matches!(storefront.guard("/checkout"), Access::Redirect { .. }));
    // The cart keeps its last known lines.
    assert_eq!(storefront.cart().snapshot().total_count(), 1);
}

#[tokio::test]
async fn test_guest_cart_is_replaced_by_server_cart_after_login() {
    let (storefront, mock) = storefront();
    mock.reply(Method::GET, endpoints::CART, 200, cart_body(&[(1, 500, 1), (2, 300, 2)]));
    mock.reply(Method::POST, endpoints::LOGIN, 200, user_json());
    mock.reply(
        Method::GET,
        endpoints::CART,
        200,
        cart_body(&[(2, 300, 2), (7, 120, 1), (1, 500, 1)]),
    );

    let guest = storefront.cart().refresh().await.unwrap();
    assert_eq!(guest.lines.len(), 2);

    storefront.login(&credentials()).await.unwrap();

    let merged = storefront.cart().snapshot();
    let ids: Vec<i32> = merged.lines.iter().map(|l| l.product_id.as_i32()).collect();
    assert_eq!(ids, vec![2, 7, 1]);
    // Only a re-fetch; nothing was pushed to the cart endpoints.
    assert!(mock.requests_to(endpoints::CART_ADD).is_empty());
    assert!(mock.requests_to(endpoints::CART_UPDATE).is_empty());
}

#[tokio::test]
async fn test_check_auth_twice_is_stable() {
    let (storefront, mock) = storefront();
    mock.always(Method::GET, endpoints::SESSION_USER, 200, json!({"user": user_json()}));
    let mut rx = storefront.session().subscribe();

    let first = storefront.check_auth().await;
    rx.borrow_and_update();
    let second = storefront.check_auth().await;

    assert_eq!(first, second);
    assert!(!rx.has_changed().unwrap());
    assert_eq!(first.unwrap().username, "asha");
}

#[tokio::test]
async fn test_logout_during_partition_leaves_session_anonymous() {
    let (storefront, mock) = storefront();
    mock.reply(Method::POST, endpoints::LOGIN, 200, user_json());
    mock.reply(Method::GET, endpoints::CART, 200, cart_body(&[(3, 80, 2)]));
    mock.fail(Method::POST, endpoints::LOGOUT);
    mock.fail(Method::GET, endpoints::CART);

    storefront.login(&credentials()).await.unwrap();
    storefront.logout().await;

    assert_eq!(storefront.session().snapshot(), Session::Anonymous);
    assert!(storefront.cart().snapshot().is_empty());
    assert_eq!(
        storefront.guard("/profile"),
        Access::Redirect {
            to: "/login?next=%2Fprofile".to_string()
        }
    );
}

#[tokio::test]
async fn test_cart_is_cleared_while_logout_is_in_flight() {
    let (storefront, mock) = storefront();
    mock.reply(Method::POST, endpoints::LOGIN, 200, user_json());
    mock.reply(Method::GET, endpoints::CART, 200, cart_body(&[(3, 80, 2)]));
    let pending = mock.defer(Method::POST, endpoints::LOGOUT);
    mock.reply(Method::GET, endpoints::CART, 200, cart_body(&[]));

    storefront.login(&credentials()).await.unwrap();
    assert_eq!(storefront.cart().snapshot().total_count(), 2);

    let logout = tokio::spawn({
        let storefront = storefront.clone();
        async move { storefront.logout().await }
    });
    // CSRF bootstrap, login, cart, logout
    mock.wait_for_requests(4).await;

    assert_eq!(storefront.session().snapshot(), Session::Anonymous);
    assert!(storefront.cart().snapshot().is_empty());

    pending.respond(204, Value::Null);
    logout.await.unwrap();
    assert!(storefront.cart().snapshot().is_empty());
    assert_eq!(mock.requests_to(endpoints::CART).len(), 2);
}

#[tokio::test]
async fn test_wrong_password_surfaces_backend_message() {
    let (storefront, mock) = storefront();
    mock.reply(
        Method::POST,
        endpoints::LOGIN,
        400,
        json!({"non_field_errors": ["Unable to log in with provided credentials."]}),
    );

    let err = storefront.login(&credentials()).await.unwrap_err();

    assert!(matches!(err, AppError::Auth(_)));
    assert_eq!(err.user_message(), "Unable to log in with provided credentials.");
    assert_eq!(storefront.session().status(), SessionStatus::Anonymous);
    // No cart re-fetch after a failed sign-in.
    assert!(mock.requests_to(endpoints::CART).is_empty());
}

#[tokio::test]
async fn test_external_login_exchanges_token_then_fetches_cart() {
    let (storefront, mock) = storefront();
    mock.reply(Method::POST, endpoints::GOOGLE_LOGIN, 200, json!({"success": true}));
    mock.reply(Method::GET, endpoints::SESSION_USER, 200, user_json());
    mock.reply(Method::GET, endpoints::CART, 200, cart_body(&[]));

    let token = SecretString::from("eyJhbGciOiJSUzI1NiJ9.google".to_string());
    let user = storefront.login_with_external_credential(&token).await.unwrap();

    assert_eq!(user.email.as_str(), "asha@ojasritu.in");
    let exchange = &mock.requests_to(endpoints::GOOGLE_LOGIN)[0];
    assert_eq!(
        exchange.json_body().cloned().unwrap_or(Value::Null),
        json!({"id_token": "eyJhbGciOiJSUzI1NiJ9.google"})
    );
    assert!(exchange.headers.contains_key("X-CSRFToken"));
    assert_eq!(mock.requests_to(endpoints::CART).len(), 1);
}
