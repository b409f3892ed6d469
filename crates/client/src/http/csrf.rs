//! CSRF token extraction.
//!
//! The bootstrap endpoint returns the token in its body and also sets it as
//! a cookie; later responses (login, logout) may rotate the cookie.

use reqwest::header::{HeaderMap, SET_COOKIE};
use secrecy::SecretString;
use serde_json::Value;

/// Token from a bootstrap body (`{"csrfToken": "..."}`).
pub fn from_body(body: &Value) -> Option<SecretString> {
    ["csrfToken", "csrf_token", "csrftoken"]
        .iter()
        .find_map(|key| body.get(key).and_then(Value::as_str))
        .filter(|token| !token.is_empty())
        .map(SecretString::from)
}

/// Token from a `Set-Cookie` header carrying the named cookie.
///
/// An empty value (cookie deletion) yields `None`.
pub fn from_set_cookie(headers: &HeaderMap, cookie_name: &str) -> Option<SecretString> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|cookie| cookie.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| name.trim() == cookie_name)
        .map(|(_, value)| value.trim().trim_matches('"'))
        .filter(|value| !value.is_empty())
        .map(SecretString::from)
}
