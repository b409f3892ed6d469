//! Backend endpoint paths.
//!
//! The backend is a Django application; every path keeps its trailing slash.

pub const CSRF: &str = "/api/auth/csrf/";
pub const LOGIN: &str = "/api/auth/login/";
pub const GOOGLE_LOGIN: &str = "/api/auth/google/";
pub const LOGOUT: &str = "/api/auth/logout/";
pub const SESSION_USER: &str = "/api/auth/user/";

pub const PROFILE: &str = "/api/profile/";
pub const PROFILE_AVATAR: &str = "/api/profile/avatar/";

pub const CART: &str = "/api/cart/";
pub const CART_ADD: &str = "/api/cart/add/";
pub const CART_UPDATE: &str = "/api/cart/update/";
pub const CART_REMOVE: &str = "/api/cart/remove/";

pub const ORDERS: &str = "/api/orders/";
pub const PREBOOKINGS: &str = "/api/prebookings/";
pub const PREBOOK_FROM_CART: &str = "/api/prebook/";

/// Detail path for a single order.
#[must_use]
pub fn order(id: ojas_core::OrderId) -> String {
    format!("{ORDERS}{id}/")
}
