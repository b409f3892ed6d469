//! Storefront facade.
//!
//! Wires the access layer, session store, cart manager and account
//! endpoints together and sequences the flows that span them (sign-in
//! followed by a cart re-fetch, logout clearing the cart, checkout).

use std::sync::Arc;

use secrecy::SecretString;
use tracing::{info, instrument, warn};

use ojas_core::{OrderId, User};

use crate::account::{AccountClient, Booking, Order, PrebookingReceipt, Profile, ProfileUpdate};
use crate::cart::CartManager;
use crate::config::ClientConfig;
use crate::error::{AppError, Result};
use crate::guard::{self, Access};
use crate::http::{ApiClient, ReqwestTransport, Transport};
use crate::session::{Credentials, SessionStore};
use crate::telemetry::add_breadcrumb;

/// Client state shared by every view of one tab.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct Storefront {
    inner: Arc<StorefrontInner>,
}

struct StorefrontInner {
    config: ClientConfig,
    api: ApiClient,
    session: SessionStore,
    cart: CartManager,
    account: AccountClient,
}

impl Storefront {
    /// Create a client that talks to the configured backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::new(&config)?);
        Ok(Self::with_transport(config, transport))
    }

    /// Create a client over an explicit transport.
    #[must_use]
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let api = ApiClient::new(transport, &config);
        let session = SessionStore::new(api.clone());
        let cart = CartManager::new(api.clone());
        let account = AccountClient::new(api.clone());

        Self {
            inner: Arc::new(StorefrontInner {
                config,
                api,
                session,
                cart,
                account,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// The shared access layer.
    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    #[must_use]
    pub fn session(&self) -> &SessionStore {
        &self.inner.session
    }

    #[must_use]
    pub fn cart(&self) -> &CartManager {
        &self.inner.cart
    }

    #[must_use]
    pub fn account(&self) -> &AccountClient {
        &self.inner.account
    }

    // =========================================================================
    // Session flows
    // =========================================================================

    /// Sign in, then replace the cart with the one the backend now
    /// associates with the user.
    ///
    /// # Errors
    ///
    /// Returns the sign-in error. A failed cart re-fetch is logged only.
    pub async fn login(&self, credentials: &Credentials) -> Result<User> {
        let user = self.inner.session.login(credentials).await?;
        self.refresh_cart_after("login").await;
        Ok(user)
    }

    /// Sign in with a third-party identity token.
    ///
    /// # Errors
    ///
    /// Returns `ExternalLoginDisabled` when no client ID is configured,
    /// otherwise the sign-in error.
    pub async fn login_with_external_credential(&self, id_token: &SecretString) -> Result<User> {
        if !self.inner.config.external_login_enabled() {
            return Err(AppError::ExternalLoginDisabled);
        }
        let user = self
            .inner
            .session
            .login_with_external_credential(id_token)
            .await?;
        self.refresh_cart_after("external login").await;
        Ok(user)
    }

    /// Sign out and drop the signed-in cart.
    ///
    /// The cart is cleared before the backend is told, so it never outlives
    /// the local session. Whatever cart the backend keeps for the anonymous
    /// session is fetched afterwards.
    pub async fn logout(&self) {
        self.inner.cart.reset();
        self.inner.session.logout().await;
        self.refresh_cart_after("logout").await;
    }

    /// Re-validate the session.
    pub async fn check_auth(&self) -> Option<User> {
        self.inner.session.check_auth().await
    }

    /// Check a protected view against the current session.
    #[must_use]
    pub fn guard(&self, intended_path: &str) -> Access {
        guard::guard(
            &self.inner.session.snapshot(),
            intended_path,
            &self.inner.config.login_path,
        )
    }

    async fn refresh_cart_after(&self, reason: &str) {
        if let Err(err) = self.inner.cart.refresh().await {
            warn!(reason, error = %err, "Cart refresh failed");
        }
    }

    // =========================================================================
    // Checkout
    // =========================================================================

    /// Turn the cart into a pre-booking.
    ///
    /// # Errors
    ///
    /// Returns `EmptyCart` without contacting the backend when the cart has
    /// no lines, otherwise the backend's error.
    #[instrument(skip(self))]
    pub async fn place_prebooking(&self) -> Result<PrebookingReceipt> {
        let cart = self.inner.cart.snapshot();
        if cart.is_empty() {
            return Err(AppError::EmptyCart);
        }

        let receipt = self.inner.account.create_prebooking().await?;
        add_breadcrumb(
            "checkout",
            "Pre-booking placed",
            Some(&[("reference", receipt.reference.as_str())]),
        );
        info!(reference = %receipt.reference, items = cart.total_count(), "Pre-booking placed");

        self.refresh_cart_after("checkout").await;
        Ok(receipt)
    }

    // =========================================================================
    // Account
    // =========================================================================

    /// # Errors
    ///
    /// Returns an error if the call fails.
    pub async fn profile(&self) -> Result<Profile> {
        Ok(self.inner.account.profile().await?)
    }

    /// # Errors
    ///
    /// Returns an error if the input is rejected or the call fails.
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<Profile> {
        Ok(self.inner.account.update_profile(update).await?)
    }

    /// # Errors
    ///
    /// Returns an error if the call fails.
    pub async fn remove_avatar(&self) -> Result<()> {
        Ok(self.inner.account.remove_avatar().await?)
    }

    /// # Errors
    ///
    /// Returns an error if the call fails.
    pub async fn orders(&self) -> Result<Vec<Order>> {
        Ok(self.inner.account.orders().await?)
    }

    /// # Errors
    ///
    /// Returns an error if the call fails.
    pub async fn order(&self, id: OrderId) -> Result<Order> {
        Ok(self.inner.account.order(id).await?)
    }

    /// # Errors
    ///
    /// Returns an error if the call fails.
    pub async fn bookings(&self) -> Result<Vec<Booking>> {
        Ok(self.inner.account.bookings().await?)
    }
}
