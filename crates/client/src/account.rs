//! Profile, order history and pre-booking endpoints.
//!
//! Thin typed wrappers over the access layer; none of these touch session
//! or cart state.

use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Method;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use ojas_core::{BookingId, Email, OrderId};

use crate::http::{ApiClient, ApiError, ApiRequest, FormPart, FormValue, endpoints};

// =============================================================================
// Types
// =============================================================================

/// Account profile as stored by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: Option<Email>,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// Image to upload as the profile avatar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvatarUpload {
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Fields submitted by the profile settings form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub first_name: String,
    pub last_name: String,
    pub email: Email,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<AvatarUpload>,
}

impl ProfileUpdate {
    fn into_parts(self) -> Result<Vec<FormPart>, ApiError> {
        let mut parts = vec![
            FormPart::text("first_name", self.first_name),
            FormPart::text("last_name", self.last_name),
            FormPart::text("email", self.email.as_str()),
            FormPart::text("phone", self.phone.unwrap_or_default()),
            FormPart::text("bio", self.bio.unwrap_or_default()),
        ];
        if let Some(avatar) = self.avatar {
            if !avatar.mime.starts_with("image/") {
                return Err(ApiError::invalid_input(format!(
                    "avatar must be an image, got {}",
                    avatar.mime
                )));
            }
            parts.push(FormPart {
                name: "avatar".to_string(),
                value: FormValue::File {
                    file_name: avatar.file_name,
                    mime: avatar.mime,
                    bytes: avatar.bytes,
                },
            });
        }
        Ok(parts)
    }
}

/// One line of a past order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    #[serde(default, alias = "product_name")]
    pub name: String,
    #[serde(default)]
    pub quantity: u32,
    #[serde(default)]
    pub price: Option<Decimal>,
}

/// A placed order or pre-booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    /// Human-facing order reference.
    #[serde(default)]
    pub order_id: String,
    #[serde(default)]
    pub final_amount: Option<Decimal>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
}

/// A consultation booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    #[serde(default)]
    pub consultation_type: String,
    #[serde(default)]
    pub scheduled_date: Option<NaiveDate>,
    #[serde(default)]
    pub scheduled_time: Option<String>,
    #[serde(default)]
    pub status: String,
}

/// Booking counts for the profile overview.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BookingSummary {
    /// Active or upcoming.
    pub active: usize,
    pub completed: usize,
}

impl BookingSummary {
    /// Count bookings by status label.
    #[must_use]
    pub fn from_bookings(bookings: &[Booking]) -> Self {
        bookings.iter().fold(Self::default(), |mut summary, booking| {
            let status = booking.status.to_ascii_lowercase();
            if status.contains("active") || status.contains("upcoming") {
                summary.active += 1;
            }
            if status.contains("complete") {
                summary.completed += 1;
            }
            summary
        })
    }
}

/// List endpoints answer either a bare array or a paginated page.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Page { results: Vec<T> },
    Bare(Vec<T>),
}

impl<T> Listing<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::Page { results } | Self::Bare(results) => results,
        }
    }
}

/// Reference shown after a successful pre-booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrebookingReceipt {
    pub reference: String,
}

impl PrebookingReceipt {
    const FALLBACK: &'static str = "PRE-BOOKED";

    /// Pick the reference out of the backend's answer: `order_id`, then
    /// `receipt`, then a fixed marker.
    #[must_use]
    pub fn from_response(body: &Value) -> Self {
        let reference = ["order_id", "receipt"]
            .iter()
            .find_map(|key| match body.get(key)? {
                Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .unwrap_or_else(|| Self::FALLBACK.to_string());
        Self { reference }
    }
}

// =============================================================================
// Client
// =============================================================================

/// Account endpoints for the signed-in user.
#[derive(Clone)]
pub struct AccountClient {
    api: ApiClient,
}

impl AccountClient {
    #[must_use]
    pub const fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Fetch the profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails.
    #[instrument(skip(self))]
    pub async fn profile(&self) -> Result<Profile, ApiError> {
        self.api.get(endpoints::PROFILE).await
    }

    /// Save the profile form, optionally replacing the avatar.
    ///
    /// # Errors
    ///
    /// Returns `Validation` locally for a non-image avatar, otherwise the
    /// backend's error.
    #[instrument(skip(self, update))]
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<Profile, ApiError> {
        let parts = update.into_parts()?;
        let request = ApiRequest::new(Method::PUT, endpoints::PROFILE).multipart(parts);
        self.api.send(request).await
    }

    /// Delete the avatar.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails.
    #[instrument(skip(self))]
    pub async fn remove_avatar(&self) -> Result<(), ApiError> {
        self.api
            .execute(ApiRequest::new(Method::DELETE, endpoints::PROFILE_AVATAR))
            .await
            .map(|_| ())
    }

    /// Order history.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails.
    #[instrument(skip(self))]
    pub async fn orders(&self) -> Result<Vec<Order>, ApiError> {
        self.api
            .get::<Listing<Order>>(endpoints::ORDERS)
            .await
            .map(Listing::into_vec)
    }

    /// One order.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown ID.
    #[instrument(skip(self))]
    pub async fn order(&self, id: OrderId) -> Result<Order, ApiError> {
        self.api.get(&endpoints::order(id)).await
    }

    /// Consultation bookings.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails.
    #[instrument(skip(self))]
    pub async fn bookings(&self) -> Result<Vec<Booking>, ApiError> {
        self.api
            .get::<Listing<Booking>>(endpoints::PREBOOKINGS)
            .await
            .map(Listing::into_vec)
    }

    /// Turn the server-side cart into a pre-booking.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails.
    #[instrument(skip(self))]
    pub async fn create_prebooking(&self) -> Result<PrebookingReceipt, ApiError> {
        let body = self
            .api
            .execute(ApiRequest::post(endpoints::PREBOOK_FROM_CART))
            .await?;
        Ok(PrebookingReceipt::from_response(&body))
    }
}
