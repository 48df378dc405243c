// src/payments/provider.rs

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::AppError;

/// What we ask the provider to charge for.
#[derive(Debug, Clone)]
pub struct NewCheckoutSession {
    pub user_id: i64,
    pub course_id: i64,
    pub course_title: String,
    /// Smallest currency unit (cents).
    pub amount_cents: i64,
    pub currency: String,
    pub customer_email: String,
    pub success_url: String,
    pub cancel_url: String,
}

/// Provider-side view of a checkout session.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    /// "paid", "unpaid" or "no_payment_required".
    pub payment_status: String,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Checkout session ids look like `cs_test_a1B2...`. Anything else is refused
/// before it reaches a request path.
pub fn is_session_id(id: &str) -> bool {
    id.strip_prefix("cs_").is_some_and(|rest| {
        !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

impl CheckoutSession {
    pub fn is_paid(&self) -> bool {
        self.payment_status == "paid"
    }

    pub fn metadata_id(&self, key: &str) -> Option<i64> {
        self.metadata.get(key).and_then(|v| v.parse::<i64>().ok())
    }

    pub fn user_id(&self) -> Option<i64> {
        self.metadata_id("userId")
    }

    pub fn course_id(&self) -> Option<i64> {
        self.metadata_id("courseId")
    }
}

#[derive(Debug)]
pub enum ProviderError {
    /// No credentials configured for the provider.
    NotConfigured,
    /// The id is not shaped like a checkout session id.
    InvalidSessionId(String),
    /// Transport-level failure (DNS, TLS, timeout...).
    Http(String),
    /// The provider answered with an error status.
    Api { status: u16, message: String },
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::NotConfigured => write!(f, "payment provider is not configured"),
            ProviderError::InvalidSessionId(id) => write!(f, "invalid checkout session id: {:?}", id),
            ProviderError::Http(msg) => write!(f, "payment provider unreachable: {}", msg),
            ProviderError::Api { status, message } => {
                write!(f, "payment provider error ({}): {}", status, message)
            }
        }
    }
}

impl std::error::Error for ProviderError {}

/// Provider failures are not retryable by us; the user has to restart checkout.
impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        tracing::warn!("Payment provider call failed: {}", err);
        AppError::PaymentFailed(err.to_string())
    }
}

/// Hosted checkout operations used by the payment handlers.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: &NewCheckoutSession,
    ) -> Result<CheckoutSession, ProviderError>;

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, ProviderError>;
}
