// src/payments/stripe.rs

use async_trait::async_trait;
use serde::Deserialize;

use super::provider::{
    CheckoutSession, NewCheckoutSession, PaymentProvider, ProviderError, is_session_id,
};

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// Stripe Checkout over its form-encoded REST API.
pub struct StripeClient {
    http: reqwest::Client,
    secret_key: Option<String>,
    base_url: String,
}

#[derive(Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

impl StripeClient {
    pub fn new(secret_key: Option<String>) -> Self {
        Self::with_base_url(secret_key, STRIPE_API_BASE)
    }

    pub fn with_base_url(secret_key: Option<String>, base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn key(&self) -> Result<&str, ProviderError> {
        self.secret_key.as_deref().ok_or(ProviderError::NotConfigured)
    }

    async fn parse(response: reqwest::Response) -> Result<CheckoutSession, ProviderError> {
        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<StripeErrorBody>()
                .await
                .ok()
                .and_then(|b| b.error.message)
                .unwrap_or_else(|| status.to_string());
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<CheckoutSession>()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))
    }
}

/// Flattens a checkout request into Stripe's bracketed form keys.
fn checkout_form(request: &NewCheckoutSession) -> Vec<(String, String)> {
    vec![
        ("mode".into(), "payment".into()),
        ("success_url".into(), request.success_url.clone()),
        ("cancel_url".into(), request.cancel_url.clone()),
        ("customer_email".into(), request.customer_email.clone()),
        ("line_items[0][quantity]".into(), "1".into()),
        (
            "line_items[0][price_data][currency]".into(),
            request.currency.clone(),
        ),
        (
            "line_items[0][price_data][unit_amount]".into(),
            request.amount_cents.to_string(),
        ),
        (
            "line_items[0][price_data][product_data][name]".into(),
            request.course_title.clone(),
        ),
        ("metadata[userId]".into(), request.user_id.to_string()),
        ("metadata[courseId]".into(), request.course_id.to_string()),
    ]
}

#[async_trait]
impl PaymentProvider for StripeClient {
    async fn create_checkout_session(
        &self,
        request: &NewCheckoutSession,
    ) -> Result<CheckoutSession, ProviderError> {
        let response = self
            .http
            .post(format!("{}/checkout/sessions", self.base_url))
            .bearer_auth(self.key()?)
            .form(&checkout_form(request))
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        Self::parse(response).await
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, ProviderError> {
        if !is_session_id(session_id) {
            return Err(ProviderError::InvalidSessionId(session_id.to_string()));
        }

        let response = self
            .http
            .get(format!("{}/checkout/sessions/{}", self.base_url, session_id))
            .bearer_auth(self.key()?)
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        Self::parse(response).await
    }
}
