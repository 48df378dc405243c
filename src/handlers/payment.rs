// src/handlers/payment.rs

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;
use sqlx::SqlitePool;

use crate::{
    config::WEBHOOK_TOLERANCE_SECS,
    error::AppError,
    models::{
        course::{AccessRule, Course},
        payment::{CheckoutRequest, CheckoutResponse, CompleteParams, Payment},
    },
    payments::{
        provider::NewCheckoutSession,
        webhook::{WebhookEvent, verify_signature},
    },
    services::{enrollment, reconcile::reconcile},
    state::AppState,
    utils::jwt::Claims,
};

const SIGNATURE_HEADER: &str = "stripe-signature";

/// Starts a hosted checkout for a PAYMENT course and records a PENDING payment.
pub async fn create_checkout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let mut conn = state.pool.acquire().await?;

    let course = sqlx::query_as::<_, Course>(
        "SELECT * FROM courses WHERE id = ? AND is_published = 1",
    )
    .bind(payload.course_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::NotFound("Course not found".to_string()))?;

    if course.access_rule != AccessRule::Payment {
        return Err(AppError::BadRequest(
            "This course does not require payment".to_string(),
        ));
    }

    if enrollment::is_enrolled(&mut conn, user_id, course.id).await? {
        return Err(AppError::Conflict(
            "You are already enrolled in this course".to_string(),
        ));
    }

    let email = sqlx::query_scalar::<_, String>("SELECT email FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    let base = state.config.app_base_url.trim_end_matches('/');
    let request = NewCheckoutSession {
        user_id,
        course_id: course.id,
        course_title: course.title.clone(),
        amount_cents: (course.price * 100.0).round() as i64,
        currency: "usd".to_string(),
        customer_email: email,
        success_url: format!("{}/payments/success?session_id={{CHECKOUT_SESSION_ID}}", base),
        cancel_url: format!("{}/courses/{}", base, course.id),
    };

    let session = state.payments.create_checkout_session(&request).await?;

    sqlx::query(
        r#"
        INSERT INTO payments (user_id, course_id, amount, status, stripe_session_id, created_at)
        VALUES (?, ?, ?, 'PENDING', ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(course.id)
    .bind(course.price)
    .bind(&session.id)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        tracing::error!("Failed to store payment for session {}: {:?}", session.id, e);
        AppError::from(e)
    })?;

    tracing::info!(user_id, course_id = course.id, session_id = %session.id, "checkout started");

    Ok((
        StatusCode::CREATED,
        Json(CheckoutResponse {
            session_id: session.id,
            url: session.url,
        }),
    ))
}

/// Client-side completion after the provider redirects back.
pub async fn complete_payment(
    State(state): State<AppState>,
    Query(params): Query<CompleteParams>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = reconcile(
        &state.pool,
        state.payments.as_ref(),
        &params.session_id,
        Utc::now(),
    )
    .await?;

    Ok(Json(outcome))
}

/// Provider webhook. Only `checkout.session.completed` events do anything.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    if let Some(secret) = state.config.stripe_webhook_secret.as_deref() {
        let header = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::BadRequest("Missing webhook signature".to_string()))?;

        verify_signature(
            &body,
            header,
            secret,
            Utc::now().timestamp(),
            WEBHOOK_TOLERANCE_SECS,
        )
        .map_err(|e| {
            tracing::warn!("Rejected webhook: {:?}", e);
            AppError::BadRequest("Invalid webhook signature".to_string())
        })?;
    }

    let event: WebhookEvent = serde_json::from_slice(&body)?;

    let Some(session_id) = event.checkout_session_id() else {
        tracing::debug!(event_type = %event.event_type, "ignoring webhook event");
        return Ok(Json(json!({ "received": true, "handled": false })));
    };

    if event.is_unpaid_checkout() {
        tracing::info!(event_id = ?event.id, session_id, "checkout completed without payment yet, skipping");
        return Ok(Json(json!({ "received": true, "handled": false })));
    }

    let outcome = reconcile(&state.pool, state.payments.as_ref(), session_id, Utc::now())
        .await
        .map_err(|e| {
            tracing::error!(event_id = ?event.id, session_id, "webhook reconciliation failed: {}", e);
            e
        })?;

    Ok(Json(json!({ "received": true, "handled": true, "outcome": outcome })))
}

/// The caller's payment history.
pub async fn list_my_payments(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let payments = sqlx::query_as::<_, Payment>(
        "SELECT * FROM payments WHERE user_id = ? ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(payments))
}
