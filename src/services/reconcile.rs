// src/services/reconcile.rs

//! Turns a paid checkout session into a COMPLETED payment and an enrollment,
//! exactly once, no matter how often it is triggered.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::{
    db,
    error::AppError,
    models::payment::{Payment, PaymentStatus},
    payments::provider::{PaymentProvider, is_session_id},
    services::enrollment::{self, EnrollOutcome},
};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileOutcome {
    pub payment_id: i64,
    pub course_id: i64,
    /// False when the payment was already COMPLETED before this call.
    pub payment_updated: bool,
    /// False when the enrollment already existed.
    pub enrollment_created: bool,
}

pub async fn reconcile(
    pool: &SqlitePool,
    provider: &dyn PaymentProvider,
    session_id: &str,
    now: DateTime<Utc>,
) -> Result<ReconcileOutcome, AppError> {
    if session_id.trim().is_empty() {
        return Err(AppError::BadRequest("session_id is required".to_string()));
    }
    if !is_session_id(session_id) {
        return Err(AppError::BadRequest("session_id is malformed".to_string()));
    }

    let session = provider.retrieve_checkout_session(session_id).await?;

    if !session.is_paid() {
        return Err(AppError::PaymentFailed(format!(
            "Checkout session is not paid (status: {})",
            session.payment_status
        )));
    }

    let (Some(user_id), Some(course_id)) = (session.user_id(), session.course_id()) else {
        tracing::error!(session_id, metadata = ?session.metadata, "checkout session is missing userId/courseId metadata");
        return Err(AppError::PaymentFailed(
            "Checkout session is missing enrollment metadata".to_string(),
        ));
    };

    let mut tx = db::begin_write(pool).await?;

    let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE stripe_session_id = ?")
        .bind(session_id)
        .fetch_optional(&mut *tx)
        .await?;

    let Some(payment) = payment else {
        tracing::error!(session_id, user_id, course_id, "paid checkout session has no payment record");
        return Err(AppError::PaymentFailed(
            "No payment record exists for this checkout session".to_string(),
        ));
    };

    if payment.user_id != user_id || payment.course_id != course_id {
        tracing::error!(
            session_id,
            payment_id = payment.id,
            "checkout metadata does not match the payment record"
        );
        return Err(AppError::PaymentFailed(
            "Checkout session does not match the payment record".to_string(),
        ));
    }

    let payment_updated = match payment.status {
        PaymentStatus::Completed => false,
        PaymentStatus::Pending => {
            let result = sqlx::query(
                r#"
                UPDATE payments
                SET status = 'COMPLETED', stripe_payment_intent_id = ?
                WHERE id = ? AND status = 'PENDING'
                "#,
            )
            .bind(session.payment_intent.as_deref())
            .bind(payment.id)
            .execute(&mut *tx)
            .await?;
            result.rows_affected() == 1
        }
    };

    let outcome = enrollment::enroll(&mut tx, user_id, course_id, now).await?;

    tx.commit().await?;

    tracing::info!(
        session_id,
        payment_id = payment.id,
        payment_updated,
        enrollment_created = outcome == EnrollOutcome::Created,
        "payment reconciled"
    );

    Ok(ReconcileOutcome {
        payment_id: payment.id,
        course_id,
        payment_updated,
        enrollment_created: outcome == EnrollOutcome::Created,
    })
}
