// src/handlers/progress.rs

use axum::{Extension, Json, extract::State, response::IntoResponse};
use chrono::Utc;
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    db,
    error::AppError,
    models::progress::{ProgressResponse, RecordProgressRequest},
    services::{enrollment, progress},
    utils::jwt::Claims,
};

/// Records lesson completion and/or time spent, then returns the lesson's
/// progress row and the recomputed course percentage.
pub async fn record_progress(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<RecordProgressRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let user_id = claims.acting_user(payload.user_id)?;

    let mut tx = db::begin_write(&pool).await?;

    let course_id = sqlx::query_scalar::<_, i64>("SELECT course_id FROM lessons WHERE id = ?")
        .bind(payload.lesson_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("Lesson not found".to_string()))?;

    enrollment::ensure_access(&mut tx, user_id, claims.role_for(user_id), course_id)
        .await?;

    let update = progress::record(
        &mut tx,
        user_id,
        payload.lesson_id,
        payload.is_completed,
        payload.time_spent,
        Utc::now(),
    )
    .await?;

    tx.commit().await?;

    Ok(Json(ProgressResponse {
        progress: update.lesson,
        course_progress: update.course_progress,
    }))
}
