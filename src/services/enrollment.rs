// src/services/enrollment.rs

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{
    error::{AppError, is_unique_violation},
    models::user::Role,
};

/// Outcome of an idempotent enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollOutcome {
    Created,
    AlreadyEnrolled,
}

pub async fn is_enrolled(
    conn: &mut SqliteConnection,
    user_id: i64,
    course_id: i64,
) -> Result<bool, AppError> {
    let row = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM enrollments WHERE user_id = ? AND course_id = ?",
    )
    .bind(user_id)
    .bind(course_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.is_some())
}

/// Creates an ACTIVE enrollment unless one already exists.
///
/// The existence check is only a fast path; the UNIQUE (user_id, course_id)
/// constraint is what settles concurrent callers, and losing that race counts
/// as success.
pub async fn enroll(
    conn: &mut SqliteConnection,
    user_id: i64,
    course_id: i64,
    now: DateTime<Utc>,
) -> Result<EnrollOutcome, AppError> {
    if is_enrolled(conn, user_id, course_id).await? {
        return Ok(EnrollOutcome::AlreadyEnrolled);
    }

    let inserted = sqlx::query(
        r#"
        INSERT INTO enrollments (user_id, course_id, status, progress, started_at, time_spent)
        VALUES (?, ?, 'ACTIVE', 0, ?, 0)
        "#,
    )
    .bind(user_id)
    .bind(course_id)
    .bind(now)
    .execute(&mut *conn)
    .await;

    match inserted {
        Ok(_) => {
            tracing::info!(user_id, course_id, "enrollment created");
            Ok(EnrollOutcome::Created)
        }
        Err(e) if is_unique_violation(&e) => {
            tracing::debug!(user_id, course_id, "enrollment raced with another writer");
            Ok(EnrollOutcome::AlreadyEnrolled)
        }
        Err(e) => Err(e.into()),
    }
}

/// Course content is visible to admins, the course's instructor and its
/// enrolled learners.
pub async fn ensure_access(
    conn: &mut SqliteConnection,
    user_id: i64,
    role: Role,
    course_id: i64,
) -> Result<(), AppError> {
    if role == Role::Admin {
        return Ok(());
    }

    let instructor_id =
        sqlx::query_scalar::<_, i64>("SELECT instructor_id FROM courses WHERE id = ?")
            .bind(course_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or(AppError::NotFound("Course not found".to_string()))?;

    if instructor_id == user_id || is_enrolled(conn, user_id, course_id).await? {
        return Ok(());
    }

    Err(AppError::Forbidden(
        "You are not enrolled in this course".to_string(),
    ))
}
