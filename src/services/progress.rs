// src/services/progress.rs

//! Lesson progress and the derived course progress on enrollments.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{
    error::AppError,
    models::{enrollment::EnrollmentStatus, progress::LessonProgress},
};

/// Course completion percentage, rounded to a whole number.
/// A course without lessons is at 0.
pub fn course_percentage(completed: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    (100.0 * completed as f64 / total as f64).round()
}

/// Completion is decided on counts, not on the rounded percentage.
pub fn enrollment_status(completed: i64, total: i64) -> EnrollmentStatus {
    if total > 0 && completed >= total {
        EnrollmentStatus::Completed
    } else {
        EnrollmentStatus::Active
    }
}

/// Next `(is_completed, completed_at)` for a lesson.
///
/// Re-completing keeps the first timestamp; `Some(false)` clears completion;
/// `None` leaves things as they are.
pub fn next_completion(
    existing: Option<(bool, Option<DateTime<Utc>>)>,
    requested: Option<bool>,
    now: DateTime<Utc>,
) -> (bool, Option<DateTime<Utc>>) {
    let current = existing.unwrap_or((false, None));
    match requested {
        Some(true) => match current {
            (true, Some(at)) => (true, Some(at)),
            _ => (true, Some(now)),
        },
        Some(false) => (false, None),
        None => current,
    }
}

#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub lesson: LessonProgress,
    pub course_id: i64,
    pub course_progress: f64,
    pub status: EnrollmentStatus,
}

/// Records a learner's interaction with a lesson and recomputes the parent
/// enrollment. Runs on whatever connection or transaction it is given.
pub async fn record(
    conn: &mut SqliteConnection,
    user_id: i64,
    lesson_id: i64,
    is_completed: Option<bool>,
    time_delta: Option<i64>,
    now: DateTime<Utc>,
) -> Result<ProgressUpdate, AppError> {
    let course_id = sqlx::query_scalar::<_, i64>("SELECT course_id FROM lessons WHERE id = ?")
        .bind(lesson_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::NotFound("Lesson not found".to_string()))?;

    let delta = time_delta.unwrap_or(0);
    if delta < 0 {
        return Err(AppError::BadRequest(
            "timeSpent must not be negative".to_string(),
        ));
    }

    let existing = sqlx::query_as::<_, (bool, Option<DateTime<Utc>>)>(
        "SELECT is_completed, completed_at FROM lesson_progress WHERE user_id = ? AND lesson_id = ?",
    )
    .bind(user_id)
    .bind(lesson_id)
    .fetch_optional(&mut *conn)
    .await?;

    let (done, done_at) = next_completion(existing, is_completed, now);

    let lesson = sqlx::query_as::<_, LessonProgress>(
        r#"
        INSERT INTO lesson_progress (user_id, lesson_id, is_completed, completed_at, time_spent)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(user_id, lesson_id) DO UPDATE SET
            is_completed = excluded.is_completed,
            completed_at = excluded.completed_at,
            time_spent = lesson_progress.time_spent + excluded.time_spent
        RETURNING id, user_id, lesson_id, is_completed, completed_at, time_spent
        "#,
    )
    .bind(user_id)
    .bind(lesson_id)
    .bind(done)
    .bind(done_at)
    .bind(delta)
    .fetch_one(&mut *conn)
    .await?;

    let (course_progress, status) =
        recompute_enrollment(conn, user_id, course_id, delta, now).await?;

    Ok(ProgressUpdate {
        lesson,
        course_id,
        course_progress,
        status,
    })
}

/// Recounts completed lessons for the course and writes the result into the
/// user's enrollment, if there is one. `time_delta` minutes are added to it.
pub async fn recompute_enrollment(
    conn: &mut SqliteConnection,
    user_id: i64,
    course_id: i64,
    time_delta: i64,
    now: DateTime<Utc>,
) -> Result<(f64, EnrollmentStatus), AppError> {
    let (total, completed) = sqlx::query_as::<_, (i64, i64)>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM lessons WHERE course_id = ?1),
            (SELECT COUNT(*)
               FROM lesson_progress lp
               JOIN lessons l ON l.id = lp.lesson_id
              WHERE l.course_id = ?1 AND lp.user_id = ?2 AND lp.is_completed = 1)
        "#,
    )
    .bind(course_id)
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;

    let percentage = course_percentage(completed, total);
    let status = enrollment_status(completed, total);

    let result = sqlx::query(
        r#"
        UPDATE enrollments
        SET progress = ?,
            status = ?,
            completed_at = CASE WHEN ? = 'COMPLETED' THEN COALESCE(completed_at, ?) ELSE NULL END,
            time_spent = time_spent + ?
        WHERE user_id = ? AND course_id = ?
        "#,
    )
    .bind(percentage)
    .bind(status)
    .bind(status)
    .bind(now)
    .bind(time_delta)
    .bind(user_id)
    .bind(course_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        tracing::debug!(user_id, course_id, "progress recorded without an enrollment");
    }

    Ok((percentage, status))
}
