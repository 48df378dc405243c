// src/services/course_lock.rs

//! Advisory, lease-based edit lock on courses.
//!
//! A course is locked while `editing_user_id` is set and `editing_expires_at`
//! is in the future. Expired leases are never swept; they simply stop
//! counting the next time someone looks.

use chrono::{DateTime, Duration, Utc};
use sqlx::SqliteConnection;

use crate::{
    config::COURSE_LOCK_LEASE_SECS,
    error::{AppError, LockHolder},
    models::{course::Course, user::Role},
};

/// Acquire attempts before giving up on a contended compare-and-set.
const MAX_CAS_RETRIES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockDecision {
    /// Unlocked, expired, or already held by the caller.
    Free,
    /// Actively held by another user.
    HeldBy(i64),
}

/// Pure lock check for `user_id` at `now`.
pub fn decide(
    editing_user_id: Option<i64>,
    editing_expires_at: Option<DateTime<Utc>>,
    user_id: i64,
    now: DateTime<Utc>,
) -> LockDecision {
    match (editing_user_id, editing_expires_at) {
        (Some(holder), Some(expires_at)) if holder != user_id && expires_at > now => {
            LockDecision::HeldBy(holder)
        }
        _ => LockDecision::Free,
    }
}

pub fn lease_expiry(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::seconds(COURSE_LOCK_LEASE_SECS)
}

#[derive(sqlx::FromRow)]
struct LockState {
    editing_user_id: Option<i64>,
    editing_expires_at: Option<DateTime<Utc>>,
}

async fn fetch_lock_state(
    conn: &mut SqliteConnection,
    course_id: i64,
) -> Result<LockState, AppError> {
    sqlx::query_as::<_, LockState>(
        "SELECT editing_user_id, editing_expires_at FROM courses WHERE id = ?",
    )
    .bind(course_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::NotFound("Course not found".to_string()))
}

/// Builds the 423 error, naming the holder.
async fn locked_error(conn: &mut SqliteConnection, holder_id: i64) -> AppError {
    let holder = sqlx::query_as::<_, (i64, String, String)>(
        "SELECT id, name, email FROM users WHERE id = ?",
    )
    .bind(holder_id)
    .fetch_optional(&mut *conn)
    .await;

    let locked_by = match holder {
        Ok(Some((id, name, email))) => LockHolder { id, name, email },
        Ok(None) => LockHolder {
            id: holder_id,
            name: "Unknown user".to_string(),
            email: String::new(),
        },
        Err(e) => return AppError::from(e),
    };

    AppError::Locked {
        message: format!("Course is currently being edited by {}", locked_by.name),
        locked_by,
    }
}

/// Loads a course and checks that `user_id` may author it: admins always,
/// instructors only for their own courses.
pub async fn load_authorable(
    conn: &mut SqliteConnection,
    course_id: i64,
    user_id: i64,
    role: Role,
) -> Result<Course, AppError> {
    let course = sqlx::query_as::<_, Course>("SELECT * FROM courses WHERE id = ?")
        .bind(course_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::NotFound("Course not found".to_string()))?;

    if role != Role::Admin && course.instructor_id != user_id {
        return Err(AppError::Forbidden(
            "You are not allowed to edit this course".to_string(),
        ));
    }

    Ok(course)
}

/// Write-path guard. Fails before any persistence when another user holds
/// an active lease. Does not take the lock itself.
pub async fn ensure_editable(
    conn: &mut SqliteConnection,
    course_id: i64,
    user_id: i64,
    role: Role,
    now: DateTime<Utc>,
) -> Result<Course, AppError> {
    let course = load_authorable(conn, course_id, user_id, role).await?;

    if let LockDecision::HeldBy(holder) =
        decide(course.editing_user_id, course.editing_expires_at, user_id, now)
    {
        return Err(locked_error(conn, holder).await);
    }

    Ok(course)
}

/// Takes or refreshes the lease for `user_id`. Returns the new expiry.
///
/// The update is a compare-and-set against the state that was read, so two
/// editors racing for a free course cannot both win.
pub async fn acquire(
    conn: &mut SqliteConnection,
    course_id: i64,
    user_id: i64,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, AppError> {
    for _ in 0..MAX_CAS_RETRIES {
        let state = fetch_lock_state(conn, course_id).await?;

        if let LockDecision::HeldBy(holder) =
            decide(state.editing_user_id, state.editing_expires_at, user_id, now)
        {
            return Err(locked_error(conn, holder).await);
        }

        let expires_at = lease_expiry(now);
        let result = sqlx::query(
            r#"
            UPDATE courses
            SET editing_user_id = ?, editing_expires_at = ?
            WHERE id = ? AND editing_user_id IS ? AND editing_expires_at IS ?
            "#,
        )
        .bind(user_id)
        .bind(expires_at)
        .bind(course_id)
        .bind(state.editing_user_id)
        .bind(state.editing_expires_at)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 1 {
            tracing::debug!(course_id, user_id, %expires_at, "course lock granted");
            return Ok(expires_at);
        }

        tracing::debug!(course_id, user_id, "course lock changed underneath, retrying");
    }

    Err(AppError::Conflict(
        "Course lock is contended, please retry".to_string(),
    ))
}

/// Drops the lease if `user_id` holds it. Anything else is a silent no-op.
pub async fn release(
    conn: &mut SqliteConnection,
    course_id: i64,
    user_id: i64,
) -> Result<bool, AppError> {
    let result = sqlx::query(
        r#"
        UPDATE courses
        SET editing_user_id = NULL, editing_expires_at = NULL
        WHERE id = ? AND editing_user_id = ?
        "#,
    )
    .bind(course_id)
    .bind(user_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}
