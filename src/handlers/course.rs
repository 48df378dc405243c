// src/handlers/course.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use validator::Validate;

use crate::{
    db,
    error::AppError,
    models::{
        course::{
            AccessRule, AddAttendeeRequest, Course, CourseDetail, CreateCourseRequest,
            UpdateCourseRequest, resolve_access_rule,
        },
        lesson::Lesson,
        user::Role,
    },
    services::{
        course_lock,
        enrollment::{self, EnrollOutcome},
    },
    utils::{html::clean_optional, jwt::Claims},
};

/// Lists courses visible to the caller: every published course, plus the
/// caller's own drafts (all drafts for admins).
pub async fn list_courses(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let courses = sqlx::query_as::<_, Course>(
        r#"
        SELECT * FROM courses
        WHERE is_published = 1 OR instructor_id = ? OR ? = 'ADMIN'
        ORDER BY created_at DESC
        "#,
    )
    .bind(user_id)
    .bind(claims.role)
    .fetch_all(&pool)
    .await?;

    Ok(Json(courses))
}

/// Retrieves a course with its ordered lessons.
/// Drafts are only visible to their authors and admins.
pub async fn get_course(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let course = sqlx::query_as::<_, Course>("SELECT * FROM courses WHERE id = ?")
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .filter(|c| c.is_published || c.instructor_id == user_id || claims.role == Role::Admin)
        .ok_or(AppError::NotFound("Course not found".to_string()))?;

    let lessons = sqlx::query_as::<_, Lesson>(
        "SELECT * FROM lessons WHERE course_id = ? ORDER BY position, id",
    )
    .bind(id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(CourseDetail { course, lessons }))
}

/// Creates a course owned by the caller.
/// Staff only.
pub async fn create_course(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateCourseRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let user_id = claims.user_id()?;

    let price = payload.price.unwrap_or(0.0);
    let access_rule = resolve_access_rule(
        payload.price,
        payload.access_rule,
        price,
        AccessRule::from_price(price),
    )
    .map_err(|msg| AppError::BadRequest(msg.to_string()))?;

    let now = Utc::now();
    let course = sqlx::query_as::<_, Course>(
        r#"
        INSERT INTO courses
            (instructor_id, title, description, price, access_rule, is_published, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(payload.title.trim())
    .bind(clean_optional(payload.description.as_deref()))
    .bind(price)
    .bind(access_rule)
    .bind(payload.is_published.unwrap_or(false))
    .bind(now)
    .bind(now)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create course: {:?}", e);
        AppError::from(e)
    })?;

    Ok((StatusCode::CREATED, Json(course)))
}

/// Updates a course. Owner or admin; rejected while someone else holds the edit lock.
///
/// A supplied price always re-derives the access rule.
pub async fn update_course(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateCourseRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let user_id = claims.user_id()?;
    let now = Utc::now();

    let mut tx = db::begin_write(&pool).await?;
    let current = course_lock::ensure_editable(&mut tx, id, user_id, claims.role, now).await?;

    let access_rule = resolve_access_rule(
        payload.price,
        payload.access_rule,
        current.price,
        current.access_rule,
    )
    .map_err(|msg| AppError::BadRequest(msg.to_string()))?;

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE courses SET ");
    let mut separated = builder.separated(", ");

    if let Some(title) = payload.title {
        separated.push("title = ");
        separated.push_bind_unseparated(title.trim().to_string());
    }

    if let Some(description) = payload.description {
        separated.push("description = ");
        separated.push_bind_unseparated(clean_optional(Some(&description)));
    }

    if let Some(price) = payload.price {
        separated.push("price = ");
        separated.push_bind_unseparated(price);
    }

    if let Some(is_published) = payload.is_published {
        separated.push("is_published = ");
        separated.push_bind_unseparated(is_published);
    }

    separated.push("access_rule = ");
    separated.push_bind_unseparated(access_rule);
    separated.push("updated_at = ");
    separated.push_bind_unseparated(now);

    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.push(" RETURNING *");

    let course = builder
        .build_query_as::<Course>()
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!("Failed to update course: {:?}", e);
            AppError::from(e)
        })?;

    tx.commit().await?;

    Ok(Json(course))
}

/// Deletes a course and, by cascade, its curriculum, enrollments and payments.
pub async fn delete_course(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let mut tx = db::begin_write(&pool).await?;
    course_lock::ensure_editable(&mut tx, id, user_id, claims.role, Utc::now()).await?;

    sqlx::query("DELETE FROM courses WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete course: {:?}", e);
            AppError::from(e)
        })?;

    tx.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Acquires or refreshes the edit lock. 423 names the current holder.
pub async fn acquire_lock(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let mut conn = pool.acquire().await?;

    course_lock::load_authorable(&mut conn, id, user_id, claims.role).await?;
    let expires_at = course_lock::acquire(&mut conn, id, user_id, Utc::now()).await?;

    Ok(Json(json!({ "expiresAt": expires_at })))
}

/// Releases the edit lock if the caller holds it. Always 200.
pub async fn release_lock(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let mut conn = pool.acquire().await?;

    let released = course_lock::release(&mut conn, id, user_id).await?;

    Ok(Json(json!({ "released": released })))
}

/// Enrolls a learner (looked up by email) directly. This is how people get
/// into INVITATION courses.
pub async fn add_attendee(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<AddAttendeeRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let user_id = claims.user_id()?;
    let mut conn = pool.acquire().await?;

    course_lock::load_authorable(&mut conn, id, user_id, claims.role).await?;

    let attendee_id = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE email = ?")
        .bind(payload.email.trim().to_lowercase())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    let status = match enrollment::enroll(&mut conn, attendee_id, id, Utc::now()).await? {
        EnrollOutcome::Created => StatusCode::CREATED,
        EnrollOutcome::AlreadyEnrolled => StatusCode::OK,
    };

    Ok((status, Json(json!({ "userId": attendee_id, "courseId": id }))))
}

/// Self-enrollment. Only OPEN courses admit learners directly.
pub async fn enroll(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let mut conn = pool.acquire().await?;

    let access_rule = sqlx::query_scalar::<_, AccessRule>(
        "SELECT access_rule FROM courses WHERE id = ? AND is_published = 1",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::NotFound("Course not found".to_string()))?;

    match access_rule {
        AccessRule::Open => {}
        AccessRule::Payment => {
            return Err(AppError::PaymentFailed(
                "This course requires payment; start a checkout first".to_string(),
            ));
        }
        AccessRule::Invitation => {
            return Err(AppError::Forbidden(
                "This course is invitation only".to_string(),
            ));
        }
    }

    let status = match enrollment::enroll(&mut conn, user_id, id, Utc::now()).await? {
        EnrollOutcome::Created => StatusCode::CREATED,
        EnrollOutcome::AlreadyEnrolled => StatusCode::OK,
    };

    Ok((status, Json(json!({ "courseId": id, "enrolled": true }))))
}
