// src/handlers/lesson.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use validator::Validate;

use crate::{
    db,
    error::AppError,
    models::lesson::{CreateLessonRequest, Lesson, LessonType, UpdateLessonRequest},
    services::{course_lock, enrollment, quiz},
    utils::{html::clean_optional, jwt::Claims},
};

async fn fetch_lesson(conn: &mut SqliteConnection, id: i64) -> Result<Lesson, AppError> {
    sqlx::query_as::<_, Lesson>("SELECT * FROM lessons WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::NotFound("Lesson not found".to_string()))
}

/// Retrieves a lesson for an enrolled learner or the course staff.
pub async fn get_lesson(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let mut conn = pool.acquire().await?;

    let lesson = fetch_lesson(&mut conn, id).await?;
    enrollment::ensure_access(&mut conn, user_id, claims.role, lesson.course_id).await?;

    Ok(Json(lesson))
}

/// Appends a lesson to a course. QUIZ lessons get their quiz right away.
pub async fn create_lesson(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<i64>,
    Json(payload): Json<CreateLessonRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let user_id = claims.user_id()?;
    let now = Utc::now();

    let mut tx = db::begin_write(&pool).await?;
    course_lock::ensure_editable(&mut tx, course_id, user_id, claims.role, now).await?;

    let position = match payload.position {
        Some(position) => position,
        None => {
            sqlx::query_scalar::<_, i64>(
                "SELECT COALESCE(MAX(position), -1) + 1 FROM lessons WHERE course_id = ?",
            )
            .bind(course_id)
            .fetch_one(&mut *tx)
            .await?
        }
    };

    let lesson = sqlx::query_as::<_, Lesson>(
        r#"
        INSERT INTO lessons
            (course_id, title, lesson_type, content, media_url, position, duration_minutes, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(course_id)
    .bind(payload.title.trim())
    .bind(payload.lesson_type)
    .bind(clean_optional(payload.content.as_deref()))
    .bind(payload.media_url)
    .bind(position)
    .bind(payload.duration_minutes.unwrap_or(0))
    .bind(now)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create lesson: {:?}", e);
        AppError::from(e)
    })?;

    if lesson.lesson_type == LessonType::Quiz {
        quiz::ensure_quiz(&mut tx, lesson.id).await?;
    }

    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(lesson)))
}

/// Updates a lesson. Guarded by the parent course's edit lock.
pub async fn update_lesson(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateLessonRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let user_id = claims.user_id()?;

    let mut tx = db::begin_write(&pool).await?;
    let lesson = fetch_lesson(&mut tx, id).await?;
    course_lock::ensure_editable(&mut tx, lesson.course_id, user_id, claims.role, Utc::now())
        .await?;

    if payload.title.is_none()
        && payload.content.is_none()
        && payload.media_url.is_none()
        && payload.position.is_none()
        && payload.duration_minutes.is_none()
    {
        return Ok(Json(lesson));
    }

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE lessons SET ");
    let mut separated = builder.separated(", ");

    if let Some(title) = payload.title {
        separated.push("title = ");
        separated.push_bind_unseparated(title.trim().to_string());
    }

    if let Some(content) = payload.content {
        separated.push("content = ");
        separated.push_bind_unseparated(clean_optional(Some(&content)));
    }

    if let Some(media_url) = payload.media_url {
        separated.push("media_url = ");
        separated.push_bind_unseparated(media_url);
    }

    if let Some(position) = payload.position {
        separated.push("position = ");
        separated.push_bind_unseparated(position);
    }

    if let Some(duration) = payload.duration_minutes {
        separated.push("duration_minutes = ");
        separated.push_bind_unseparated(duration);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.push(" RETURNING *");

    let updated = builder
        .build_query_as::<Lesson>()
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!("Failed to update lesson: {:?}", e);
            AppError::from(e)
        })?;

    tx.commit().await?;

    Ok(Json(updated))
}

/// Deletes a lesson. Enrollment progress catches up on the next progress event.
pub async fn delete_lesson(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let mut tx = db::begin_write(&pool).await?;
    let lesson = fetch_lesson(&mut tx, id).await?;
    course_lock::ensure_editable(&mut tx, lesson.course_id, user_id, claims.role, Utc::now())
        .await?;

    sqlx::query("DELETE FROM lessons WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}
