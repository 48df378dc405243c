// src/handlers/dashboard.rs

use axum::{Extension, Json, extract::State, response::IntoResponse};
use serde::Serialize;
use serde_json::json;
use sqlx::{FromRow, SqlitePool};

use crate::{
    error::AppError,
    models::{
        enrollment::EnrollmentSummary,
        points::PointsLedgerEntry,
        user::{LeaderboardEntry, Role, User},
    },
    utils::jwt::Claims,
};

/// Per-course figures for an instructor's dashboard.
#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct InstructorCourseStats {
    pub course_id: i64,
    pub title: String,
    pub is_published: bool,
    pub enrollments: i64,
    pub completed: i64,
    pub average_progress: f64,
}

/// Role-based summary for the caller.
pub async fn get_dashboard(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    let body = match user.role {
        Role::Learner => {
            let enrollments = sqlx::query_as::<_, EnrollmentSummary>(
                r#"
                SELECT e.course_id, c.title AS course_title, e.status, e.progress,
                       e.started_at, e.completed_at, e.time_spent
                FROM enrollments e
                JOIN courses c ON c.id = e.course_id
                WHERE e.user_id = ?
                ORDER BY e.started_at DESC
                "#,
            )
            .bind(user_id)
            .fetch_all(&pool)
            .await?;

            json!({
                "role": user.role,
                "user": user,
                "enrollments": enrollments,
            })
        }
        Role::Instructor => {
            let courses = instructor_stats(&pool, Some(user_id)).await?;
            json!({
                "role": user.role,
                "user": user,
                "courses": courses,
            })
        }
        Role::Admin => {
            let (users, courses, enrollments, completed_payments) =
                sqlx::query_as::<_, (i64, i64, i64, i64)>(
                    r#"
                    SELECT
                        (SELECT COUNT(*) FROM users),
                        (SELECT COUNT(*) FROM courses),
                        (SELECT COUNT(*) FROM enrollments),
                        (SELECT COUNT(*) FROM payments WHERE status = 'COMPLETED')
                    "#,
                )
                .fetch_one(&pool)
                .await?;

            json!({
                "role": user.role,
                "user": user,
                "totals": {
                    "users": users,
                    "courses": courses,
                    "enrollments": enrollments,
                    "completedPayments": completed_payments,
                },
                "courses": instructor_stats(&pool, None).await?,
            })
        }
    };

    Ok(Json(body))
}

async fn instructor_stats(
    pool: &SqlitePool,
    instructor_id: Option<i64>,
) -> Result<Vec<InstructorCourseStats>, AppError> {
    let stats = sqlx::query_as::<_, InstructorCourseStats>(
        r#"
        SELECT c.id AS course_id, c.title, c.is_published,
               COUNT(e.id) AS enrollments,
               COALESCE(SUM(CASE WHEN e.status = 'COMPLETED' THEN 1 ELSE 0 END), 0) AS completed,
               COALESCE(AVG(e.progress), 0.0) AS average_progress
        FROM courses c
        LEFT JOIN enrollments e ON e.course_id = c.id
        WHERE ?1 IS NULL OR c.instructor_id = ?1
        GROUP BY c.id
        ORDER BY c.created_at DESC
        "#,
    )
    .bind(instructor_id)
    .fetch_all(pool)
    .await?;

    Ok(stats)
}

/// The caller's points ledger, newest first.
pub async fn my_points(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let entries = sqlx::query_as::<_, PointsLedgerEntry>(
        "SELECT * FROM points_ledger WHERE user_id = ? ORDER BY created_at DESC, id DESC",
    )
    .bind(user_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(entries))
}

/// Top 10 users by points.
pub async fn get_leaderboard(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    let leaderboard = sqlx::query_as::<_, LeaderboardEntry>(
        r#"
        SELECT id, name, total_points, badge_level
        FROM users
        ORDER BY total_points DESC, id ASC
        LIMIT 10
        "#,
    )
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch leaderboard: {:?}", e);
        AppError::from(e)
    })?;

    Ok(Json(leaderboard))
}
