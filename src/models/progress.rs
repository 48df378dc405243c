// src/models/progress.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'lesson_progress' table. Unique per (user, lesson).
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonProgress {
    pub id: i64,
    pub user_id: i64,
    pub lesson_id: i64,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,

    /// Minutes, accumulated across calls.
    pub time_spent: i64,
}

/// DTO for `PUT /progress`.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RecordProgressRequest {
    /// Must match the authenticated user unless the caller is an admin.
    pub user_id: Option<i64>,
    pub lesson_id: i64,
    pub is_completed: Option<bool>,
    /// Minutes to add. Never negative.
    #[validate(range(min = 0, max = 1440))]
    pub time_spent: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressResponse {
    pub progress: LessonProgress,
    pub course_progress: f64,
}
