// src/models/lesson.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use url::Url;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LessonType {
    Video,
    Document,
    Image,
    Quiz,
}

/// Represents the 'lessons' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: i64,
    pub course_id: i64,
    pub title: String,
    pub lesson_type: LessonType,

    /// Sanitized rich text.
    pub content: Option<String>,

    /// Video, document or image location.
    pub media_url: Option<String>,

    /// Ordering inside the course, ascending.
    pub position: i64,
    pub duration_minutes: i64,
    pub created_at: DateTime<Utc>,
}

/// DTO for creating a lesson inside a course.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateLessonRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub lesson_type: LessonType,
    #[validate(length(max = 50000))]
    pub content: Option<String>,
    #[validate(length(max = 1000), custom(function = validate_url_string))]
    pub media_url: Option<String>,
    pub position: Option<i64>,
    #[validate(range(min = 0, max = 10000))]
    pub duration_minutes: Option<i64>,
}

/// DTO for updating a lesson. The type of a lesson is fixed at creation.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLessonRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(max = 50000))]
    pub content: Option<String>,
    #[validate(length(max = 1000), custom(function = validate_url_string))]
    pub media_url: Option<String>,
    pub position: Option<i64>,
    #[validate(range(min = 0, max = 10000))]
    pub duration_minutes: Option<i64>,
}

/// Validates that a string is a correctly formatted URL.
fn validate_url_string(url: &str) -> Result<(), validator::ValidationError> {
    if Url::parse(url).is_err() {
        return Err(validator::ValidationError::new("invalid_url"));
    }
    Ok(())
}
