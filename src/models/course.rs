// src/models/course.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::models::lesson::Lesson;

/// How learners get into a course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessRule {
    Open,
    Payment,
    Invitation,
}

impl AccessRule {
    /// The rule implied by a price: paid courses are PAYMENT, free ones OPEN.
    pub fn from_price(price: f64) -> Self {
        if price > 0.0 {
            AccessRule::Payment
        } else {
            AccessRule::Open
        }
    }
}

/// Decides the access rule after a write.
///
/// A supplied price always wins over a supplied rule. Without a price the
/// requested rule must agree with the stored price.
pub fn resolve_access_rule(
    new_price: Option<f64>,
    requested: Option<AccessRule>,
    current_price: f64,
    current_rule: AccessRule,
) -> Result<AccessRule, &'static str> {
    if let Some(price) = new_price {
        return Ok(AccessRule::from_price(price));
    }

    match requested {
        None => Ok(current_rule),
        Some(AccessRule::Payment) if current_price <= 0.0 => {
            Err("A PAYMENT course requires a positive price")
        }
        Some(rule) if rule != AccessRule::Payment && current_price > 0.0 => {
            Err("A priced course must use the PAYMENT access rule")
        }
        Some(rule) => Ok(rule),
    }
}

/// Represents the 'courses' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: i64,
    pub instructor_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub price: f64,
    pub access_rule: AccessRule,
    pub is_published: bool,

    /// Current edit-lock holder. Only meaningful while `editing_expires_at` is in the future.
    pub editing_user_id: Option<i64>,
    pub editing_expires_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Course with its ordered curriculum.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseDetail {
    #[serde(flatten)]
    pub course: Course,
    pub lessons: Vec<Lesson>,
}

/// DTO for creating a course.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCourseRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 20000))]
    pub description: Option<String>,
    #[validate(range(min = 0.0, max = 100000.0))]
    pub price: Option<f64>,
    pub access_rule: Option<AccessRule>,
    pub is_published: Option<bool>,
}

/// DTO for updating a course. Fields are optional.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCourseRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(max = 20000))]
    pub description: Option<String>,
    #[validate(range(min = 0.0, max = 100000.0))]
    pub price: Option<f64>,
    pub access_rule: Option<AccessRule>,
    pub is_published: Option<bool>,
}

/// DTO for enrolling a learner by email into a course.
#[derive(Debug, Deserialize, Validate)]
pub struct AddAttendeeRequest {
    #[validate(email)]
    pub email: String,
}
