// src/models/quiz.rs

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'quizzes' table. One quiz per QUIZ lesson.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub id: i64,
    pub lesson_id: i64,
    pub first_attempt_points: i64,
    pub second_attempt_points: i64,
    pub third_attempt_points: i64,
    pub fourth_plus_points: i64,
}

impl Quiz {
    /// Maximum points available on the given (1-based) attempt.
    pub fn tier_points(&self, attempt_number: i64) -> i64 {
        match attempt_number {
            i64::MIN..=1 => self.first_attempt_points,
            2 => self.second_attempt_points,
            3 => self.third_attempt_points,
            _ => self.fourth_plus_points,
        }
    }

    /// Tiers are expected to be non-increasing.
    pub fn tiers_are_ordered(&self) -> bool {
        self.first_attempt_points >= self.second_attempt_points
            && self.second_attempt_points >= self.third_attempt_points
            && self.third_attempt_points >= self.fourth_plus_points
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: i64,
    pub quiz_id: i64,
    pub text: String,
    pub position: i64,
}

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizOption {
    pub id: i64,
    pub question_id: i64,
    pub text: String,
    pub is_correct: bool,
}

/// Option as delivered to a client. `is_correct` is only filled in for staff.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionView {
    pub id: i64,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    pub id: i64,
    pub text: String,
    pub position: i64,
    pub options: Vec<OptionView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizView {
    #[serde(flatten)]
    pub quiz: Quiz,
    pub questions: Vec<QuestionView>,
}

/// DTO for changing a quiz's tier points.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateQuizRequest {
    #[validate(range(min = 0, max = 1000))]
    pub first_attempt_points: Option<i64>,
    #[validate(range(min = 0, max = 1000))]
    pub second_attempt_points: Option<i64>,
    #[validate(range(min = 0, max = 1000))]
    pub third_attempt_points: Option<i64>,
    #[validate(range(min = 0, max = 1000))]
    pub fourth_plus_points: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOptionRequest {
    #[validate(length(min = 1, max = 500))]
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

/// DTO for adding a question to a quiz.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, max = 1000))]
    pub text: String,
    pub position: Option<i64>,
    #[validate(nested, custom(function = validate_options))]
    pub options: Vec<CreateOptionRequest>,
}

/// At least two options and exactly one correct answer.
fn validate_options(options: &[CreateOptionRequest]) -> Result<(), validator::ValidationError> {
    if options.len() < 2 {
        return Err(validator::ValidationError::new("at_least_two_options"));
    }
    if options.iter().filter(|o| o.is_correct).count() != 1 {
        return Err(validator::ValidationError::new("exactly_one_correct_option"));
    }
    Ok(())
}

/// DTO for submitting a quiz attempt.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAttemptRequest {
    /// Must match the authenticated user unless the caller is an admin.
    pub user_id: Option<i64>,

    /// Key: Question ID, Value: chosen Option ID.
    pub answers: HashMap<i64, i64>,
}

/// Represents the 'quiz_attempts' table. Append-only.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizAttempt {
    pub id: i64,
    pub user_id: i64,
    pub quiz_id: i64,
    pub attempt_number: i64,
    pub score: i64,
    pub points_earned: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptResult {
    pub attempt_number: i64,
    pub score: i64,
    pub points_earned: i64,
    pub correct_count: usize,
    pub total_questions: usize,
    pub new_total_points: i64,
    pub badge_level: crate::models::user::BadgeLevel,
}
