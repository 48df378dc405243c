// src/models/user.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::config::MAX_TOTAL_POINTS;

/// Account role. Stored as upper-case text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Instructor,
    Learner,
}

impl Role {
    /// Admins and instructors may author courses.
    pub fn is_staff(self) -> bool {
        matches!(self, Role::Admin | Role::Instructor)
    }
}

/// Gamification tier, ordered from lowest to highest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BadgeLevel {
    Newbie,
    Explorer,
    Achiever,
    Specialist,
    Expert,
    Master,
}

impl BadgeLevel {
    /// Lower bound (inclusive) of each tier.
    const THRESHOLDS: [(i64, BadgeLevel); 6] = [
        (120, BadgeLevel::Master),
        (100, BadgeLevel::Expert),
        (80, BadgeLevel::Specialist),
        (60, BadgeLevel::Achiever),
        (40, BadgeLevel::Explorer),
        (0, BadgeLevel::Newbie),
    ];

    pub fn from_points(points: i64) -> Self {
        Self::THRESHOLDS
            .iter()
            .find(|(min, _)| points >= *min)
            .map(|(_, level)| *level)
            .unwrap_or(BadgeLevel::Newbie)
    }
}

/// Adds `earned` to `current`, clamped to the global ceiling.
pub fn capped_total(current: i64, earned: i64) -> i64 {
    (current + earned).min(MAX_TOTAL_POINTS)
}

/// Represents the 'users' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,

    /// Unique login email.
    pub email: String,

    /// Display name, shown to other editors when a course is locked.
    pub name: String,

    /// Argon2 password hash.
    /// Skipped during serialization to prevent leaking sensitive data.
    #[serde(skip)]
    pub password: String,

    pub role: Role,

    /// Running counter, kept alongside the points ledger.
    pub total_points: i64,

    pub badge_level: BadgeLevel,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// DTO for creating a new user (Registration).
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(email(message = "A valid email address is required."))]
    pub email: String,
    #[validate(length(
        min = 1,
        max = 100,
        message = "Name length must be between 1 and 100 characters."
    ))]
    pub name: String,
    #[validate(length(
        min = 8,
        max = 128,
        message = "Password length must be between 8 and 128 characters."
    ))]
    pub password: String,
}

/// DTO for user login.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 254))]
    pub email: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

/// Row used by the leaderboard.
#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub id: i64,
    pub name: String,
    pub total_points: i64,
    pub badge_level: BadgeLevel,
}
