// src/services/rewards.rs

//! Quiz grading, attempt-tier points, the capped points total, badge tiers
//! and the points ledger.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::{
    db,
    error::{AppError, is_unique_violation},
    models::{
        quiz::{AttemptResult, Quiz},
        user::{BadgeLevel, capped_total},
    },
    services::progress,
};

/// Result of comparing submitted answers with the answer key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grade {
    pub correct_count: usize,
    pub total_questions: usize,
    /// Whole percent, 0..=100.
    pub score: i64,
}

/// Grades `answers` (question id -> chosen option id) against `key`
/// (question id -> ids of correct options). Returns `None` for an empty quiz.
///
/// Answers to questions outside the key are ignored; unanswered questions
/// count as wrong.
pub fn grade(key: &BTreeMap<i64, Vec<i64>>, answers: &HashMap<i64, i64>) -> Option<Grade> {
    let total_questions = key.len();
    if total_questions == 0 {
        return None;
    }

    let correct_count = key
        .iter()
        .filter(|(question_id, correct)| {
            answers
                .get(question_id)
                .is_some_and(|chosen| correct.contains(chosen))
        })
        .count();

    let score = (100.0 * correct_count as f64 / total_questions as f64).round() as i64;

    Some(Grade {
        correct_count,
        total_questions,
        score,
    })
}

/// Tier points scaled by score. A 0% attempt earns nothing on any tier.
pub fn points_for(tier_points: i64, score: i64) -> i64 {
    (tier_points as f64 * score as f64 / 100.0).round() as i64
}

#[derive(sqlx::FromRow)]
struct QuizContext {
    #[sqlx(flatten)]
    quiz: Quiz,
    course_id: i64,
    lesson_title: String,
}

#[derive(sqlx::FromRow)]
struct AnswerKeyRow {
    question_id: i64,
    option_id: Option<i64>,
}

/// Grades and records one attempt.
///
/// The attempt row, the points update, the ledger entry and the lesson
/// completion are written in one transaction: either all of them persist or
/// none do.
pub async fn submit_attempt(
    pool: &SqlitePool,
    quiz_id: i64,
    user_id: i64,
    answers: &HashMap<i64, i64>,
    now: DateTime<Utc>,
) -> Result<AttemptResult, AppError> {
    let mut tx = db::begin_write(pool).await?;

    let ctx = sqlx::query_as::<_, QuizContext>(
        r#"
        SELECT q.id, q.lesson_id, q.first_attempt_points, q.second_attempt_points,
               q.third_attempt_points, q.fourth_plus_points,
               l.course_id, l.title AS lesson_title
        FROM quizzes q
        JOIN lessons l ON l.id = q.lesson_id
        WHERE q.id = ?
        "#,
    )
    .bind(quiz_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("Quiz not found".to_string()))?;

    let rows = sqlx::query_as::<_, AnswerKeyRow>(
        r#"
        SELECT q.id AS question_id, o.id AS option_id
        FROM questions q
        LEFT JOIN options o ON o.question_id = q.id AND o.is_correct = 1
        WHERE q.quiz_id = ?
        "#,
    )
    .bind(quiz_id)
    .fetch_all(&mut *tx)
    .await?;

    let mut key: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
    for row in rows {
        let entry = key.entry(row.question_id).or_default();
        if let Some(option_id) = row.option_id {
            entry.push(option_id);
        }
    }

    let grade = grade(&key, answers)
        .ok_or(AppError::BadRequest("Quiz has no questions".to_string()))?;

    let previous = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM quiz_attempts WHERE user_id = ? AND quiz_id = ?",
    )
    .bind(user_id)
    .bind(quiz_id)
    .fetch_one(&mut *tx)
    .await?;

    let attempt_number = previous + 1;
    let points_earned = points_for(ctx.quiz.tier_points(attempt_number), grade.score);

    let attempt_id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO quiz_attempts (user_id, quiz_id, attempt_number, score, points_earned, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(quiz_id)
    .bind(attempt_number)
    .bind(grade.score)
    .bind(points_earned)
    .bind(now)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("Another attempt was submitted at the same time, please retry".to_string())
        } else {
            AppError::from(e)
        }
    })?;

    let (current_total, current_badge) = sqlx::query_as::<_, (i64, BadgeLevel)>(
        "SELECT total_points, badge_level FROM users WHERE id = ?",
    )
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("User not found".to_string()))?;

    let new_total = capped_total(current_total, points_earned);
    let applied = new_total - current_total;
    let new_badge = BadgeLevel::from_points(new_total);

    if new_badge != current_badge {
        sqlx::query("UPDATE users SET total_points = ?, badge_level = ? WHERE id = ?")
            .bind(new_total)
            .bind(new_badge)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        tracing::info!(user_id, ?current_badge, ?new_badge, "badge level changed");
    } else {
        sqlx::query("UPDATE users SET total_points = ? WHERE id = ?")
            .bind(new_total)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
    }

    // The ledger carries what was actually applied after the cap.
    let reason = format!(
        "Quiz \"{}\" attempt #{}: {}% correct",
        ctx.lesson_title, attempt_number, grade.score
    );
    sqlx::query(
        r#"
        INSERT INTO points_ledger (user_id, quiz_attempt_id, points, reason, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(attempt_id)
    .bind(applied)
    .bind(&reason)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    progress::record(&mut tx, user_id, ctx.quiz.lesson_id, Some(true), None, now).await?;

    tx.commit().await?;

    tracing::info!(
        user_id,
        quiz_id,
        course_id = ctx.course_id,
        attempt_number,
        score = grade.score,
        points_earned,
        applied,
        "quiz attempt recorded"
    );

    Ok(AttemptResult {
        attempt_number,
        score: grade.score,
        points_earned,
        correct_count: grade.correct_count,
        total_questions: grade.total_questions,
        new_total_points: new_total,
        badge_level: new_badge,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> BTreeMap<i64, Vec<i64>> {
        BTreeMap::from([(1, vec![10]), (2, vec![20]), (3, vec![30])])
    }

    #[test]
    fn grade_perfect() {
        let answers = HashMap::from([(1, 10), (2, 20), (3, 30)]);
        let g = grade(&key(), &answers).unwrap();
        assert_eq!(g.correct_count, 3);
        assert_eq!(g.total_questions, 3);
        assert_eq!(g.score, 100);
    }

    #[test]
    fn grade_partial_rounds() {
        let answers = HashMap::from([(1, 10), (2, 21)]);
        let g = grade(&key(), &answers).unwrap();
        assert_eq!(g.correct_count, 1);
        assert_eq!(g.score, 33);

        let answers = HashMap::from([(1, 10), (2, 20)]);
        assert_eq!(grade(&key(), &answers).unwrap().score, 67);
    }

    #[test]
    fn grade_ignores_foreign_questions() {
        let answers = HashMap::from([(99, 10), (1, 10)]);
        let g = grade(&key(), &answers).unwrap();
        assert_eq!(g.correct_count, 1);
    }

    #[test]
    fn question_without_correct_option_never_matches() {
        let key = BTreeMap::from([(1, vec![]), (2, vec![20])]);
        let answers = HashMap::from([(1, 10), (2, 20)]);
        assert_eq!(grade(&key, &answers).unwrap().score, 50);
    }

    #[test]
    fn empty_quiz_has_no_grade() {
        assert_eq!(grade(&BTreeMap::new(), &HashMap::new()), None);
    }

    #[test]
    fn points_scale_with_score() {
        assert_eq!(points_for(100, 100), 100);
        assert_eq!(points_for(75, 100), 75);
        assert_eq!(points_for(100, 0), 0);
        assert_eq!(points_for(25, 50), 13);
        assert_eq!(points_for(75, 33), 25);
    }
}
