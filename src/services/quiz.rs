// src/services/quiz.rs

use sqlx::SqliteConnection;

use crate::{
    config::{
        DEFAULT_FIRST_ATTEMPT_POINTS, DEFAULT_FOURTH_PLUS_POINTS, DEFAULT_SECOND_ATTEMPT_POINTS,
        DEFAULT_THIRD_ATTEMPT_POINTS,
    },
    error::AppError,
    models::quiz::Quiz,
};

/// Returns the quiz of a QUIZ lesson, creating one with default tier points
/// if it is missing.
pub async fn ensure_quiz(conn: &mut SqliteConnection, lesson_id: i64) -> Result<Quiz, AppError> {
    let inserted = sqlx::query(
        r#"
        INSERT INTO quizzes
            (lesson_id, first_attempt_points, second_attempt_points, third_attempt_points, fourth_plus_points)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(lesson_id) DO NOTHING
        "#,
    )
    .bind(lesson_id)
    .bind(DEFAULT_FIRST_ATTEMPT_POINTS)
    .bind(DEFAULT_SECOND_ATTEMPT_POINTS)
    .bind(DEFAULT_THIRD_ATTEMPT_POINTS)
    .bind(DEFAULT_FOURTH_PLUS_POINTS)
    .execute(&mut *conn)
    .await?;

    if inserted.rows_affected() == 1 {
        tracing::info!(lesson_id, "created missing quiz for quiz lesson");
    }

    let quiz = sqlx::query_as::<_, Quiz>("SELECT * FROM quizzes WHERE lesson_id = ?")
        .bind(lesson_id)
        .fetch_one(&mut *conn)
        .await?;

    Ok(quiz)
}

/// Course that owns a quiz, via its lesson.
pub async fn course_of_quiz(conn: &mut SqliteConnection, quiz_id: i64) -> Result<i64, AppError> {
    sqlx::query_scalar::<_, i64>(
        "SELECT l.course_id FROM quizzes q JOIN lessons l ON l.id = q.lesson_id WHERE q.id = ?",
    )
    .bind(quiz_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::NotFound("Quiz not found".to_string()))
}

/// Course that owns a question, via its quiz and lesson.
pub async fn course_of_question(
    conn: &mut SqliteConnection,
    question_id: i64,
) -> Result<i64, AppError> {
    sqlx::query_scalar::<_, i64>(
        r#"
        SELECT l.course_id
        FROM questions qu
        JOIN quizzes q ON q.id = qu.quiz_id
        JOIN lessons l ON l.id = q.lesson_id
        WHERE qu.id = ?
        "#,
    )
    .bind(question_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::NotFound("Question not found".to_string()))
}
