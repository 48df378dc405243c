// src/handlers/quiz.rs

use std::collections::HashMap;

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
        lesson::LessonType,
        quiz::{
            CreateQuestionRequest, OptionView, Question, QuestionView, Quiz, QuizAttempt,
            QuizOption, QuizView, SubmitAttemptRequest, UpdateQuizRequest,
        },
        user::Role,
    },
    services::{course_lock, enrollment, quiz, rewards},
    utils::jwt::Claims,
};

/// Returns the quiz of a QUIZ lesson with its questions.
///
/// A QUIZ lesson without a quiz gets a default one on the spot. Learners
/// never see which option is correct.
pub async fn get_lesson_quiz(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(lesson_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let mut conn = pool.acquire().await?;

    let (course_id, lesson_type, instructor_id) = sqlx::query_as::<_, (i64, LessonType, i64)>(
        r#"
        SELECT l.course_id, l.lesson_type, c.instructor_id
        FROM lessons l
        JOIN courses c ON c.id = l.course_id
        WHERE l.id = ?
        "#,
    )
    .bind(lesson_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::NotFound("Lesson not found".to_string()))?;

    if lesson_type != LessonType::Quiz {
        return Err(AppError::NotFound("Lesson is not a quiz".to_string()));
    }

    enrollment::ensure_access(&mut conn, user_id, claims.role, course_id).await?;
    let reveal_answers = claims.role == Role::Admin || instructor_id == user_id;

    let quiz = quiz::ensure_quiz(&mut conn, lesson_id).await?;

    let questions = sqlx::query_as::<_, Question>(
        "SELECT * FROM questions WHERE quiz_id = ? ORDER BY position, id",
    )
    .bind(quiz.id)
    .fetch_all(&mut *conn)
    .await?;

    let options = sqlx::query_as::<_, QuizOption>(
        r#"
        SELECT o.* FROM options o
        JOIN questions q ON q.id = o.question_id
        WHERE q.quiz_id = ?
        ORDER BY o.id
        "#,
    )
    .bind(quiz.id)
    .fetch_all(&mut *conn)
    .await?;

    let mut by_question: HashMap<i64, Vec<OptionView>> = HashMap::new();
    for option in options {
        by_question
            .entry(option.question_id)
            .or_default()
            .push(OptionView {
                id: option.id,
                text: option.text,
                is_correct: reveal_answers.then_some(option.is_correct),
            });
    }

    let questions = questions
        .into_iter()
        .map(|q| QuestionView {
            options: by_question.remove(&q.id).unwrap_or_default(),
            id: q.id,
            text: q.text,
            position: q.position,
        })
        .collect();

    Ok(Json(QuizView { quiz, questions }))
}

/// Changes tier points. Out-of-order tiers are accepted but logged.
pub async fn update_quiz(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let user_id = claims.user_id()?;

    let mut tx = db::begin_write(&pool).await?;
    let course_id = quiz::course_of_quiz(&mut tx, id).await?;
    course_lock::ensure_editable(&mut tx, course_id, user_id, claims.role, Utc::now()).await?;

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE quizzes SET id = id");

    let tiers = [
        ("first_attempt_points", payload.first_attempt_points),
        ("second_attempt_points", payload.second_attempt_points),
        ("third_attempt_points", payload.third_attempt_points),
        ("fourth_plus_points", payload.fourth_plus_points),
    ];
    for (column, value) in tiers {
        if let Some(points) = value {
            builder.push(format!(", {} = ", column));
            builder.push_bind(points);
        }
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.push(" RETURNING *");

    let quiz = builder.build_query_as::<Quiz>().fetch_one(&mut *tx).await?;

    tx.commit().await?;

    if !quiz.tiers_are_ordered() {
        tracing::warn!(
            quiz_id = quiz.id,
            "quiz tier points are not non-increasing: {}/{}/{}/{}",
            quiz.first_attempt_points,
            quiz.second_attempt_points,
            quiz.third_attempt_points,
            quiz.fourth_plus_points
        );
    }

    Ok(Json(quiz))
}

/// Adds a question with its options.
pub async fn create_question(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let user_id = claims.user_id()?;

    let mut tx = db::begin_write(&pool).await?;
    let course_id = quiz::course_of_quiz(&mut tx, quiz_id).await?;
    course_lock::ensure_editable(&mut tx, course_id, user_id, claims.role, Utc::now()).await?;

    let position = match payload.position {
        Some(position) => position,
        None => {
            sqlx::query_scalar::<_, i64>(
                "SELECT COALESCE(MAX(position), -1) + 1 FROM questions WHERE quiz_id = ?",
            )
            .bind(quiz_id)
            .fetch_one(&mut *tx)
            .await?
        }
    };

    let question_id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO questions (quiz_id, text, position) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(quiz_id)
    .bind(payload.text.trim())
    .bind(position)
    .fetch_one(&mut *tx)
    .await?;

    let mut option_ids = Vec::with_capacity(payload.options.len());
    for option in &payload.options {
        let option_id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO options (question_id, text, is_correct) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(question_id)
        .bind(option.text.trim())
        .bind(option.is_correct)
        .fetch_one(&mut *tx)
        .await?;
        option_ids.push(option_id);
    }

    tx.commit().await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": question_id, "optionIds": option_ids })),
    ))
}

/// Deletes a question and its options.
pub async fn delete_question(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let mut tx = db::begin_write(&pool).await?;
    let course_id = quiz::course_of_question(&mut tx, id).await?;
    course_lock::ensure_editable(&mut tx, course_id, user_id, claims.role, Utc::now()).await?;

    sqlx::query("DELETE FROM questions WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Grades a submission and awards points.
pub async fn submit_attempt(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
    Json(req): Json<SubmitAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.acting_user(req.user_id)?;

    {
        let mut conn = pool.acquire().await?;
        let course_id = quiz::course_of_quiz(&mut conn, quiz_id).await?;
        enrollment::ensure_access(&mut conn, user_id, claims.role_for(user_id), course_id)
            .await?;
    }

    let result =
        rewards::submit_attempt(&pool, quiz_id, user_id, &req.answers, Utc::now()).await?;

    Ok(Json(result))
}

/// The caller's own attempts on a quiz, oldest first.
pub async fn list_attempts(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let attempts = sqlx::query_as::<_, QuizAttempt>(
        "SELECT * FROM quiz_attempts WHERE quiz_id = ? AND user_id = ? ORDER BY attempt_number",
    )
    .bind(quiz_id)
    .bind(user_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(attempts))
}
