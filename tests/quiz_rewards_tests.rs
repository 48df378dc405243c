// tests/quiz_rewards_tests.rs

mod common;

use std::collections::HashMap;

use common::{TestApp, TestUser, spawn_app};
use serde_json::{Value, json};

struct QuizFixture {
    owner: TestUser,
    course_id: i64,
    lesson_id: i64,
    quiz_id: i64,
    /// (question id, correct option id, wrong option id)
    questions: Vec<(i64, i64, i64)>,
}

async fn quiz_fixture(app: &TestApp, question_count: usize) -> QuizFixture {
    let owner = app.create_user("INSTRUCTOR", "Olivia").await;
    let course_id = app
        .create_course(&owner, json!({ "title": "Rust 101", "isPublished": true }))
        .await;
    let lesson_id = app.create_lesson(&owner, course_id, "Checkpoint", "QUIZ").await;
    let quiz_id = app.quiz_of_lesson(&owner, lesson_id).await;

    let mut questions = Vec::new();
    for i in 0..question_count {
        questions.push(app.add_question(&owner, quiz_id, &format!("Question {}", i + 1)).await);
    }

    QuizFixture {
        owner,
        course_id,
        lesson_id,
        quiz_id,
        questions,
    }
}

fn all_correct(fixture: &QuizFixture) -> HashMap<String, i64> {
    fixture
        .questions
        .iter()
        .map(|(q, right, _)| (q.to_string(), *right))
        .collect()
}

async fn submit(app: &TestApp, user: &TestUser, quiz_id: i64, answers: &HashMap<String, i64>) -> reqwest::Response {
    app.client
        .post(app.url(&format!("/quizzes/{}/attempt", quiz_id)))
        .bearer_auth(&user.token)
        .json(&json!({ "answers": answers }))
        .send()
        .await
        .expect("Failed to execute request")
}

#[tokio::test]
async fn attempts_earn_decreasing_tiers_up_to_the_cap() {
    // Arrange
    let app = spawn_app().await;
    let fixture = quiz_fixture(&app, 2).await;
    let learner = app.create_user("LEARNER", "Lee").await;
    app.enroll(&learner, fixture.course_id).await;
    let answers = all_correct(&fixture);

    // Act + Assert
    let expected = [
        (1, 100, 100, "EXPERT"),
        (2, 75, 120, "MASTER"),
        (3, 50, 120, "MASTER"),
        (4, 25, 120, "MASTER"),
        (5, 25, 120, "MASTER"),
    ];
    for (attempt, earned, total, badge) in expected {
        let response = submit(&app, &learner, fixture.quiz_id, &answers).await;
        assert_eq!(response.status().as_u16(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["attemptNumber"].as_i64(), Some(attempt));
        assert_eq!(body["score"].as_i64(), Some(100));
        assert_eq!(body["pointsEarned"].as_i64(), Some(earned));
        assert_eq!(body["newTotalPoints"].as_i64(), Some(total));
        assert_eq!(body["badgeLevel"], badge);
    }

    let (total, badge): (i64, String) =
        sqlx::query_as("SELECT total_points, badge_level FROM users WHERE id = ?")
            .bind(learner.id)
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert_eq!(total, 120);
    assert_eq!(badge, "MASTER");

    // The ledger carries what was applied, so it sums to the stored total.
    let ledger: Vec<i64> = sqlx::query_scalar(
        "SELECT points FROM points_ledger WHERE user_id = ? ORDER BY id",
    )
    .bind(learner.id)
    .fetch_all(&app.pool)
    .await
    .unwrap();
    assert_eq!(ledger, vec![100, 20, 0, 0, 0]);

    let attempts: Value = app
        .client
        .get(app.url(&format!("/quizzes/{}/attempts", fixture.quiz_id)))
        .bearer_auth(&learner.token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(attempts.as_array().unwrap().len(), 5);

    let points: Value = app
        .client
        .get(app.url("/me/points"))
        .bearer_auth(&learner.token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(points.as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn partial_score_scales_points_and_completes_the_lesson() {
    let app = spawn_app().await;
    let fixture = quiz_fixture(&app, 2).await;
    let learner = app.create_user("LEARNER", "Lee").await;
    app.enroll(&learner, fixture.course_id).await;

    let (q1, right1, _) = fixture.questions[0];
    let (q2, _, wrong2) = fixture.questions[1];
    let answers = HashMap::from([(q1.to_string(), right1), (q2.to_string(), wrong2)]);

    let body: Value = submit(&app, &learner, fixture.quiz_id, &answers)
        .await
        .json()
        .await
        .unwrap();

    assert_eq!(body["score"].as_i64(), Some(50));
    assert_eq!(body["correctCount"].as_i64(), Some(1));
    assert_eq!(body["totalQuestions"].as_i64(), Some(2));
    assert_eq!(body["pointsEarned"].as_i64(), Some(50));
    assert_eq!(body["badgeLevel"], "EXPLORER");

    // Submitting marks the quiz lesson as done.
    let done: bool = sqlx::query_scalar(
        "SELECT is_completed FROM lesson_progress WHERE user_id = ? AND lesson_id = ?",
    )
    .bind(learner.id)
    .bind(fixture.lesson_id)
    .fetch_one(&app.pool)
    .await
    .unwrap();
    assert!(done);

    let progress: f64 = sqlx::query_scalar(
        "SELECT progress FROM enrollments WHERE user_id = ? AND course_id = ?",
    )
    .bind(learner.id)
    .bind(fixture.course_id)
    .fetch_one(&app.pool)
    .await
    .unwrap();
    assert_eq!(progress, 100.0);
}

#[tokio::test]
async fn badge_changes_exactly_at_forty_points() {
    let app = spawn_app().await;
    let fixture = quiz_fixture(&app, 1).await;
    let learner = app.create_user("LEARNER", "Lee").await;
    app.enroll(&learner, fixture.course_id).await;

    let response = app
        .client
        .put(app.url(&format!("/quizzes/{}", fixture.quiz_id)))
        .bearer_auth(&fixture.owner.token)
        .json(&json!({ "firstAttemptPoints": 39, "secondAttemptPoints": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let answers = all_correct(&fixture);

    let body: Value = submit(&app, &learner, fixture.quiz_id, &answers)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["newTotalPoints"].as_i64(), Some(39));
    assert_eq!(body["badgeLevel"], "NEWBIE");

    let body: Value = submit(&app, &learner, fixture.quiz_id, &answers)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["newTotalPoints"].as_i64(), Some(40));
    assert_eq!(body["badgeLevel"], "EXPLORER");
}

#[tokio::test]
async fn empty_quiz_cannot_be_submitted() {
    let app = spawn_app().await;
    let fixture = quiz_fixture(&app, 0).await;
    let learner = app.create_user("LEARNER", "Lee").await;
    app.enroll(&learner, fixture.course_id).await;

    let response = submit(&app, &learner, fixture.quiz_id, &HashMap::new()).await;
    assert_eq!(response.status().as_u16(), 400);

    let attempts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM quiz_attempts")
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(attempts, 0);
}

#[tokio::test]
async fn learners_must_be_enrolled_and_never_see_answers() {
    let app = spawn_app().await;
    let fixture = quiz_fixture(&app, 1).await;
    let learner = app.create_user("LEARNER", "Lee").await;
    let outsider = app.create_user("LEARNER", "Max").await;
    app.enroll(&learner, fixture.course_id).await;

    let response = submit(&app, &outsider, fixture.quiz_id, &all_correct(&fixture)).await;
    assert_eq!(response.status().as_u16(), 403);

    let response = app
        .client
        .get(app.url(&format!("/lessons/{}/quiz", fixture.lesson_id)))
        .bearer_auth(&learner.token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let view: Value = response.json().await.unwrap();
    let option = &view["questions"][0]["options"][0];
    assert!(option.get("text").is_some());
    assert!(option.get("isCorrect").is_none());

    let view: Value = app
        .client
        .get(app.url(&format!("/lessons/{}/quiz", fixture.lesson_id)))
        .bearer_auth(&fixture.owner.token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(view["questions"][0]["options"][0]["isCorrect"], true);
}

#[tokio::test]
async fn quiz_lesson_without_a_quiz_gets_a_default_one() {
    let app = spawn_app().await;
    let fixture = quiz_fixture(&app, 0).await;
    let learner = app.create_user("LEARNER", "Lee").await;
    app.enroll(&learner, fixture.course_id).await;

    sqlx::query("DELETE FROM quizzes WHERE lesson_id = ?")
        .bind(fixture.lesson_id)
        .execute(&app.pool)
        .await
        .unwrap();

    let view: Value = app
        .client
        .get(app.url(&format!("/lessons/{}/quiz", fixture.lesson_id)))
        .bearer_auth(&learner.token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(view["lessonId"].as_i64(), Some(fixture.lesson_id));
    assert_eq!(view["firstAttemptPoints"].as_i64(), Some(100));
    assert_eq!(view["secondAttemptPoints"].as_i64(), Some(75));
    assert_eq!(view["thirdAttemptPoints"].as_i64(), Some(50));
    assert_eq!(view["fourthPlusPoints"].as_i64(), Some(25));
    assert_eq!(view["questions"].as_array().unwrap().len(), 0);

    let quizzes: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM quizzes WHERE lesson_id = ?")
        .bind(fixture.lesson_id)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(quizzes, 1);
}

#[tokio::test]
async fn question_needs_exactly_one_correct_option() {
    let app = spawn_app().await;
    let fixture = quiz_fixture(&app, 0).await;

    let response = app
        .client
        .post(app.url(&format!("/quizzes/{}/questions", fixture.quiz_id)))
        .bearer_auth(&fixture.owner.token)
        .json(&json!({
            "text": "Pick two",
            "options": [
                { "text": "a", "isCorrect": true },
                { "text": "b", "isCorrect": true }
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
}
