// tests/course_lock_tests.rs

mod common;

use chrono::{Duration, Utc};
use common::spawn_app;
use learnsphere::error::AppError;
use learnsphere::services::course_lock;
use serde_json::{Value, json};

#[tokio::test]
async fn second_editor_gets_423_naming_the_holder() {
    // Arrange
    let app = spawn_app().await;
    let owner = app.create_user("INSTRUCTOR", "Olivia").await;
    let admin = app.create_user("ADMIN", "Adam").await;
    let course_id = app.create_course(&owner, json!({ "title": "Rust 101" })).await;

    // Act
    let first = app
        .client
        .post(app.url(&format!("/courses/{}/lock", course_id)))
        .bearer_auth(&owner.token)
        .send()
        .await
        .expect("Failed to execute request");
    let second = app
        .client
        .post(app.url(&format!("/courses/{}/lock", course_id)))
        .bearer_auth(&admin.token)
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(first.status().as_u16(), 200);
    let body: Value = first.json().await.unwrap();
    assert!(body["expiresAt"].is_string());

    assert_eq!(second.status().as_u16(), 423);
    let body: Value = second.json().await.unwrap();
    assert_eq!(body["lockedBy"]["id"].as_i64(), Some(owner.id));
    assert_eq!(body["lockedBy"]["name"], "Olivia");
    assert_eq!(body["lockedBy"]["email"], owner.email.as_str());
}

#[tokio::test]
async fn writes_are_rejected_while_someone_else_holds_the_lock() {
    let app = spawn_app().await;
    let owner = app.create_user("INSTRUCTOR", "Olivia").await;
    let admin = app.create_user("ADMIN", "Adam").await;
    let course_id = app.create_course(&owner, json!({ "title": "Rust 101" })).await;

    let response = app
        .client
        .post(app.url(&format!("/courses/{}/lock", course_id)))
        .bearer_auth(&owner.token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    // Admin is blocked on every write path of the course.
    let update = app
        .client
        .put(app.url(&format!("/courses/{}", course_id)))
        .bearer_auth(&admin.token)
        .json(&json!({ "title": "Hijacked" }))
        .send()
        .await
        .unwrap();
    assert_eq!(update.status().as_u16(), 423);

    let lesson = app
        .client
        .post(app.url(&format!("/courses/{}/lessons", course_id)))
        .bearer_auth(&admin.token)
        .json(&json!({ "title": "Intro", "lessonType": "DOCUMENT" }))
        .send()
        .await
        .unwrap();
    assert_eq!(lesson.status().as_u16(), 423);

    // Nothing was persisted by the rejected writes.
    let (title, lessons): (String, i64) = sqlx::query_as(
        "SELECT title, (SELECT COUNT(*) FROM lessons WHERE course_id = courses.id) FROM courses WHERE id = ?",
    )
    .bind(course_id)
    .fetch_one(&app.pool)
    .await
    .unwrap();
    assert_eq!(title, "Rust 101");
    assert_eq!(lessons, 0);

    // The holder itself writes freely.
    let update = app
        .client
        .put(app.url(&format!("/courses/{}", course_id)))
        .bearer_auth(&owner.token)
        .json(&json!({ "title": "Rust 102" }))
        .send()
        .await
        .unwrap();
    assert_eq!(update.status().as_u16(), 200);
    let body: Value = update.json().await.unwrap();
    assert_eq!(body["title"], "Rust 102");
}

#[tokio::test]
async fn holder_refreshes_and_release_by_others_is_a_noop() {
    let app = spawn_app().await;
    let owner = app.create_user("INSTRUCTOR", "Olivia").await;
    let admin = app.create_user("ADMIN", "Adam").await;
    let course_id = app.create_course(&owner, json!({ "title": "Rust 101" })).await;
    let lock_url = app.url(&format!("/courses/{}/lock", course_id));

    for _ in 0..2 {
        let response = app
            .client
            .post(&lock_url)
            .bearer_auth(&owner.token)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
    }

    // Releasing someone else's lock changes nothing.
    let response = app
        .client
        .delete(&lock_url)
        .bearer_auth(&admin.token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["released"], false);

    let response = app
        .client
        .post(&lock_url)
        .bearer_auth(&admin.token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 423);

    // The holder releases, then the admin can take it.
    let response = app
        .client
        .delete(&lock_url)
        .bearer_auth(&owner.token)
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["released"], true);

    let response = app
        .client
        .post(&lock_url)
        .bearer_auth(&admin.token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn expired_lease_can_be_taken_over() {
    let app = spawn_app().await;
    let owner = app.create_user("INSTRUCTOR", "Olivia").await;
    let admin = app.create_user("ADMIN", "Adam").await;
    let course_id = app.create_course(&owner, json!({ "title": "Rust 101" })).await;

    let now = Utc::now();
    let mut conn = app.pool.acquire().await.unwrap();

    course_lock::acquire(&mut conn, course_id, owner.id, now)
        .await
        .unwrap();

    // Inside the lease the admin is blocked.
    let blocked = course_lock::acquire(&mut conn, course_id, admin.id, now + Duration::seconds(29)).await;
    assert!(matches!(blocked, Err(AppError::Locked { .. })));

    // After it lapses the admin wins without anyone releasing.
    let later = now + Duration::seconds(31);
    let expires_at = course_lock::acquire(&mut conn, course_id, admin.id, later)
        .await
        .unwrap();
    assert_eq!(expires_at, later + Duration::seconds(30));

    let holder: Option<i64> =
        sqlx::query_scalar("SELECT editing_user_id FROM courses WHERE id = ?")
            .bind(course_id)
            .fetch_one(&mut *conn)
            .await
            .unwrap();
    assert_eq!(holder, Some(admin.id));

    // And the previous holder is now the one blocked.
    let guard = course_lock::ensure_editable(
        &mut conn,
        course_id,
        owner.id,
        learnsphere::models::user::Role::Instructor,
        later,
    )
    .await;
    match guard {
        Err(AppError::Locked { locked_by, .. }) => assert_eq!(locked_by.id, admin.id),
        other => panic!("expected a 423, got {:?}", other.map(|c| c.id)),
    }
}

#[tokio::test]
async fn lock_requires_an_existing_course_and_authoring_rights() {
    let app = spawn_app().await;
    let owner = app.create_user("INSTRUCTOR", "Olivia").await;
    let stranger = app.create_user("INSTRUCTOR", "Sam").await;
    let learner = app.create_user("LEARNER", "Lee").await;
    let course_id = app.create_course(&owner, json!({ "title": "Rust 101" })).await;

    let missing = app
        .client
        .post(app.url("/courses/999999/lock"))
        .bearer_auth(&owner.token)
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status().as_u16(), 404);

    let not_owner = app
        .client
        .post(app.url(&format!("/courses/{}/lock", course_id)))
        .bearer_auth(&stranger.token)
        .send()
        .await
        .unwrap();
    assert_eq!(not_owner.status().as_u16(), 403);

    let not_staff = app
        .client
        .post(app.url(&format!("/courses/{}/lock", course_id)))
        .bearer_auth(&learner.token)
        .send()
        .await
        .unwrap();
    assert_eq!(not_staff.status().as_u16(), 403);

    let anonymous = app
        .client
        .post(app.url(&format!("/courses/{}/lock", course_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(anonymous.status().as_u16(), 401);
}
