// tests/common/mod.rs

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use learnsphere::{
    config::Config,
    db,
    payments::provider::{CheckoutSession, NewCheckoutSession, PaymentProvider, ProviderError},
    routes,
    state::AppState,
    utils::hash::hash_password,
};
use serde_json::{Value, json};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

pub const WEBHOOK_SECRET: &str = "whsec_integration";

/// In-process stand-in for the hosted checkout provider.
#[derive(Default)]
pub struct FakePaymentProvider {
    sessions: Mutex<HashMap<String, CheckoutSession>>,
}

impl FakePaymentProvider {
    /// Marks a session as paid, the way the provider does after a successful charge.
    pub fn mark_paid(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(session) = sessions.get_mut(session_id) {
            session.payment_status = "paid".to_string();
            session.payment_intent = Some(format!("pi_{}", session_id));
        }
    }

    /// Registers a session that was never created through checkout.
    pub fn insert(&self, session: CheckoutSession) {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id.clone(), session);
    }
}

#[async_trait]
impl PaymentProvider for FakePaymentProvider {
    async fn create_checkout_session(
        &self,
        request: &NewCheckoutSession,
    ) -> Result<CheckoutSession, ProviderError> {
        let id = format!("cs_test_{}", uuid::Uuid::new_v4().simple());
        let session = CheckoutSession {
            id: id.clone(),
            url: Some(format!("https://checkout.test/{}", id)),
            payment_status: "unpaid".to_string(),
            payment_intent: None,
            metadata: HashMap::from([
                ("userId".to_string(), request.user_id.to_string()),
                ("courseId".to_string(), request.course_id.to_string()),
            ]),
        };
        self.insert(session.clone());
        Ok(session)
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, ProviderError> {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or(ProviderError::Api {
                status: 404,
                message: format!("No such checkout.session: {}", session_id),
            })
    }
}

pub struct TestApp {
    pub address: String,
    pub pool: SqlitePool,
    pub provider: Arc<FakePaymentProvider>,
    pub client: reqwest::Client,
    /// Backing file of a file-based database, removed on drop.
    db_path: Option<PathBuf>,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        if let Some(path) = &self.db_path {
            for suffix in ["", "-wal", "-shm"] {
                let mut file = path.clone().into_os_string();
                file.push(suffix);
                let _ = std::fs::remove_file(file);
            }
        }
    }
}

/// Spawns the app on a random port against a fresh in-memory database.
pub async fn spawn_app() -> TestApp {
    // One connection keeps every query on the same in-memory database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory SQLite");

    serve(pool, None).await
}

/// Spawns the app against a WAL database file with a multi-connection pool,
/// configured like the server. Concurrent requests really run side by side.
pub async fn spawn_app_on_file() -> TestApp {
    let path = std::env::temp_dir().join(format!("learnsphere-{}.db", uuid::Uuid::new_v4().simple()));
    let options = db::connect_options(&format!("sqlite://{}", path.display()))
        .expect("Failed to build connect options");

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .expect("Failed to open SQLite file");

    serve(pool, Some(path)).await
}

async fn serve(pool: SqlitePool, db_path: Option<PathBuf>) -> TestApp {
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        listen_addr: "127.0.0.1:0".to_string(),
        app_base_url: "http://localhost:3000".to_string(),
        stripe_secret_key: None,
        stripe_webhook_secret: Some(WEBHOOK_SECRET.to_string()),
        admin_email: None,
        admin_password: None,
    };

    let provider = Arc::new(FakePaymentProvider::default());
    let state = AppState {
        pool: pool.clone(),
        config,
        payments: provider.clone(),
    };

    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address,
        pool,
        provider,
        client: reqwest::Client::new(),
        db_path,
    }
}

pub struct TestUser {
    pub id: i64,
    pub email: String,
    pub token: String,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.address, path)
    }

    /// Creates a user with the given role directly in the database, then logs in.
    pub async fn create_user(&self, role: &str, name: &str) -> TestUser {
        let email = format!("{}_{}@example.com", name.to_lowercase(), &uuid::Uuid::new_v4().to_string()[..8]);
        let password = "password123";

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO users (email, name, password, role, total_points, badge_level, created_at)
            VALUES (?, ?, ?, ?, 0, 'NEWBIE', ?)
            RETURNING id
            "#,
        )
        .bind(&email)
        .bind(name)
        .bind(hash_password(password).unwrap())
        .bind(role)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .unwrap();

        let token = self.login(&email, password).await;

        TestUser { id, email, token }
    }

    pub async fn login(&self, email: &str, password: &str) -> String {
        let response = self
            .client
            .post(format!("{}/api/auth/login", self.address))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), 200);

        let body: Value = response.json().await.unwrap();
        body["token"].as_str().unwrap().to_string()
    }

    /// Creates a published course owned by `owner`.
    pub async fn create_course(&self, owner: &TestUser, body: Value) -> i64 {
        let response = self
            .client
            .post(self.url("/courses"))
            .bearer_auth(&owner.token)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), 201);

        let course: Value = response.json().await.unwrap();
        course["id"].as_i64().unwrap()
    }

    pub async fn create_lesson(&self, owner: &TestUser, course_id: i64, title: &str, lesson_type: &str) -> i64 {
        let response = self
            .client
            .post(self.url(&format!("/courses/{}/lessons", course_id)))
            .bearer_auth(&owner.token)
            .json(&json!({ "title": title, "lessonType": lesson_type }))
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), 201);

        let lesson: Value = response.json().await.unwrap();
        lesson["id"].as_i64().unwrap()
    }

    /// Adds a question whose correct answer is the first option.
    /// Returns (question id, correct option id, wrong option id).
    pub async fn add_question(&self, owner: &TestUser, quiz_id: i64, text: &str) -> (i64, i64, i64) {
        let response = self
            .client
            .post(self.url(&format!("/quizzes/{}/questions", quiz_id)))
            .bearer_auth(&owner.token)
            .json(&json!({
                "text": text,
                "options": [
                    { "text": "right", "isCorrect": true },
                    { "text": "wrong", "isCorrect": false }
                ]
            }))
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), 201);

        let body: Value = response.json().await.unwrap();
        let option_ids = body["optionIds"].as_array().unwrap();
        (
            body["id"].as_i64().unwrap(),
            option_ids[0].as_i64().unwrap(),
            option_ids[1].as_i64().unwrap(),
        )
    }

    /// Quiz id of a QUIZ lesson, as seen by its author.
    pub async fn quiz_of_lesson(&self, owner: &TestUser, lesson_id: i64) -> i64 {
        let body: Value = self
            .client
            .get(self.url(&format!("/lessons/{}/quiz", lesson_id)))
            .bearer_auth(&owner.token)
            .send()
            .await
            .expect("Failed to execute request")
            .json()
            .await
            .unwrap();
        body["id"].as_i64().unwrap()
    }

    pub async fn enroll(&self, learner: &TestUser, course_id: i64) {
        let response = self
            .client
            .post(self.url(&format!("/courses/{}/enroll", course_id)))
            .bearer_auth(&learner.token)
            .send()
            .await
            .expect("Failed to execute request");
        assert!(response.status().is_success());
    }
}
