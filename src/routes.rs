// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post, put},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{auth, course, dashboard, lesson, payment, progress, quiz},
    state::AppState,
    utils::jwt::{auth_middleware, staff_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, courses, learning, payments).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (pool, config, payment provider).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        "http://localhost:3000".parse::<HeaderValue>(),
        "http://127.0.0.1:3000".parse::<HeaderValue>(),
    ]
    .into_iter()
    .chain(std::iter::once(state.config.app_base_url.parse::<HeaderValue>()))
    .filter_map(Result::ok)
    .collect::<Vec<_>>();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    // Authoring: staff only, then ownership and the edit lock are checked per course.
    let authoring_routes = Router::new()
        .route("/courses", post(course::create_course))
        .route(
            "/courses/{id}",
            put(course::update_course).delete(course::delete_course),
        )
        .route(
            "/courses/{id}/lock",
            post(course::acquire_lock).delete(course::release_lock),
        )
        .route("/courses/{id}/attendees", post(course::add_attendee))
        .route("/courses/{id}/lessons", post(lesson::create_lesson))
        .route(
            "/lessons/{id}",
            put(lesson::update_lesson).delete(lesson::delete_lesson),
        )
        .route("/quizzes/{id}", put(quiz::update_quiz))
        .route("/quizzes/{id}/questions", post(quiz::create_question))
        .route("/questions/{id}", axum::routing::delete(quiz::delete_question))
        .layer(middleware::from_fn(staff_middleware));

    let learner_routes = Router::new()
        .route("/courses", get(course::list_courses))
        .route("/courses/{id}", get(course::get_course))
        .route("/courses/{id}/enroll", post(course::enroll))
        .route("/lessons/{id}", get(lesson::get_lesson))
        .route("/lessons/{id}/quiz", get(quiz::get_lesson_quiz))
        .route("/quizzes/{id}/attempt", post(quiz::submit_attempt))
        .route("/quizzes/{id}/attempts", get(quiz::list_attempts))
        .route("/progress", put(progress::record_progress))
        .route("/dashboard", get(dashboard::get_dashboard))
        .route("/me/points", get(dashboard::my_points))
        .route("/leaderboard", get(dashboard::get_leaderboard))
        .route("/payments/checkout", post(payment::create_checkout))
        .route("/payments/complete", post(payment::complete_payment))
        .route("/payments/mine", get(payment::list_my_payments));

    // Everything except auth and the provider webhook needs a token.
    let protected_routes = authoring_routes
        .merge(learner_routes)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api/auth", auth_routes)
        .route("/api/payments/webhook", post(payment::webhook))
        .nest("/api", protected_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
