//! Axum HTTP server for the assessment pipeline.
//!
//! Handlers are thin: they decode the request, call the shared
//! `AssessmentService`, and map `AssessmentError` onto status codes.
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/health` | Health check |
//! | GET | `/info` | Conditions, difficulty levels and question-count policy |
//! | POST | `/assessments/start` | Open a session and serve its questions |
//! | POST | `/assessments/submit` | Grade, score and predict risk for a session |
//! | GET | `/assessments/:id/results` | The persisted session record |
//! | POST | `/assessments/:id/abandon` | Abandon an in-progress session |
//! | GET | `/assessments/:id/review` | Served questions with answer keys, once the session has ended |
//! | GET | `/questions/:id` | Full question with answer key, unless an in-progress session serves it |
//! | GET | `/students/:student_ref/profile` | Latest scores and predictions for a student |

pub mod error;

use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use neuroscreen_core::engine::{AssessmentService, QuizInfo};
use neuroscreen_core::model::{AssessmentSession, Question, StudentProfile};
use neuroscreen_core::submission::{StartRequest, StartedAssessment, SubmissionResult, SubmitRequest};

pub use error::ApiError;

pub type AppState = Arc<AssessmentService>;

pub fn create_router(service: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health_check))
        .route("/info", get(handle_info))
        .route("/assessments/start", post(handle_start))
        .route("/assessments/submit", post(handle_submit))
        .route("/assessments/:id/results", get(handle_results))
        .route("/assessments/:id/abandon", post(handle_abandon))
        .route("/assessments/:id/review", get(handle_review))
        .route("/questions/:id", get(handle_question))
        .route("/students/:student_ref/profile", get(handle_profile))
        .layer(cors)
        .with_state(service)
}

/// Serve `service` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, service: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "assessment API listening");
    axum::serve(listener, create_router(service))
        .with_graceful_shutdown(shutdown)
        .await?;
    tracing::info!("assessment API stopped");
    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

// ── GET handlers ────────────────────────────────────────────────────

async fn handle_health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "OK" }))
}

async fn handle_info(State(service): State<AppState>) -> Json<QuizInfo> {
    Json(service.quiz_info())
}

async fn handle_results(
    State(service): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AssessmentSession>, ApiError> {
    Ok(Json(service.results(id).await?))
}

async fn handle_review(
    State(service): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Question>>, ApiError> {
    Ok(Json(service.review(id).await?))
}

async fn handle_question(
    State(service): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Question>, ApiError> {
    Ok(Json(service.question(id).await?))
}

async fn handle_profile(
    State(service): State<AppState>,
    Path(student_ref): Path<String>,
) -> Result<Json<StudentProfile>, ApiError> {
    service.profile(&student_ref).await?.map(Json).ok_or_else(|| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            format!("no profile for student '{student_ref}'"),
        )
    })
}

// ── POST handlers ───────────────────────────────────────────────────

async fn handle_start(
    State(service): State<AppState>,
    payload: Result<Json<StartRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<StartedAssessment>), ApiError> {
    let Json(request) = payload?;
    let started = service.start(request).await?;
    Ok((StatusCode::CREATED, Json(started)))
}

async fn handle_submit(
    State(service): State<AppState>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<Json<SubmissionResult>, ApiError> {
    let Json(request) = payload?;
    Ok(Json(service.submit(request).await?))
}

async fn handle_abandon(
    State(service): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AssessmentSession>, ApiError> {
    Ok(Json(service.abandon(id).await?))
}
