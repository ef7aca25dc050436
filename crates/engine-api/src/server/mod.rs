use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, Query, Request, State};
use axum::http::header::{HeaderName, HeaderValue};
use axum::http::Method;
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use contracts::{
    ApiError, Challenge, ChallengeMembership, ChallengeScope, ChallengeStatus, CompletionPolicy,
    ErrorCode, LedgerEntry, MetricKind, ModeFilter, TransportMode, TripRecord, SCHEMA_VERSION_V1,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use crate::{EngineApi, EngineError};
use engine_core::{RateError, RewardError};

const DEFAULT_PAGE_SIZE: usize = 50;
const MAX_PAGE_SIZE: usize = 500;
const DEFAULT_STATS_DAYS: i64 = 7;

include!("error.rs");
include!("state.rs");
include!("routes/trips.rs");
include!("routes/credits.rs");
include!("routes/challenges.rs");
include!("util.rs");

pub async fn serve(addr: SocketAddr, engine: EngineApi) -> Result<(), ServerError> {
    let state = AppState::new(engine);
    let app = router(state);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/trips", post(record_trip))
        .route("/api/v1/users/{user_id}/balance", get(get_balance))
        .route("/api/v1/users/{user_id}/history", get(get_history))
        .route("/api/v1/users/{user_id}/stats/mode", get(get_mode_stats))
        .route("/api/v1/users/{user_id}/stats/daily", get(get_daily_stats))
        .route(
            "/api/v1/challenges",
            post(create_challenge).get(list_challenges),
        )
        .route("/api/v1/challenges/{challenge_id}/join", post(join_challenge))
        .route(
            "/api/v1/challenges/{challenge_id}/complete",
            post(complete_challenge),
        )
        .layer(middleware::from_fn(cors_middleware))
        .with_state(state)
}

async fn cors_middleware(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        let mut response = Response::new(axum::body::Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return response;
    }

    let mut response = next.run(request).await;
    apply_cors_headers(response.headers_mut());
    response
}
