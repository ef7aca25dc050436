#[derive(Debug, Deserialize)]
struct CreateChallengeRequest {
    title: String,
    description: Option<String>,
    scope: ChallengeScope,
    target_mode: ModeFilter,
    metric: MetricKind,
    target: f64,
    start_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
    completion: CompletionPolicy,
    reward: String,
    created_by: Option<i64>,
}

async fn create_challenge(
    State(state): State<AppState>,
    Json(request): Json<CreateChallengeRequest>,
) -> Result<(StatusCode, Json<Challenge>), HttpApiError> {
    let created = {
        let mut engine = state.engine.lock().await;
        let now = Utc::now();
        engine.create_challenge(&Challenge {
            challenge_id: 0,
            title: request.title,
            description: request.description,
            scope: request.scope,
            target_mode: request.target_mode,
            metric: request.metric,
            target: request.target,
            start_at: request.start_at,
            end_at: request.end_at,
            completion: request.completion,
            reward: request.reward,
            created_by: request.created_by,
            created_at: now,
        })?
    };

    Ok((StatusCode::CREATED, Json(created)))
}

#[derive(Debug, Deserialize)]
struct ChallengeListQuery {
    user_id: i64,
}

#[derive(Debug, Serialize)]
struct ChallengeListResponse {
    schema_version: String,
    user_id: i64,
    challenges: Vec<ChallengeStatus>,
}

async fn list_challenges(
    State(state): State<AppState>,
    Query(query): Query<ChallengeListQuery>,
) -> Result<Json<ChallengeListResponse>, HttpApiError> {
    let challenges = {
        let engine = state.engine.lock().await;
        engine.list_challenges(query.user_id)?
    };

    Ok(Json(ChallengeListResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        user_id: query.user_id,
        challenges,
    }))
}

#[derive(Debug, Deserialize)]
struct MembershipRequest {
    user_id: i64,
}

async fn join_challenge(
    Path(challenge_id): Path<i64>,
    State(state): State<AppState>,
    Json(request): Json<MembershipRequest>,
) -> Result<(StatusCode, Json<ChallengeMembership>), HttpApiError> {
    let membership = {
        let mut engine = state.engine.lock().await;
        engine.join_challenge(challenge_id, request.user_id)?
    };

    Ok((StatusCode::CREATED, Json(membership)))
}

async fn complete_challenge(
    Path(challenge_id): Path<i64>,
    State(state): State<AppState>,
    Json(request): Json<MembershipRequest>,
) -> Result<Json<ChallengeMembership>, HttpApiError> {
    let membership = {
        let mut engine = state.engine.lock().await;
        engine.complete_challenge(challenge_id, request.user_id)?
    };

    Ok(Json(membership))
}
