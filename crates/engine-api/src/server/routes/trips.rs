#[derive(Debug, Deserialize)]
struct RecordTripRequest {
    user_id: i64,
    mode: TransportMode,
    distance_km: f64,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
}

async fn record_trip(
    State(state): State<AppState>,
    Json(request): Json<RecordTripRequest>,
) -> Result<(StatusCode, Json<TripRecord>), HttpApiError> {
    let trip = {
        let mut engine = state.engine.lock().await;
        engine.record_trip(
            request.user_id,
            request.mode,
            request.distance_km,
            request.started_at,
            request.ended_at,
        )?
    };

    Ok((StatusCode::CREATED, Json(trip)))
}

#[derive(Debug, Serialize)]
struct ModeStat {
    mode: TransportMode,
    saved_g: f64,
}

#[derive(Debug, Serialize)]
struct ModeStatsResponse {
    schema_version: String,
    user_id: i64,
    stats: Vec<ModeStat>,
}

async fn get_mode_stats(
    Path(user_id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<ModeStatsResponse>, HttpApiError> {
    let stats = {
        let engine = state.engine.lock().await;
        engine.mode_stats(user_id)?
    };

    Ok(Json(ModeStatsResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        user_id,
        stats: stats
            .into_iter()
            .map(|(mode, saved_g)| ModeStat { mode, saved_g })
            .collect(),
    }))
}

#[derive(Debug, Deserialize, Default)]
struct DailyStatsQuery {
    days: Option<i64>,
}

#[derive(Debug, Serialize)]
struct DailyStat {
    date: String,
    saved_g: f64,
}

#[derive(Debug, Serialize)]
struct DailyStatsResponse {
    schema_version: String,
    user_id: i64,
    stats: Vec<DailyStat>,
}

async fn get_daily_stats(
    Path(user_id): Path<i64>,
    State(state): State<AppState>,
    Query(query): Query<DailyStatsQuery>,
) -> Result<Json<DailyStatsResponse>, HttpApiError> {
    let days = query.days.unwrap_or(DEFAULT_STATS_DAYS);
    if days <= 0 {
        return Err(HttpApiError::invalid_request(
            "days must be positive",
            Some(format!("days={days}")),
        ));
    }

    let stats = {
        let engine = state.engine.lock().await;
        engine.daily_stats(user_id, days)?
    };

    Ok(Json(DailyStatsResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        user_id,
        stats: stats
            .into_iter()
            .map(|(date, saved_g)| DailyStat { date, saved_g })
            .collect(),
    }))
}
