#[derive(Debug, Serialize)]
struct BalanceResponse {
    schema_version: String,
    user_id: i64,
    balance: i64,
}

async fn get_balance(
    Path(user_id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<BalanceResponse>, HttpApiError> {
    let balance = {
        let engine = state.engine.lock().await;
        engine.balance(user_id)?
    };

    Ok(Json(BalanceResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        user_id,
        balance,
    }))
}

#[derive(Debug, Deserialize, Default)]
struct HistoryQuery {
    skip: Option<usize>,
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct HistoryPage {
    schema_version: String,
    user_id: i64,
    skip: usize,
    next_skip: Option<usize>,
    entries: Vec<LedgerEntry>,
}

async fn get_history(
    Path(user_id): Path<i64>,
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryPage>, HttpApiError> {
    let (skip, limit) = page_bounds(query.skip, query.limit);

    let entries = {
        let engine = state.engine.lock().await;
        engine.history(user_id, skip, limit)?
    };

    // A full page may have more behind it; a short page is the end.
    let next_skip = if entries.len() == limit {
        Some(skip + limit)
    } else {
        None
    };

    Ok(Json(HistoryPage {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        user_id,
        skip,
        next_skip,
        entries,
    }))
}
