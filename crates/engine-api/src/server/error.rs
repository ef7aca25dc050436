#[derive(Debug)]
pub enum ServerError {
    Io(std::io::Error),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "server io error: {err}"),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<std::io::Error> for ServerError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

#[derive(Debug)]
struct HttpApiError {
    status: StatusCode,
    error: ApiError,
}

impl HttpApiError {
    fn invalid_request(message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: ApiError::new(ErrorCode::InvalidRequest, message, details),
        }
    }

    fn from_engine(err: EngineError) -> Self {
        let (status, code, message) = match &err {
            EngineError::Rate(RateError::RateNotFound { .. }) => (
                // A configuration gap, not a client mistake; fatal for this
                // calculation until an operator seeds the missing interval.
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::RateNotFound,
                "no emission rate covers the trip timestamp",
            ),
            EngineError::Rate(RateError::InvalidDistance(_)) => (
                StatusCode::BAD_REQUEST,
                ErrorCode::InvalidRequest,
                "distance_km must be positive",
            ),
            EngineError::Rate(RateError::OverlappingIntervals { .. }) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::InternalError,
                "emission rate table is misconfigured",
            ),
            EngineError::Reward(RewardError::InvalidRewardFormat(_)) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorCode::InvalidRewardFormat,
                "challenge reward descriptor has no point amount",
            ),
            EngineError::DuplicateLedgerEntry => (
                StatusCode::CONFLICT,
                ErrorCode::DuplicateLedgerEntry,
                "trip is already ledgered; no additional credit was awarded",
            ),
            EngineError::DuplicateCompletion => (
                StatusCode::CONFLICT,
                ErrorCode::DuplicateCompletion,
                "challenge is already completed",
            ),
            EngineError::AlreadyJoined => (
                StatusCode::CONFLICT,
                ErrorCode::InvalidRequest,
                "already a member of this challenge",
            ),
            EngineError::NotAMember => (
                StatusCode::FORBIDDEN,
                ErrorCode::NotAMember,
                "join the challenge before completing it",
            ),
            EngineError::ChallengeWindowClosed => (
                StatusCode::CONFLICT,
                ErrorCode::ChallengeWindowClosed,
                "challenge window is closed",
            ),
            EngineError::ZeroPointEntry => (
                StatusCode::BAD_REQUEST,
                ErrorCode::InvalidRequest,
                "EARN and SPEND entries must move points",
            ),
            EngineError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                ErrorCode::NotFound,
                "resource not found",
            ),
            EngineError::InvalidRequest(_) => (
                StatusCode::BAD_REQUEST,
                ErrorCode::InvalidRequest,
                "invalid request",
            ),
            EngineError::Sqlite(_) | EngineError::Serde(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::InternalError,
                "storage operation failed",
            ),
        };

        Self {
            status,
            error: ApiError::new(code, message, Some(err.to_string())),
        }
    }
}

impl From<EngineError> for HttpApiError {
    fn from(value: EngineError) -> Self {
        Self::from_engine(value)
    }
}

impl IntoResponse for HttpApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.error)).into_response()
    }
}
