use axum::{response::IntoResponse, Json};

/// Error taxonomy shared by every core operation. Authorization and
/// validation failures map to distinct status codes so callers can tell
/// "you can't do that" apart from "try again".
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Not found")]
    NotFound,
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),
    #[error("Forbidden: {0}")]
    Denied(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Storage error: {0}")]
    Store(String),
}

impl From<diesel::result::Error> for ServiceError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::NotFound => Self::NotFound,
            other => Self::Store(other.to_string()),
        }
    }
}

impl From<diesel::r2d2::PoolError> for ServiceError {
    fn from(err: diesel::r2d2::PoolError) -> Self {
        Self::Store(err.to_string())
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;
        let (status, message) = match &self {
            Self::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            Self::Unauthenticated(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            Self::Denied(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Store(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn failures_map_to_distinguishable_status_codes() {
        let cases = [
            (ServiceError::NotFound, StatusCode::NOT_FOUND),
            (
                ServiceError::Unauthenticated("no token".into()),
                StatusCode::UNAUTHORIZED,
            ),
            (
                ServiceError::Denied("role gate".into()),
                StatusCode::FORBIDDEN,
            ),
            (
                ServiceError::Validation("blank".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                ServiceError::Store("pool exhausted".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn diesel_not_found_becomes_not_found() {
        let err: ServiceError = diesel::result::Error::NotFound.into();
        assert!(matches!(err, ServiceError::NotFound));
    }
}
