use crate::app::errors::AppError;

/// Failure of a Program API call as the client sees it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("please sign in again")]
    Unauthenticated,

    #[error("unexpected response ({status}): {message}")]
    Unknown { status: u16, message: String },

    /// The owning screen went away. Never shown to the user.
    #[error("request cancelled")]
    Cancelled,
}

impl ApiError {
    /// Classify an error status with the server's message, if any.
    pub fn from_status(status: u16, message: Option<String>) -> Self {
        let message = message.unwrap_or_else(|| format!("request failed with status {status}"));
        match status {
            400 | 422 => ApiError::Validation(message),
            401 | 403 => ApiError::Unauthenticated,
            404 => ApiError::NotFound(message),
            _ => ApiError::Unknown { status, message },
        }
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError::from_status(err.status_code(), Some(err.to_string()))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return ApiError::Unknown {
                status: err.status().map_or(200, |s| s.as_u16()),
                message: err.to_string(),
            };
        }
        ApiError::Network(err.to_string())
    }
}
