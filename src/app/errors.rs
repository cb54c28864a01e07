use crate::{
    embedding::{PreferenceError, StoreError},
    programs::InvalidPageRequest,
    ranking::RankError,
    search::SearchError,
    users::UserStoreError,
};

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Program not found")]
    NotFound,

    #[error("{0}")]
    Validation(String),

    #[error("invalid category: {0:?}")]
    InvalidCategory(String),

    #[error(transparent)]
    InvalidPageRequest(#[from] InvalidPageRequest),

    #[error("every example program needs a score between 1 and 5 before submitting")]
    IncompleteRatings,

    #[error("unauthenticated")]
    Unauthenticated,

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("unexpected error: {0:?}")]
    Other(#[from] anyhow::Error),
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::InvalidCategory(code) => AppError::InvalidCategory(code),
            SearchError::InvalidPageRequest(e) => AppError::InvalidPageRequest(e),
        }
    }
}

impl From<RankError> for AppError {
    fn from(err: RankError) -> Self {
        match err {
            RankError::StoreUnavailable(msg) => AppError::StoreUnavailable(msg),
            e @ RankError::DimensionMismatch { .. } => AppError::Other(e.into()),
        }
    }
}

impl From<PreferenceError> for AppError {
    fn from(err: PreferenceError) -> Self {
        match err {
            PreferenceError::IncompleteRatings => AppError::IncompleteRatings,
            e @ PreferenceError::UnknownExample(_) => AppError::Validation(e.to_string()),
            e @ (PreferenceError::MissingEmbedding(_) | PreferenceError::DimensionMismatch { .. }) => {
                AppError::Other(e.into())
            }
        }
    }
}

impl From<UserStoreError> for AppError {
    fn from(err: UserStoreError) -> Self {
        match err {
            UserStoreError::Unavailable => AppError::StoreUnavailable(err.to_string()),
            other => AppError::Other(other.into()),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => AppError::StoreUnavailable(msg),
            other => AppError::Other(other.into()),
        }
    }
}

impl AppError {
    /// HTTP status the error is reported with.
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::NotFound => 404,
            AppError::Validation(_)
            | AppError::InvalidCategory(_)
            | AppError::InvalidPageRequest(_)
            | AppError::IncompleteRatings => 400,
            AppError::Unauthenticated => 401,
            AppError::StoreUnavailable(_) => 503,
            AppError::Other(_) => 500,
        }
    }
}

/// Error body of every failed request.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ErrorEnvelope {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::NotFound.status_code(), 404);
        assert_eq!(AppError::NotFound.to_string(), "Program not found");
        assert_eq!(AppError::from(SearchError::InvalidCategory("X".into())).status_code(), 400);
        assert_eq!(AppError::from(PreferenceError::IncompleteRatings).status_code(), 400);
        assert_eq!(AppError::from(PreferenceError::UnknownExample(9)).status_code(), 400);
        assert_eq!(AppError::from(PreferenceError::MissingEmbedding(9)).status_code(), 500);
        assert_eq!(AppError::from(RankError::StoreUnavailable("down".into())).status_code(), 503);
        assert_eq!(AppError::from(UserStoreError::Unavailable).status_code(), 503);
        assert_eq!(AppError::Unauthenticated.status_code(), 401);
    }
}
