use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::repo::RepoError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")] Validation(String),
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    // One message for unknown handle and wrong password alike.
    #[error("invalid handle or password")] Unauthorized,
    #[error("forbidden")] Forbidden,
    #[error("too many requests")] RateLimited,
    #[error("internal error")] Internal,
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ApiError::NotFound,
            RepoError::Conflict => ApiError::Conflict,
            RepoError::Internal(msg) => {
                log::error!("storage failure: {msg}");
                ApiError::Internal
            }
        }
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        use actix_web::http::StatusCode;
        let status = match self {
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Conflict => StatusCode::CONFLICT,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        HttpResponse::build(status).json(ApiErrorBody { error: self.to_string() })
    }
}
