use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    response::{IntoResponse, Response},
    Json,
};
use http::{Method, StatusCode};
use marquee_types::ValidationErrors;
use serde_json::json;
use tracing::{debug, error};

pub type ApiResult<T, E = ApiError> = std::result::Result<T, E>;

pub const MAX_BODY_SIZE: usize = 1_048_576;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Resource not found")]
    NotFound,

    #[error("Edit conflict")]
    EditConflict,

    #[error(transparent)]
    ValidationFailed(#[from] ValidationErrors),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method {0} not allowed")]
    MethodNotAllowed(Method),

    #[error("Database error: {0}")]
    DatabaseError(marquee_dal::Error),
}

impl From<marquee_dal::Error> for ApiError {
    fn from(error: marquee_dal::Error) -> Self {
        match error {
            marquee_dal::Error::RecordNotFound(_) => ApiError::NotFound,
            marquee_dal::Error::EditConflict { .. } => ApiError::EditConflict,
            e => ApiError::DatabaseError(e),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match rejection {
            JsonRejection::JsonSyntaxError(_) => "body contains badly-formed JSON".to_string(),
            JsonRejection::BytesRejection(_) => {
                format!("body must not be larger than {MAX_BODY_SIZE} bytes")
            }
            other => other.body_text(),
        };
        ApiError::InvalidRequest(message)
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::InvalidRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        debug!("Invalid path parameter: {rejection}");
        ApiError::NotFound
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                json!("the requested resource could not be found"),
            ),
            ApiError::EditConflict => (
                StatusCode::CONFLICT,
                json!("unable to update the record due to an edit conflict, please try again"),
            ),
            ApiError::ValidationFailed(errors) => (StatusCode::UNPROCESSABLE_ENTITY, json!(errors)),
            ApiError::InvalidRequest(message) => (StatusCode::BAD_REQUEST, json!(message)),
            ApiError::MethodNotAllowed(method) => (
                StatusCode::METHOD_NOT_ALLOWED,
                json!(format!(
                    "the {method} method is not supported for this resource"
                )),
            ),
            ApiError::DatabaseError(e) => {
                error!("Request failed: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!("the server encountered a problem and could not process your request"),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound
}

pub async fn method_not_allowed(method: Method) -> ApiError {
    ApiError::MethodNotAllowed(method)
}
