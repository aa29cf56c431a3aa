use axum::{response::IntoResponse, Json};
use uuid::Uuid;

use crate::core::error::CrmError;
use crate::core::shared::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum DemandError {
    #[error("Demand {0} not found")]
    DemandNotFound(Uuid),
    #[error("Board {0} not found")]
    BoardNotFound(Uuid),
    #[error("Column {0} not found")]
    ColumnNotFound(Uuid),
    #[error("Column {to} is not on board {board}")]
    BoardMismatch { board: Uuid, to: Uuid },
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<CrmError> for DemandError {
    fn from(err: CrmError) -> Self {
        match err {
            CrmError::PermissionDenied(msg) => Self::PermissionDenied(msg),
            CrmError::Validation(msg) => Self::Validation(msg),
            other => Self::Store(StoreError::Database(other.to_string())),
        }
    }
}

impl From<DemandError> for CrmError {
    fn from(err: DemandError) -> Self {
        match err {
            DemandError::DemandNotFound(_)
            | DemandError::BoardNotFound(_)
            | DemandError::ColumnNotFound(_) => Self::NotFound(err.to_string()),
            DemandError::BoardMismatch { .. } | DemandError::Validation(_) => {
                Self::Validation(err.to_string())
            }
            DemandError::PermissionDenied(msg) => Self::PermissionDenied(msg),
            DemandError::Store(store) => Self::from(store),
        }
    }
}

impl IntoResponse for DemandError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;
        let status = match &self {
            Self::DemandNotFound(_) | Self::BoardNotFound(_) | Self::ColumnNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::BoardMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::PermissionDenied(_) => StatusCode::FORBIDDEN,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            log::error!("Demand request failed: {self}");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
