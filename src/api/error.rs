//! HTTP error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;

use crate::models::{DeploymentError, ErrorResponse, NamespaceErrorResponse};

/// Deployment operation an error came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Create,
    Get,
    Update,
    Delete,
    List,
}

impl Operation {
    fn failure(self) -> (&'static str, &'static str) {
        match self {
            Operation::Create => ("DEPLOYMENT_FAILED", "Failed to create deployment"),
            Operation::Get => ("INTERNAL_ERROR", "Internal server error"),
            Operation::Update => ("UPDATE_FAILED", "Failed to update deployment"),
            Operation::Delete => ("DELETE_FAILED", "Failed to delete deployment"),
            Operation::List => ("LIST_FAILED", "Failed to list deployments"),
        }
    }
}

/// Error returned by the deployment API
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: &'static str,
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: &'static str) -> Self {
        Self {
            status,
            code,
            message,
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn invalid_request(details: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "INVALID_REQUEST",
            "Invalid request format",
        )
        .with_details(details)
    }

    pub fn invalid_query(details: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "INVALID_QUERY",
            "Invalid query parameters",
        )
        .with_details(details)
    }

    /// Map a service error for the given operation
    pub fn from_deployment(err: DeploymentError, op: Operation) -> Self {
        let details = err.to_string();
        let error = if err.is_invalid_spec() {
            Self::new(
                StatusCode::BAD_REQUEST,
                "INVALID_SPEC",
                "Invalid deployment specification",
            )
        } else if op == Operation::Create && err.is_conflict() {
            Self::new(
                StatusCode::CONFLICT,
                "DEPLOYMENT_ID_EXISTS",
                "Deployment ID already exists",
            )
        } else if err.is_multiple_found() {
            Self::new(
                StatusCode::CONFLICT,
                "DEPLOYMENT_ID_CONFLICT",
                "Multiple deployments found with the same ID across different namespaces",
            )
        } else if err.is_not_found() {
            Self::new(
                StatusCode::NOT_FOUND,
                "DEPLOYMENT_NOT_FOUND",
                "Deployment not found",
            )
        } else {
            let (code, message) = op.failure();
            Self::new(StatusCode::INTERNAL_SERVER_ERROR, code, message)
        };
        error.with_details(details)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            code: self.code.to_string(),
            message: self.message.to_string(),
            details: self.details,
            timestamp: Utc::now(),
        };
        (self.status, Json(body)).into_response()
    }
}

/// Error returned by the namespace API
#[derive(Debug)]
pub struct NamespaceApiError {
    pub status: StatusCode,
    pub error: &'static str,
    pub message: String,
}

impl NamespaceApiError {
    pub fn new(status: StatusCode, error: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            error,
            message: message.into(),
        }
    }
}

impl IntoResponse for NamespaceApiError {
    fn into_response(self) -> Response {
        let body = NamespaceErrorResponse {
            error: self.error.to_string(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}
