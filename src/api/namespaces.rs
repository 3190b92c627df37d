//! Namespace API handlers

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware::map_response;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tracing::error;

use super::error::NamespaceApiError;
use crate::models::{HealthResponse, LabelSelectors, NamespaceResponse};
use crate::namespace::NamespaceOps;

type Service = Arc<dyn NamespaceOps>;

/// Routes of the namespace API
pub fn namespace_router(service: Service) -> Router {
    Router::new()
        .route("/api/v1/namespaces", post(namespaces_by_labels))
        .route("/api/v1/health", get(health))
        .fallback(not_found)
        .with_state(service)
        .layer(map_response(method_not_allowed))
}

async fn namespaces_by_labels(
    State(service): State<Service>,
    payload: Result<Json<LabelSelectors>, JsonRejection>,
) -> Result<Json<NamespaceResponse>, NamespaceApiError> {
    let Json(selectors) = payload.map_err(|rejection| {
        error!(error = %rejection.body_text(), "Failed to decode request body");
        NamespaceApiError::new(
            StatusCode::BAD_REQUEST,
            "Invalid JSON",
            "Failed to parse request body",
        )
    })?;

    let Some(labels) = selectors.non_empty() else {
        error!("Empty labels provided");
        return Err(NamespaceApiError::new(
            StatusCode::BAD_REQUEST,
            "Validation Error",
            "Labels cannot be empty",
        ));
    };

    let response = service.namespaces_by_labels(labels).await.map_err(|e| {
        error!(error = %e, "Failed to get namespaces from service");
        NamespaceApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Kubernetes API Error",
            "Failed to fetch namespaces",
        )
    })?;

    Ok(Json(response))
}

async fn health(State(service): State<Service>) -> (StatusCode, Json<HealthResponse>) {
    match service.health_check().await {
        Ok(()) => (StatusCode::OK, Json(HealthResponse::healthy())),
        Err(e) => {
            error!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse::unhealthy(format!("{e:#}"))),
            )
        }
    }
}

async fn not_found() -> NamespaceApiError {
    NamespaceApiError::new(
        StatusCode::NOT_FOUND,
        "Not Found",
        "The requested endpoint does not exist",
    )
}

/// Give the router's bare 405 responses a JSON body
async fn method_not_allowed(response: Response) -> Response {
    if response.status() != StatusCode::METHOD_NOT_ALLOWED {
        return response;
    }

    let (parts, _) = response.into_parts();
    let mut replacement = NamespaceApiError::new(
        StatusCode::METHOD_NOT_ALLOWED,
        "Method Not Allowed",
        "The HTTP method is not allowed for this endpoint",
    )
    .into_response();
    if let Some(allow) = parts.headers.get(axum::http::header::ALLOW) {
        replacement
            .headers_mut()
            .insert(axum::http::header::ALLOW, allow.clone());
    }
    replacement
}
