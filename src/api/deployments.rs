//! Deployment API handlers

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use super::error::{ApiError, Operation};
use crate::deployment::DeploymentOps;
use crate::models::{
    DeploymentRequest, DeploymentResponse, HealthResponse, ListDeploymentsQuery,
    ListDeploymentsResponse,
};

type Service = Arc<dyn DeploymentOps>;

/// Routes of the deployment API
pub fn deployment_router(service: Service) -> Router {
    Router::new()
        .route(
            "/api/v1/deployments",
            get(list_deployments).post(create_deployment),
        )
        .route(
            "/api/v1/deployments/:id",
            get(get_deployment)
                .put(update_deployment)
                .delete(delete_deployment),
        )
        .route("/api/v1/health", get(health))
        .with_state(service)
}

fn parse_body(
    payload: Result<Json<DeploymentRequest>, JsonRejection>,
) -> Result<DeploymentRequest, ApiError> {
    payload.map(|Json(request)| request).map_err(|rejection| {
        error!(error = %rejection.body_text(), "Failed to bind request");
        ApiError::invalid_request(rejection.body_text())
    })
}

async fn create_deployment(
    State(service): State<Service>,
    payload: Result<Json<DeploymentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<DeploymentResponse>), ApiError> {
    let request = parse_body(payload)?;
    let id = Uuid::new_v4().to_string();

    let response = service.create(&request, &id).await.map_err(|e| {
        error!(deployment_id = %id, error = %e, "Failed to create deployment");
        ApiError::from_deployment(e, Operation::Create)
    })?;

    info!(deployment_id = %id, "Successfully created deployment");
    Ok((StatusCode::CREATED, Json(response)))
}

async fn get_deployment(
    State(service): State<Service>,
    Path(id): Path<String>,
) -> Result<Json<DeploymentResponse>, ApiError> {
    let response = service.get_by_id(&id).await.map_err(|e| {
        error!(deployment_id = %id, error = %e, "Failed to get deployment");
        ApiError::from_deployment(e, Operation::Get)
    })?;

    Ok(Json(response))
}

async fn update_deployment(
    State(service): State<Service>,
    Path(id): Path<String>,
    payload: Result<Json<DeploymentRequest>, JsonRejection>,
) -> Result<Json<DeploymentResponse>, ApiError> {
    let request = parse_body(payload)?;

    let response = service.update(&request, &id).await.map_err(|e| {
        error!(deployment_id = %id, error = %e, "Failed to update deployment");
        ApiError::from_deployment(e, Operation::Update)
    })?;

    info!(deployment_id = %id, "Successfully updated deployment");
    Ok(Json(response))
}

async fn delete_deployment(
    State(service): State<Service>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    service.delete(&id).await.map_err(|e| {
        error!(deployment_id = %id, error = %e, "Failed to delete deployment");
        ApiError::from_deployment(e, Operation::Delete)
    })?;

    info!(deployment_id = %id, "Successfully deleted deployment");
    Ok(StatusCode::NO_CONTENT)
}

async fn list_deployments(
    State(service): State<Service>,
    query: Result<Query<ListDeploymentsQuery>, QueryRejection>,
) -> Result<Json<ListDeploymentsResponse>, ApiError> {
    let Query(query) = query.map_err(|rejection| ApiError::invalid_query(rejection.body_text()))?;
    query.validate().map_err(ApiError::invalid_query)?;

    let response = service.list(&query).await.map_err(|e| {
        error!(error = %e, "Failed to list deployments");
        ApiError::from_deployment(e, Operation::List)
    })?;

    info!(count = response.deployments.len(), "Successfully listed deployments");
    Ok(Json(response))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
