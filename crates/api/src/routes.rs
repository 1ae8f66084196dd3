use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use metrics::counter;
use tenancy_core::{NamespaceName, NamespaceStatusView, ProvisioningResult};
use tracing::info;

use crate::{ApiError, AppState, Message};

pub(crate) async fn ping() -> Json<Message<&'static str>> {
    Json(Message { message: "pong" })
}

pub(crate) async fn list(State(state): State<AppState>) -> Result<Json<Message<Vec<NamespaceName>>>, ApiError> {
    let names = state.status.list_all().await?;
    Ok(Json(Message { message: names }))
}

pub(crate) async fn create(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let t0 = Instant::now();
    let name = NamespaceName::parse(&namespace)?;
    let result = state.provisioner.create(&name).await;
    counter!("api_requests_total", 1u64, "route" => "create");
    info!(ns = %name, outcome = result.label(), took_ms = %t0.elapsed().as_millis(), "api: create");
    Ok((create_status(&result), Json(Message { message: result })))
}

pub(crate) async fn status(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let name = NamespaceName::parse(&namespace)?;
    let view = state.status.get_status(&name).await?;
    let code = match view {
        NamespaceStatusView::NotFound => StatusCode::NOT_FOUND,
        NamespaceStatusView::Found { .. } => StatusCode::OK,
    };
    Ok((code, Json(Message { message: view })))
}

pub(crate) fn create_status(result: &ProvisioningResult) -> StatusCode {
    match result {
        ProvisioningResult::Created => StatusCode::CREATED,
        ProvisioningResult::AlreadyExists => StatusCode::OK,
        ProvisioningResult::PartiallyFailed { .. } => StatusCode::MULTI_STATUS,
        ProvisioningResult::Failed { .. } => StatusCode::SERVICE_UNAVAILABLE,
    }
}
