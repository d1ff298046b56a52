//! HTTP routes
//!
//! Thin translation layer between the JSON surface and the dispatcher.
//! Authentication happens upstream; handlers receive the verified caller
//! identity through the [`UserIdentity`] extractor, and everything except
//! `/version` requires it.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::auth::UserIdentity;
use crate::dispatch::Dispatcher;
use crate::request::JobRequest;
use crate::workflow::{NodeStatus, Workflow, WorkflowSummary};
use crate::Result;

/// Shared state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// The submission pipeline
    pub dispatcher: Dispatcher,
}

/// Response body for a successful submission
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct NewWorkflowResponse {
    /// Engine-assigned workflow name
    pub name: String,
}

/// Response body for `/version`
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct VersionResponse {
    /// Service name
    pub name: String,
    /// Service version
    pub version: String,
}

/// Build the service router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(list_workflows))
        .route("/workflows", get(list_workflows))
        .route("/new", axum::routing::post(new_workflow))
        .route(
            "/workflow/{wf_id}",
            get(get_workflow).delete(delete_workflow),
        )
        .route("/workflow/{wf_id}/{pod_id}", get(get_node))
        .route("/version", get(version))
        .with_state(state)
}

async fn new_workflow(
    State(state): State<Arc<AppState>>,
    user: UserIdentity,
    Json(request): Json<JobRequest>,
) -> Result<Json<NewWorkflowResponse>> {
    let name = state.dispatcher.submit(&user, &request).await?;
    Ok(Json(NewWorkflowResponse { name }))
}

async fn list_workflows(
    State(state): State<Arc<AppState>>,
    user: UserIdentity,
) -> Result<Json<Vec<WorkflowSummary>>> {
    Ok(Json(state.dispatcher.list(&user).await?))
}

async fn get_workflow(
    State(state): State<Arc<AppState>>,
    user: UserIdentity,
    Path(wf_id): Path<String>,
) -> Result<Json<Workflow>> {
    Ok(Json(state.dispatcher.get(&user, &wf_id).await?))
}

async fn get_node(
    State(state): State<Arc<AppState>>,
    user: UserIdentity,
    Path((wf_id, pod_id)): Path<(String, String)>,
) -> Result<Json<NodeStatus>> {
    Ok(Json(state.dispatcher.node(&user, &wf_id, &pod_id).await?))
}

async fn delete_workflow(
    State(state): State<Arc<AppState>>,
    user: UserIdentity,
    Path(wf_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    state.dispatcher.delete(&user, &wf_id).await?;
    Ok(Json(serde_json::json!({ "deleted": wf_id })))
}

async fn version() -> Json<VersionResponse> {
    Json(version_body())
}

fn version_body() -> VersionResponse {
    VersionResponse {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_reports_crate_metadata() {
        let body = version_body();
        assert_eq!(body.name, "wfdispatch");
        assert!(!body.version.is_empty());
    }
}
