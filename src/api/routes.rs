use axum::{routing::get, Router};
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;

use crate::api::{branch_handlers, handlers};
use crate::api::handlers::AppState;
use crate::store::traits::Store;

pub fn create_router<S: Store + 'static>() -> Router<AppState<S>> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Projects
        .route(
            "/projects",
            get(handlers::list_projects::<S>).post(handlers::create_project::<S>),
        )
        .route(
            "/projects/:project_id",
            get(handlers::get_project::<S>).put(handlers::update_project::<S>),
        )
        // Branches
        .route(
            "/projects/:project_id/branches",
            get(branch_handlers::list_branches::<S>).post(branch_handlers::create_branch::<S>),
        )
        .route(
            "/projects/:project_id/branches/:branch_id",
            get(branch_handlers::get_branch::<S>),
        )
        // Commits
        .route(
            "/projects/:project_id/commits",
            get(handlers::list_commits::<S>).post(handlers::create_commit::<S>),
        )
        .route(
            "/projects/:project_id/commits/:commit_id",
            get(handlers::get_commit::<S>),
        )
        .route(
            "/projects/:project_id/commits/:commit_id/changes",
            get(handlers::get_commit_changes::<S>),
        )
        // Elements at a commit
        .route(
            "/projects/:project_id/commits/:commit_id/elements",
            get(handlers::get_commit_elements::<S>),
        )
        .route(
            "/projects/:project_id/commits/:commit_id/elements/:element_id",
            get(handlers::get_commit_element::<S>),
        )
}

/// Router with state attached and the request timeout applied
pub fn build_app<S: Store + 'static>(state: AppState<S>, request_timeout: Duration) -> Router {
    create_router::<S>()
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
}
