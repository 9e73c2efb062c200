//! HTTP endpoints
//!
//! Thin axum handlers over [`LinkcastService`]. The callback endpoint always
//! answers with a redirect so the browser never stops on a bare error page.

use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::correlation::LinkIntent;
use crate::error::{LinkError, LinkcastError};
use crate::linking::ProviderResponse;
use crate::service::{LinkcastService, PublishReport};
use crate::types::{Post, PostStatus, SocialAccount};

#[derive(Clone)]
pub struct AppState {
    service: Arc<LinkcastService>,
}

/// Build the router serving every endpoint
pub fn router(service: Arc<LinkcastService>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/authorize", get(authorize))
        .route("/callback", get(callback))
        .route("/posts", post(create_post))
        .route("/publish/:post_id", post(publish))
        .route("/accounts", post(create_account))
        .route("/accounts/:id/disconnect", post(disconnect_account))
        .route("/accounts/:id", delete(delete_account))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { service })
}

/// JSON error body returned by every non-redirect endpoint
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.code,
            "message": self.message,
        }));
        (self.status, body).into_response()
    }
}

impl From<LinkcastError> for ApiError {
    fn from(err: LinkcastError) -> Self {
        match err {
            LinkcastError::NotFound(what) => Self {
                status: StatusCode::NOT_FOUND,
                code: "not_found",
                message: format!("{} not found", what),
            },
            LinkcastError::InvalidInput(message) => Self::bad_request("invalid_input", message),
            other => {
                error!("Request failed: {}", other);
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "internal_error",
                    message: "internal error".to_string(),
                }
            }
        }
    }
}

impl From<LinkError> for ApiError {
    fn from(err: LinkError) -> Self {
        match err {
            LinkError::Store(message) => {
                error!("Link request failed: {}", message);
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "internal_error",
                    message: "internal error".to_string(),
                }
            }
            other => Self::bad_request(other.code(), other.to_string()),
        }
    }
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    providers: Vec<String>,
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        providers: state.service.providers(),
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct AuthorizeQuery {
    pub provider: Option<String>,
    /// Same-site path to land on after a successful link
    #[serde(alias = "redirect_after")]
    pub redirect_uri: Option<String>,
    pub account_id: Option<String>,
    pub workspace_id: Option<String>,
}

async fn authorize(
    State(state): State<AppState>,
    Query(query): Query<AuthorizeQuery>,
) -> Result<Redirect, ApiError> {
    let provider = query
        .provider
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("missing_provider", "provider is required"))?;

    let mut intent = LinkIntent::new(provider.trim().to_lowercase());
    if let Some(account_id) = query.account_id.filter(|s| !s.is_empty()) {
        intent = intent.for_account(account_id);
    }
    if let Some(workspace_id) = query.workspace_id.filter(|s| !s.is_empty()) {
        intent = intent.in_workspace(workspace_id);
    }
    if let Some(redirect) = query.redirect_uri.filter(|s| !s.is_empty()) {
        intent = intent.redirect_after(redirect);
    }

    let url = state.service.begin_link(intent).await?;
    Ok(Redirect::to(&url))
}

async fn callback(
    State(state): State<AppState>,
    query: Result<Query<ProviderResponse>, QueryRejection>,
) -> Redirect {
    let result = match query {
        Ok(Query(response)) => state.service.complete_link(response).await,
        Err(rejection) => state.service.reject_callback(rejection.body_text()),
    };
    Redirect::to(&result.redirect_to)
}

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub content: String,
    #[serde(default)]
    pub targets: Vec<String>,
    pub workspace_id: Option<String>,
    pub status: Option<PostStatus>,
}

async fn create_post(
    State(state): State<AppState>,
    Json(request): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<Post>), ApiError> {
    let mut post = Post::new(request.content).with_targets(request.targets);
    post.workspace_id = request.workspace_id;
    if let Some(status) = request.status {
        post.status = status;
    }

    state.service.create_post(&post).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

async fn publish(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> Result<Json<PublishReport>, ApiError> {
    Ok(Json(state.service.publish_post(&post_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub provider: String,
    pub name: String,
    pub workspace_id: Option<String>,
}

async fn create_account(
    State(state): State<AppState>,
    Json(request): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<SocialAccount>), ApiError> {
    let account = state
        .service
        .create_account(&request.provider, &request.name, request.workspace_id)
        .await?;
    Ok((StatusCode::CREATED, Json(account)))
}

async fn disconnect_account(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SocialAccount>, ApiError> {
    Ok(Json(state.service.disconnect_account(&id).await?))
}

async fn delete_account(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.service.delete_account(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
