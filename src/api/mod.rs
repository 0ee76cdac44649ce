//! HTTP surface. Handlers stay thin: authentication resolves a
//! [`UserContext`], the handler makes one or two upstream calls, and a
//! translator shapes the response.

pub mod accounts;
pub mod instance;
pub mod media;
pub mod notifications;
pub mod search;
pub mod statuses;
pub mod timelines;

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{DefaultBodyLimit, FromRequest, Request, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::de::DeserializeOwned;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use crate::atproto::AtpClient;
use crate::cache::Cache;
use crate::config::AppConfig;
use crate::error::{ApiError, LoggedJson};
use crate::ids::IdMapper;
use crate::oauth::{routes as oauth_routes, OAuthService};
use crate::rate_limit::{rate_limit_middleware, RateLimiter};
use crate::snowflake::SnowflakeGenerator;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub cache: Cache,
    pub ids: IdMapper,
    pub atp: Arc<AtpClient>,
    pub oauth: OAuthService,
    pub limiter: RateLimiter,
    pub snowflakes: Arc<SnowflakeGenerator>,
}

impl AppState {
    pub fn new(config: AppConfig, cache: Cache) -> Result<Self, ApiError> {
        let atp = Arc::new(AtpClient::new(
            config.atproto_service_url.clone(),
            config.pds_url().to_string(),
        )?);
        let snowflakes = Arc::new(SnowflakeGenerator::with_default_epoch());
        let ids = IdMapper::new(cache.clone(), snowflakes.clone());
        let oauth = OAuthService::new(cache.clone(), atp.clone(), snowflakes.clone());
        let limiter = RateLimiter::new(cache.clone());
        Ok(Self {
            config,
            cache,
            ids,
            atp,
            oauth,
            limiter,
            snowflakes,
        })
    }
}

/// Upstream access JWTs are short-lived; once the custodied session is this
/// old it gets rotated before the request proceeds.
const SESSION_REFRESH_AFTER_SECS: i64 = 5_400;

/// Bearer-token gate. On success the [`UserContext`] rides in request
/// extensions for the handler.
pub async fn require_token(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::Unauthorized.into_response())?;

    let mut user = state
        .oauth
        .validate_token(&token)
        .await
        .map_err(|e| e.into_response())?;

    let session_age = chrono::Utc::now().timestamp() - user.session.created_at;
    if session_age > SESSION_REFRESH_AFTER_SECS {
        // A failed refresh is terminal: the caller must re-authenticate.
        user = state
            .oauth
            .refresh_session(&token)
            .await
            .map_err(|e| e.into_response())?;
    }

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Mastodon clients send either JSON or form-encoded bodies, often both
/// from the same app. Accept both, dispatching on Content-Type.
pub struct FormOrJson<T>(pub T);

impl<S, T> FromRequest<S> for FormOrJson<T>
where
    T: DeserializeOwned + 'static,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("application/json"))
            .unwrap_or(false);

        if is_json {
            let LoggedJson(value) = LoggedJson::<T>::from_request(req, state).await?;
            Ok(FormOrJson(value))
        } else {
            let Form(value) = Form::<T>::from_request(req, state)
                .await
                .map_err(|e| ApiError::validation("body", e.body_text()))?;
            Ok(FormOrJson(value))
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Non-goal surfaces answer with their Mastodon-shaped empty value.
async fn empty_array() -> Json<Vec<serde_json::Value>> {
    Json(Vec::new())
}

async fn preferences() -> Json<crate::mastodon::Preferences> {
    Json(crate::mastodon::Preferences::default())
}

pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(health))
        .route("/api/v1/instance", get(instance::v1))
        .route("/api/v2/instance", get(instance::v2))
        .route("/api/v1/apps", post(oauth_routes::register_app))
        .route(
            "/oauth/authorize",
            get(oauth_routes::authorize_form).post(oauth_routes::authorize_submit),
        )
        .route("/oauth/token", post(oauth_routes::token))
        .route("/oauth/revoke", post(oauth_routes::revoke))
        .route("/api/v1/custom_emojis", get(empty_array))
        .route("/api/v1/filters", get(empty_array))
        .route("/api/v1/timelines/tag/{tag}", get(empty_array));

    let protected = Router::new()
        .route(
            "/api/v1/accounts/verify_credentials",
            get(accounts::verify_credentials),
        )
        .route("/api/v1/accounts/relationships", get(accounts::relationships))
        .route("/api/v1/accounts/lookup", get(accounts::lookup))
        .route("/api/v1/accounts/{id}", get(accounts::show))
        .route("/api/v1/accounts/{id}/statuses", get(accounts::statuses))
        .route("/api/v1/accounts/{id}/follow", post(accounts::follow))
        .route("/api/v1/accounts/{id}/unfollow", post(accounts::unfollow))
        .route("/api/v1/timelines/home", get(timelines::home))
        .route("/api/v1/notifications", get(notifications::index))
        .route("/api/v1/notifications/clear", post(notifications::clear))
        .route("/api/v1/notifications/{id}", get(notifications::show))
        .route("/api/v1/statuses", post(statuses::create))
        .route(
            "/api/v1/statuses/{id}",
            get(statuses::show).delete(statuses::destroy),
        )
        .route("/api/v1/statuses/{id}/context", get(statuses::context))
        .route("/api/v1/statuses/{id}/favourite", post(statuses::favourite))
        .route("/api/v1/statuses/{id}/reblog", post(statuses::reblog))
        .route(
            "/api/v1/media",
            post(media::upload).layer(DefaultBodyLimit::max(5 * 1024 * 1024)),
        )
        .route(
            "/api/v2/media",
            post(media::upload).layer(DefaultBodyLimit::max(5 * 1024 * 1024)),
        )
        .route("/api/v1/preferences", get(preferences))
        .route("/api/v1/lists", get(empty_array))
        .route("/api/v2/search", get(search::search))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_token,
        ));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(middleware::from_fn_with_state(
            state.limiter.clone(),
            rate_limit_middleware,
        ))
        .layer(cors)
        .with_state(state)
}

/// Common pagination query. Bluesky cursors don't map onto Mastodon's
/// `max_id` paging, so only `limit` is honored.
#[derive(Debug, serde::Deserialize)]
pub struct PageParams {
    pub limit: Option<u32>,
}

impl PageParams {
    pub fn limit(&self, default: u32, max: u32) -> u32 {
        self.limit.unwrap_or(default).min(max)
    }
}
