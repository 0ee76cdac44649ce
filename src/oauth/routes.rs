use axum::extract::{Query, State};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::api::{AppState, FormOrJson};
use crate::error::{ApiError, ApiResult};
use crate::richtext::escape;

use super::OAuthApp;

const AUTHORIZE_FORM: &str = include_str!("authorize.html");

#[derive(Debug, Deserialize)]
pub struct RegisterAppRequest {
    pub client_name: String,
    pub redirect_uris: String,
    #[serde(default)]
    pub scopes: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
}

/// `POST /api/v1/apps`
pub async fn register_app(
    State(state): State<AppState>,
    FormOrJson(req): FormOrJson<RegisterAppRequest>,
) -> ApiResult<Json<OAuthApp>> {
    let app = state
        .oauth
        .register_app(
            &req.client_name,
            &req.redirect_uris,
            req.scopes.as_deref().unwrap_or("read"),
            req.website.as_deref(),
        )
        .await?;
    Ok(Json(app))
}

#[derive(Debug, Deserialize)]
pub struct AuthorizeParams {
    pub client_id: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub scope: Option<String>,
}

/// `GET /oauth/authorize`: render the login form with the request
/// parameters carried through as hidden fields.
pub async fn authorize_form(
    State(state): State<AppState>,
    Query(params): Query<AuthorizeParams>,
) -> ApiResult<Html<String>> {
    // Reject unknown clients before showing a login form for them.
    state
        .oauth
        .app(&params.client_id)
        .await?
        .ok_or_else(|| ApiError::validation("client_id", "unknown client"))?;

    let scope = params.scope.as_deref().unwrap_or("read");
    let page = AUTHORIZE_FORM
        .replace("{{client_id}}", &escape(&params.client_id))
        .replace("{{redirect_uri}}", &escape(&params.redirect_uri))
        .replace("{{scope}}", &escape(scope));
    Ok(Html(page))
}

#[derive(Debug, Deserialize)]
pub struct AuthorizeSubmission {
    pub client_id: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub scope: Option<String>,
    pub identifier: String,
    pub password: String,
}

const OOB_REDIRECT: &str = "urn:ietf:wg:oauth:2.0:oob";

/// `POST /oauth/authorize`: validate the credentials upstream, mint a
/// code, and send the user back to the client.
pub async fn authorize_submit(
    State(state): State<AppState>,
    FormOrJson(form): FormOrJson<AuthorizeSubmission>,
) -> ApiResult<Response> {
    let scope = form.scope.as_deref().unwrap_or("read");
    let code = state
        .oauth
        .create_authorization_code(
            &form.client_id,
            &form.redirect_uri,
            scope,
            &form.identifier,
            &form.password,
        )
        .await?;

    if form.redirect_uri == OOB_REDIRECT {
        let page = format!(
            "<!DOCTYPE html><html><head><meta charset=\"utf-8\">\
             <title>Authorization code</title></head><body>\
             <p>Copy this code into the application:</p>\
             <p><code>{}</code></p></body></html>",
            escape(&code)
        );
        return Ok(Html(page).into_response());
    }

    let mut target = url::Url::parse(&form.redirect_uri)
        .map_err(|_| ApiError::validation("redirect_uri", "not a valid URI"))?;
    target.query_pairs_mut().append_pair("code", &code);
    Ok(Redirect::to(target.as_str()).into_response())
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub scope: String,
    pub created_at: i64,
    pub expires_in: i64,
}

fn require<'a>(value: &'a Option<String>, field: &str) -> ApiResult<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| ApiError::validation(field, "is required"))
}

/// `POST /oauth/token`
pub async fn token(
    State(state): State<AppState>,
    FormOrJson(req): FormOrJson<TokenRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let record = match req.grant_type.as_str() {
        "authorization_code" => {
            state
                .oauth
                .exchange_code(
                    require(&req.code, "code")?,
                    require(&req.client_id, "client_id")?,
                    require(&req.client_secret, "client_secret")?,
                    require(&req.redirect_uri, "redirect_uri")?,
                )
                .await?
        }
        "password" => {
            state
                .oauth
                .password_grant(
                    require(&req.username, "username")?,
                    require(&req.password, "password")?,
                    req.scope.as_deref().unwrap_or("read"),
                )
                .await?
        }
        other => {
            return Err(ApiError::validation(
                "grant_type",
                format!("unsupported grant type: {other}"),
            ))
        }
    };

    Ok(Json(TokenResponse {
        access_token: record.access_token,
        token_type: record.token_type,
        scope: record.scope,
        created_at: record.created_at,
        expires_in: record.expires_in,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    #[serde(default)]
    pub token: Option<String>,
}

/// `POST /oauth/revoke`: 200 unconditionally, revocation is idempotent.
pub async fn revoke(
    State(state): State<AppState>,
    FormOrJson(req): FormOrJson<RevokeRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    if let Some(token) = &req.token {
        state.oauth.revoke(token).await?;
    }
    Ok(Json(json!({})))
}
