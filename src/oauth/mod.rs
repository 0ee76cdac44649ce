//! OAuth 2.0 server with upstream session custody.
//!
//! The gateway is the OAuth provider toward Mastodon clients and itself a
//! client of the upstream AT Protocol session API. Every access token owns
//! a Bluesky session; token validation hands that session to the route
//! layer as a [`UserContext`].

pub mod routes;

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::atproto::types::AtpSession;
use crate::atproto::AtpClient;
use crate::cache::Cache;
use crate::error::{ApiError, ApiResult};
use crate::snowflake::SnowflakeGenerator;

pub const TOKEN_TTL_SECS: u64 = 604_800;
const CODE_TTL_SECS: u64 = 600;
const USED_CODE_TTL_SECS: u64 = 60;

pub const VALID_SCOPES: &[&str] = &["read", "write", "follow", "push"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OAuthApp {
    pub id: String,
    pub name: String,
    pub website: Option<String>,
    pub redirect_uri: String,
    pub client_id: String,
    pub client_secret: String,
    pub vapid_key: Option<String>,
}

/// Short-lived record between the login form and the token exchange. The
/// credentials stay inside this cache record for at most the ten-minute
/// code window and are replayed upstream exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    pub code: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub handle: String,
    pub password: String,
    pub created_at: i64,
    pub used: bool,
}

/// The custodied Bluesky session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamSession {
    pub access_token: String,
    pub refresh_token: String,
    pub did: String,
    pub handle: String,
    pub email: Option<String>,
    pub created_at: i64,
}

impl From<AtpSession> for UpstreamSession {
    fn from(session: AtpSession) -> Self {
        Self {
            access_token: session.access_jwt,
            refresh_token: session.refresh_jwt,
            did: session.did,
            handle: session.handle,
            email: session.email,
            created_at: Utc::now().timestamp(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,
    pub token_type: String,
    pub scope: String,
    pub created_at: i64,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
    pub session: UpstreamSession,
    pub did: String,
    pub handle: String,
}

fn default_expires_in() -> i64 {
    TOKEN_TTL_SECS as i64
}

/// The sole conduit from authentication to downstream upstream calls.
#[derive(Debug, Clone)]
pub struct UserContext {
    pub did: String,
    pub handle: String,
    pub session: UpstreamSession,
}

fn app_key(client_id: &str) -> String {
    format!("oauth:app:{client_id}")
}
fn code_key(code: &str) -> String {
    format!("oauth:code:{code}")
}
fn token_key(token: &str) -> String {
    format!("oauth:token:{token}")
}
fn session_key(did: &str) -> String {
    format!("session:{did}")
}

/// 256 random bits, base64url, padding stripped.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Parse a space-separated scope string. Empty input defaults to `read`;
/// an unknown scope fails validation naming the offender. Granular forms
/// (`read:statuses`) validate by their base scope.
pub fn parse_scopes(raw: &str) -> ApiResult<Vec<String>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(vec!["read".to_string()]);
    }
    let mut scopes = Vec::new();
    for scope in trimmed.split_whitespace() {
        let base = scope.split(':').next().unwrap_or(scope);
        if !VALID_SCOPES.contains(&base) {
            return Err(ApiError::validation(
                "scope",
                format!("unknown scope: {scope}"),
            ));
        }
        scopes.push(scope.to_string());
    }
    Ok(scopes)
}

#[derive(Clone)]
pub struct OAuthService {
    cache: Cache,
    atp: Arc<AtpClient>,
    snowflakes: Arc<SnowflakeGenerator>,
}

impl OAuthService {
    pub fn new(cache: Cache, atp: Arc<AtpClient>, snowflakes: Arc<SnowflakeGenerator>) -> Self {
        Self {
            cache,
            atp,
            snowflakes,
        }
    }

    // ── Application registry ──────────────────────────────────

    pub async fn register_app(
        &self,
        name: &str,
        redirect_uri: &str,
        scopes: &str,
        website: Option<&str>,
    ) -> ApiResult<OAuthApp> {
        if name.is_empty() {
            return Err(ApiError::validation("client_name", "must not be empty"));
        }
        if redirect_uri.is_empty() {
            return Err(ApiError::validation("redirect_uris", "must not be empty"));
        }
        parse_scopes(scopes)?;

        let app = OAuthApp {
            id: self.snowflakes.generate().await.to_string(),
            name: name.to_string(),
            website: website.map(String::from),
            redirect_uri: redirect_uri.to_string(),
            client_id: generate_secret(),
            client_secret: generate_secret(),
            vapid_key: None,
        };
        self.cache.set(&app_key(&app.client_id), &app, None).await?;
        tracing::info!(app = %app.name, client_id = %app.client_id, "registered oauth app");
        Ok(app)
    }

    pub async fn app(&self, client_id: &str) -> ApiResult<Option<OAuthApp>> {
        Ok(self.cache.get(&app_key(client_id)).await?)
    }

    // ── Authorization codes ───────────────────────────────────

    /// Validate the login against the upstream and mint a single-use code.
    /// Bad credentials surface as `Unauthorized`.
    pub async fn create_authorization_code(
        &self,
        client_id: &str,
        redirect_uri: &str,
        scope: &str,
        handle: &str,
        password: &str,
    ) -> ApiResult<String> {
        let app = self
            .app(client_id)
            .await?
            .ok_or_else(|| ApiError::validation("client_id", "unknown client"))?;
        if app.redirect_uri != redirect_uri {
            return Err(ApiError::validation("redirect_uri", "does not match the registered URI"));
        }
        parse_scopes(scope)?;

        self.atp
            .create_session(handle, password)
            .await
            .map_err(|e| {
                tracing::info!(handle, error = %e, "upstream login failed");
                ApiError::Unauthorized
            })?;

        let code = AuthorizationCode {
            code: generate_secret(),
            client_id: client_id.to_string(),
            redirect_uri: redirect_uri.to_string(),
            scope: scope.to_string(),
            handle: handle.to_string(),
            password: password.to_string(),
            created_at: Utc::now().timestamp(),
            used: false,
        };
        self.cache
            .set(&code_key(&code.code), &code, Some(CODE_TTL_SECS))
            .await?;
        Ok(code.code)
    }

    // ── Token grants ──────────────────────────────────────────

    /// `grant_type=authorization_code`. Every check failure is a 401: the
    /// code is single-use and all parameters must match the issuing app.
    pub async fn exchange_code(
        &self,
        code: &str,
        client_id: &str,
        client_secret: &str,
        redirect_uri: &str,
    ) -> ApiResult<TokenRecord> {
        let app = self.app(client_id).await?.ok_or(ApiError::Unauthorized)?;
        if !constant_time_eq(&app.client_secret, client_secret) {
            return Err(ApiError::Unauthorized);
        }

        let mut record: AuthorizationCode = self
            .cache
            .get(&code_key(code))
            .await?
            .ok_or(ApiError::Unauthorized)?;

        let now = Utc::now().timestamp();
        if record.used
            || record.client_id != client_id
            || record.redirect_uri != redirect_uri
            || now > record.created_at + CODE_TTL_SECS as i64
        {
            return Err(ApiError::Unauthorized);
        }

        // Burn the code before going upstream; the shortened TTL keeps the
        // tombstone around long enough to reject immediate replays.
        record.used = true;
        self.cache
            .set(&code_key(code), &record, Some(USED_CODE_TTL_SECS))
            .await?;

        let session = self
            .atp
            .create_session(&record.handle, &record.password)
            .await
            .map_err(|_| ApiError::Unauthorized)?;

        self.issue_token(&record.scope, session).await
    }

    /// `grant_type=password`: skip the code step entirely.
    pub async fn password_grant(
        &self,
        identifier: &str,
        password: &str,
        scope: &str,
    ) -> ApiResult<TokenRecord> {
        parse_scopes(scope)?;
        let session = self
            .atp
            .create_session(identifier, password)
            .await
            .map_err(|_| ApiError::Unauthorized)?;
        self.issue_token(scope, session).await
    }

    async fn issue_token(&self, scope: &str, session: AtpSession) -> ApiResult<TokenRecord> {
        let upstream = UpstreamSession::from(session);
        let record = TokenRecord {
            access_token: generate_secret(),
            token_type: "Bearer".to_string(),
            scope: if scope.trim().is_empty() {
                "read".to_string()
            } else {
                scope.to_string()
            },
            created_at: Utc::now().timestamp(),
            expires_in: TOKEN_TTL_SECS as i64,
            did: upstream.did.clone(),
            handle: upstream.handle.clone(),
            session: upstream.clone(),
        };

        self.cache
            .set(&token_key(&record.access_token), &record, Some(TOKEN_TTL_SECS))
            .await?;
        self.cache
            .set(&session_key(&record.did), &upstream, Some(TOKEN_TTL_SECS))
            .await?;
        tracing::info!(did = %record.did, "issued access token");
        Ok(record)
    }

    // ── Validation, refresh, revocation ───────────────────────

    pub async fn validate_token(&self, token: &str) -> ApiResult<UserContext> {
        let record: TokenRecord = self
            .cache
            .get(&token_key(token))
            .await?
            .ok_or(ApiError::Unauthorized)?;

        let now = Utc::now().timestamp();
        if now > record.created_at + record.expires_in {
            return Err(ApiError::Unauthorized);
        }

        Ok(UserContext {
            did: record.did,
            handle: record.handle,
            session: record.session,
        })
    }

    /// Rotate the custodied upstream session. The token itself keeps its
    /// remaining lifetime; a failed upstream refresh is terminal and the
    /// caller must re-authenticate.
    pub async fn refresh_session(&self, token: &str) -> ApiResult<UserContext> {
        let mut record: TokenRecord = self
            .cache
            .get(&token_key(token))
            .await?
            .ok_or(ApiError::Unauthorized)?;

        let refreshed = self
            .atp
            .refresh_session(&record.session.refresh_token)
            .await
            .map_err(|e| {
                tracing::info!(did = %record.did, error = %e, "upstream session refresh failed");
                ApiError::Unauthorized
            })?;

        let now = Utc::now().timestamp();
        let remaining = (record.created_at + record.expires_in - now).max(1) as u64;

        let upstream = UpstreamSession::from(refreshed);
        record.session = upstream.clone();
        record.did = upstream.did.clone();
        record.handle = upstream.handle.clone();

        self.cache
            .set(&token_key(token), &record, Some(remaining))
            .await?;
        self.cache
            .set(&session_key(&record.did), &upstream, Some(remaining))
            .await?;

        Ok(UserContext {
            did: record.did,
            handle: record.handle,
            session: record.session,
        })
    }

    pub async fn revoke(&self, token: &str) -> ApiResult<()> {
        self.cache.delete(&token_key(token)).await?;
        Ok(())
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> OAuthService {
        OAuthService::new(
            Cache::in_memory(),
            Arc::new(AtpClient::new("http://127.0.0.1:1", "http://127.0.0.1:1").unwrap()),
            Arc::new(SnowflakeGenerator::with_default_epoch()),
        )
    }

    fn session() -> AtpSession {
        AtpSession {
            did: "did:plc:alice".into(),
            handle: "alice.bsky.social".into(),
            email: None,
            access_jwt: "access".into(),
            refresh_jwt: "refresh".into(),
        }
    }

    #[test]
    fn secrets_are_43_chars_of_base64url() {
        let secret = generate_secret();
        assert_eq!(secret.len(), 43);
        assert!(secret
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_ne!(secret, generate_secret());
    }

    #[test]
    fn empty_scope_defaults_to_read() {
        assert_eq!(parse_scopes("").unwrap(), vec!["read"]);
        assert_eq!(parse_scopes("   ").unwrap(), vec!["read"]);
    }

    #[test]
    fn known_scopes_parse_including_granular_forms() {
        assert_eq!(
            parse_scopes("read write follow push").unwrap(),
            vec!["read", "write", "follow", "push"]
        );
        assert_eq!(
            parse_scopes("read:statuses write:media").unwrap(),
            vec!["read:statuses", "write:media"]
        );
    }

    #[test]
    fn unknown_scope_fails_naming_the_offender() {
        let err = parse_scopes("read admin:read").unwrap_err();
        let text = err.to_string();
        assert!(text.contains("admin:read"), "got: {text}");
    }

    #[tokio::test]
    async fn registration_stores_a_retrievable_app() {
        let svc = service();
        let app = svc
            .register_app("Test App", "x://cb", "read write", Some("https://example.com"))
            .await
            .unwrap();

        assert_eq!(app.client_id.len(), 43);
        assert_eq!(app.client_secret.len(), 43);

        let loaded = svc.app(&app.client_id).await.unwrap().unwrap();
        assert_eq!(loaded, app);
    }

    #[tokio::test]
    async fn registration_rejects_bad_input() {
        let svc = service();
        assert!(svc.register_app("", "x://cb", "read", None).await.is_err());
        assert!(svc.register_app("App", "", "read", None).await.is_err());
        assert!(svc
            .register_app("App", "x://cb", "sudo", None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn issued_tokens_validate_until_expiry() {
        let svc = service();
        let record = svc.issue_token("read", session()).await.unwrap();
        assert_eq!(record.token_type, "Bearer");
        assert_eq!(record.expires_in, 604_800);

        let ctx = svc.validate_token(&record.access_token).await.unwrap();
        assert_eq!(ctx.did, "did:plc:alice");
        assert_eq!(ctx.handle, "alice.bsky.social");
        assert_eq!(ctx.session.access_token, "access");
    }

    #[tokio::test]
    async fn expired_tokens_are_rejected() {
        let svc = service();
        let mut record = svc.issue_token("read", session()).await.unwrap();
        // Backdate past the 7-day window.
        record.created_at = Utc::now().timestamp() - 8 * 86_400;
        svc.cache
            .set(&token_key(&record.access_token), &record, None)
            .await
            .unwrap();

        let err = svc.validate_token(&record.access_token).await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
    }

    #[tokio::test]
    async fn just_inside_the_window_still_validates() {
        let svc = service();
        let mut record = svc.issue_token("read", session()).await.unwrap();
        record.created_at = Utc::now().timestamp() - (record.expires_in - 60);
        svc.cache
            .set(&token_key(&record.access_token), &record, None)
            .await
            .unwrap();

        assert!(svc.validate_token(&record.access_token).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_tokens_are_unauthorized() {
        let svc = service();
        let err = svc.validate_token("nope").await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let svc = service();
        let record = svc.issue_token("read", session()).await.unwrap();
        svc.revoke(&record.access_token).await.unwrap();
        svc.revoke(&record.access_token).await.unwrap();
        assert!(svc.validate_token(&record.access_token).await.is_err());
    }

    #[tokio::test]
    async fn refresh_replaces_the_custodied_session() {
        let stub = axum::Router::new().route(
            "/xrpc/com.atproto.server.refreshSession",
            axum::routing::post(|| async {
                axum::Json(serde_json::json!({
                    "did": "did:plc:alice",
                    "handle": "alice.bsky.social",
                    "accessJwt": "access-2",
                    "refreshJwt": "refresh-2"
                }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, stub).await.unwrap();
        });

        let svc = OAuthService::new(
            Cache::in_memory(),
            Arc::new(AtpClient::new(format!("http://{addr}"), format!("http://{addr}")).unwrap()),
            Arc::new(SnowflakeGenerator::with_default_epoch()),
        );

        let record = svc.issue_token("read", session()).await.unwrap();
        let ctx = svc.refresh_session(&record.access_token).await.unwrap();
        assert_eq!(ctx.session.access_token, "access-2");
        assert_eq!(ctx.session.refresh_token, "refresh-2");

        // The stored token record carries the rotated session.
        let again = svc.validate_token(&record.access_token).await.unwrap();
        assert_eq!(again.session.access_token, "access-2");
    }

    #[tokio::test]
    async fn refresh_failure_is_terminal_unauthorized() {
        let svc = service();
        let record = svc.issue_token("read", session()).await.unwrap();
        // The upstream is unreachable, so the refresh cannot succeed.
        let err = svc.refresh_session(&record.access_token).await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
    }

    #[tokio::test]
    async fn exchange_rejects_wrong_secret_and_replays() {
        let svc = service();
        let app = svc
            .register_app("App", "x://cb", "read", None)
            .await
            .unwrap();

        // Forge a code directly; the upstream is unreachable in unit tests.
        let code = AuthorizationCode {
            code: generate_secret(),
            client_id: app.client_id.clone(),
            redirect_uri: "x://cb".into(),
            scope: "read".into(),
            handle: "alice.bsky.social".into(),
            password: "hunter2".into(),
            created_at: Utc::now().timestamp(),
            used: true,
        };
        svc.cache
            .set(&code_key(&code.code), &code, Some(60))
            .await
            .unwrap();

        let err = svc
            .exchange_code(&code.code, &app.client_id, "wrong-secret", "x://cb")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));

        // Right secret, but the code is already used.
        let err = svc
            .exchange_code(&code.code, &app.client_id, &app.client_secret, "x://cb")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
    }
}
