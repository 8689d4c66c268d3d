//! HTTP client for the identity service REST API.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Response, StatusCode};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::{
    auth::cookies::SessionCookies,
    config::{IdentityConfig, SessionCookieConfig},
    errors::Error,
    identity::{
        IdentityError, IdentityProvider, IdentityUser, SignUpOutcome,
        session::{self, StoredSession},
    },
};

/// Token grant returned by sign-in, sign-up and refresh
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    #[serde(default)]
    expires_at: Option<i64>,
    user: IdentityUser,
}

impl TokenResponse {
    fn to_session(&self, now: i64) -> StoredSession {
        StoredSession {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            expires_at: self.expires_at.unwrap_or(now + self.expires_in),
        }
    }
}

/// Sign-up answers with a full grant, or with the bare user when email confirmation is pending
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(TokenResponse),
    User(IdentityUser),
}

/// The service uses a few different error shapes depending on the endpoint
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    error_description: Option<String>,
    error_code: Option<String>,
    msg: Option<String>,
    message: Option<String>,
}

impl ErrorBody {
    fn describe(&self) -> String {
        self.error_description
            .as_deref()
            .or(self.msg.as_deref())
            .or(self.message.as_deref())
            .or(self.error.as_deref())
            .unwrap_or("no error description")
            .to_string()
    }

    fn is_already_registered(&self) -> bool {
        matches!(self.error_code.as_deref(), Some("user_already_exists" | "email_exists"))
            || self.describe().to_ascii_lowercase().contains("already registered")
    }
}

/// Identity service client, constructed once per process and shared across requests.
#[derive(Debug, Clone)]
pub struct HttpIdentityClient {
    http: reqwest::Client,
    auth_base: Url,
    anon_key: String,
    timeout: Duration,
    refresh_margin: Duration,
    cookie: SessionCookieConfig,
}

impl HttpIdentityClient {
    pub fn new(config: &IdentityConfig) -> Result<Self, Error> {
        let mut base = config.url()?.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let auth_base = base.join("auth/v1/").map_err(|e| Error::Configuration {
            message: format!("identity.url cannot be used as a base URL: {e}"),
        })?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Internal {
                operation: format!("create identity HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            auth_base,
            anon_key: config.anon_key()?.to_string(),
            timeout: config.request_timeout,
            refresh_margin: config.refresh_margin,
            cookie: config.session_cookie.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, IdentityError> {
        self.auth_base.join(path).map_err(|e| IdentityError::MalformedResponse {
            operation: format!("build URL for {path}"),
            message: e.to_string(),
        })
    }

    async fn send(&self, operation: &str, request: reqwest::RequestBuilder) -> Result<Response, IdentityError> {
        request.header("apikey", &self.anon_key).send().await.map_err(|source| {
            if source.is_timeout() {
                IdentityError::Timeout(self.timeout)
            } else {
                IdentityError::Transport {
                    operation: operation.to_string(),
                    source,
                }
            }
        })
    }

    async fn read_json<T: DeserializeOwned>(operation: &str, response: Response) -> Result<T, IdentityError> {
        let body = response.bytes().await.map_err(|source| IdentityError::Transport {
            operation: operation.to_string(),
            source,
        })?;
        serde_json::from_slice(&body).map_err(|e| IdentityError::MalformedResponse {
            operation: operation.to_string(),
            message: e.to_string(),
        })
    }

    async fn read_error(response: Response) -> (StatusCode, ErrorBody) {
        let status = response.status();
        let body = match response.bytes().await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(_) => ErrorBody::default(),
        };
        (status, body)
    }

    fn rejected(operation: &str, status: StatusCode, body: &ErrorBody) -> IdentityError {
        IdentityError::Rejected {
            operation: operation.to_string(),
            status: status.as_u16(),
            message: body.describe(),
        }
    }

    fn store_session(&self, cookies: &mut SessionCookies, session: &StoredSession) -> Result<(), IdentityError> {
        cookies.set(session::session_cookie(session, &self.cookie)?);
        Ok(())
    }

    fn clear_session(&self, cookies: &mut SessionCookies) -> Result<(), IdentityError> {
        cookies.remove(session::removal_cookie(&self.cookie)?);
        Ok(())
    }

    /// Like [`Self::send`], but the request may only use whatever is left until `deadline`.
    async fn send_before(&self, operation: &str, request: reqwest::RequestBuilder, deadline: Instant) -> Result<Response, IdentityError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(IdentityError::Timeout(self.timeout));
        }
        self.send(operation, request.timeout(remaining)).await
    }

    /// Exchange a refresh token for a new grant. `Ok(None)` means the refresh token is no longer valid.
    async fn refresh(&self, refresh_token: &str, deadline: Instant) -> Result<Option<TokenResponse>, IdentityError> {
        let operation = "refresh session";
        let mut url = self.endpoint("token")?;
        url.query_pairs_mut().append_pair("grant_type", "refresh_token");

        let response = self
            .send_before(operation, self.http.post(url).json(&json!({ "refresh_token": refresh_token })), deadline)
            .await?;

        match response.status() {
            status if status.is_success() => Ok(Some(Self::read_json(operation, response).await?)),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let (status, body) = Self::read_error(response).await;
                debug!(%status, reason = %body.describe(), "Refresh token rejected");
                Ok(None)
            }
            _ => {
                let (status, body) = Self::read_error(response).await;
                Err(Self::rejected(operation, status, &body))
            }
        }
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityClient {
    /// The refresh and the user lookup together finish within `identity.request_timeout`. A
    /// rotated session is stored before the lookup, so it survives a failed lookup.
    #[instrument(skip_all)]
    async fn current_user(&self, cookies: &mut SessionCookies) -> Result<Option<IdentityUser>, IdentityError> {
        let deadline = Instant::now() + self.timeout;
        let Some(cookie) = cookies.get(&self.cookie.name) else {
            return Ok(None);
        };

        let Some(mut stored) = StoredSession::decode(cookie.value()) else {
            warn!("Discarding undecodable session cookie");
            self.clear_session(cookies)?;
            return Ok(None);
        };

        let now = Utc::now().timestamp();
        if stored.expires_within(self.refresh_margin, now) {
            match self.refresh(&stored.refresh_token, deadline).await? {
                Some(grant) => {
                    stored = grant.to_session(now);
                    self.store_session(cookies, &stored)?;
                    debug!(user_id = %grant.user.id, "Session refreshed");
                }
                None => {
                    self.clear_session(cookies)?;
                    return Ok(None);
                }
            }
        }

        let operation = "get user";
        let response = self
            .send_before(
                operation,
                self.http.get(self.endpoint("user")?).bearer_auth(&stored.access_token),
                deadline,
            )
            .await?;

        match response.status() {
            status if status.is_success() => Ok(Some(Self::read_json(operation, response).await?)),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                debug!("Access token no longer accepted, clearing session");
                self.clear_session(cookies)?;
                Ok(None)
            }
            _ => {
                let (status, body) = Self::read_error(response).await;
                Err(Self::rejected(operation, status, &body))
            }
        }
    }

    #[instrument(skip_all)]
    async fn sign_in_with_password(&self, cookies: &mut SessionCookies, email: &str, password: &str) -> Result<IdentityUser, IdentityError> {
        let operation = "sign in";
        let mut url = self.endpoint("token")?;
        url.query_pairs_mut().append_pair("grant_type", "password");

        let response = self
            .send(operation, self.http.post(url).json(&json!({ "email": email, "password": password })))
            .await?;

        match response.status() {
            status if status.is_success() => {
                let grant: TokenResponse = Self::read_json(operation, response).await?;
                self.store_session(cookies, &grant.to_session(Utc::now().timestamp()))?;
                Ok(grant.user)
            }
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => Err(IdentityError::InvalidCredentials),
            _ => {
                let (status, body) = Self::read_error(response).await;
                Err(Self::rejected(operation, status, &body))
            }
        }
    }

    #[instrument(skip_all)]
    async fn sign_up(&self, cookies: &mut SessionCookies, email: &str, password: &str) -> Result<SignUpOutcome, IdentityError> {
        let operation = "sign up";
        let response = self
            .send(
                operation,
                self.http
                    .post(self.endpoint("signup")?)
                    .json(&json!({ "email": email, "password": password })),
            )
            .await?;

        if !response.status().is_success() {
            let (status, body) = Self::read_error(response).await;
            if body.is_already_registered() {
                return Err(IdentityError::AlreadyRegistered);
            }
            return Err(Self::rejected(operation, status, &body));
        }

        match Self::read_json::<SignUpResponse>(operation, response).await? {
            SignUpResponse::Session(grant) => {
                self.store_session(cookies, &grant.to_session(Utc::now().timestamp()))?;
                Ok(SignUpOutcome {
                    user: grant.user,
                    session_established: true,
                })
            }
            SignUpResponse::User(user) => Ok(SignUpOutcome {
                user,
                session_established: false,
            }),
        }
    }

    #[instrument(skip_all)]
    async fn sign_out(&self, cookies: &mut SessionCookies) -> Result<(), IdentityError> {
        let stored = cookies
            .get(&self.cookie.name)
            .and_then(|cookie| StoredSession::decode(cookie.value()));
        self.clear_session(cookies)?;

        let Some(stored) = stored else {
            return Ok(());
        };

        let operation = "sign out";
        let response = self
            .send(operation, self.http.post(self.endpoint("logout")?).bearer_auth(&stored.access_token))
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            // Session already gone on the service side
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => Ok(()),
            _ => {
                let (status, body) = Self::read_error(response).await;
                Err(Self::rejected(operation, status, &body))
            }
        }
    }
}
