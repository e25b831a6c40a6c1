//! OAuth2-style user session management
//!
//! [`UserSession`] owns the credentials for the active session: the
//! application's public key plus the access/refresh token pair obtained from
//! a login. Every outbound datastore request passes through the session for
//! bearer-token attachment, and an expired access token is silently
//! refreshed before dispatch. Concurrent callers that each discover an
//! expired token coalesce on a single in-flight refresh exchange so that
//! duplicate exchanges cannot invalidate each other's refresh tokens.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use serde_json::{Value, json};
use tokio::sync::Mutex;

use crate::error::Error;
use crate::options::RequestOptions;
use crate::transport::{Method, Transport, WireRequest, WireResponse};

/// Snapshot of the session's OAuth2 credentials.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub public_key: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A pre-obtained third-party login token. The provider handshake itself is
/// the application's job; the session only exchanges the token.
#[derive(Debug, Clone)]
pub enum Provider {
    Facebook { token: String },
    Twitter { token: String, secret: String },
}

impl Provider {
    fn name(&self) -> &'static str {
        match self {
            Provider::Facebook { .. } => "facebook",
            Provider::Twitter { .. } => "twitter",
        }
    }

    fn title_name(&self) -> &'static str {
        match self {
            Provider::Facebook { .. } => "Facebook",
            Provider::Twitter { .. } => "Twitter",
        }
    }

    fn grant_body(&self) -> Value {
        match self {
            Provider::Facebook { token } => json!({ "provider_token": token }),
            Provider::Twitter { token, secret } => json!({
                "provider_token": token,
                "provider_token_secret": secret,
            }),
        }
    }
}

#[derive(Debug, Default)]
struct TokenState {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

/// Holds OAuth2 credentials and performs the token grants.
pub struct UserSession {
    api_host: String,
    api_version: String,
    public_key: String,
    user_schema: String,
    user_id_field: String,
    password_field: String,
    transport: Arc<dyn Transport>,
    state: RwLock<TokenState>,
    /// Serializes refresh exchanges; waiters re-check the generation after
    /// acquiring so only one network exchange happens per expiry.
    refresh_gate: Mutex<()>,
    generation: AtomicU64,
}

impl UserSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        api_host: impl Into<String>,
        api_version: impl Into<String>,
        public_key: impl Into<String>,
        user_schema: impl Into<String>,
        user_id_field: impl Into<String>,
        password_field: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            api_host: api_host.into(),
            api_version: api_version.into(),
            public_key: public_key.into(),
            user_schema: user_schema.into(),
            user_id_field: user_id_field.into(),
            password_field: password_field.into(),
            transport,
            state: RwLock::new(TokenState::default()),
            refresh_gate: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn user_schema(&self) -> &str {
        &self.user_schema
    }

    pub fn user_id_field(&self) -> &str {
        &self.user_id_field
    }

    pub fn credentials(&self) -> Credentials {
        let state = self.state.read().unwrap();
        Credentials {
            public_key: self.public_key.clone(),
            access_token: state.access_token.clone(),
            refresh_token: state.refresh_token.clone(),
            expires_at: state.expires_at,
        }
    }

    /// True if a refresh token is stored or the access token is unexpired.
    ///
    /// A stored refresh token alone counts as authenticated because the next
    /// request will silently refresh; this is not a claim that the current
    /// access token is valid.
    pub fn is_authenticated(&self) -> bool {
        let state = self.state.read().unwrap();
        if state.refresh_token.is_some() {
            return true;
        }
        match (&state.access_token, state.expires_at) {
            (Some(_), Some(expires_at)) => expires_at > Utc::now(),
            _ => false,
        }
    }

    fn access_token_expired(&self) -> bool {
        let state = self.state.read().unwrap();
        match (&state.access_token, state.expires_at) {
            (Some(_), Some(expires_at)) => expires_at <= Utc::now(),
            (Some(_), None) => false,
            (None, _) => true,
        }
    }

    pub fn has_refresh_token(&self) -> bool {
        self.state.read().unwrap().refresh_token.is_some()
    }

    /// `Authorization` header value for the current access token, if any.
    pub fn authorization_header(&self) -> Option<String> {
        self.state
            .read()
            .unwrap()
            .access_token
            .as_ref()
            .map(|token| format!("Bearer {token}"))
    }

    /// Base headers attached to every request issued on this session.
    pub fn base_headers(&self) -> Vec<(String, String)> {
        vec![
            (
                "Accept".to_string(),
                format!(
                    "application/vnd.stratus+json; version={}",
                    self.api_version
                ),
            ),
            ("X-Stratus-Public-Key".to_string(), self.public_key.clone()),
        ]
    }

    pub fn base_url(&self, is_secure: bool) -> String {
        let scheme = if is_secure { "https" } else { "http" };
        format!("{scheme}://{}", self.api_host)
    }

    /// Refresh the access token ahead of a request when it has expired and a
    /// refresh token is available. Respects the caller's refresh opt-out.
    pub async fn ensure_valid_token(&self, options: &RequestOptions) -> Result<(), Error> {
        if !options.try_refresh_token {
            return Ok(());
        }
        if self.access_token_expired() && self.has_refresh_token() {
            self.refresh().await?;
        }
        Ok(())
    }

    /// Exchange a username and password for an access/refresh token pair.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
        options: &RequestOptions,
    ) -> Result<Credentials, Error> {
        let body = json!({
            (&self.user_id_field): username,
            (&self.password_field): password,
        });
        self.token_grant("accessToken", body, options).await
    }

    /// Forgot-password flow: log in with the emailed temporary password while
    /// setting a new one, invalidating both old passwords.
    pub async fn authenticate_with_temporary_password(
        &self,
        username: &str,
        temporary_password: &str,
        new_password: &str,
        options: &RequestOptions,
    ) -> Result<Credentials, Error> {
        let body = json!({
            (&self.user_id_field): username,
            (&self.password_field): temporary_password,
            (format!("new_{}", self.password_field)): new_password,
        });
        self.token_grant("accessToken", body, options).await
    }

    /// Exchange a pre-obtained third-party token for a session.
    pub async fn authenticate_with_provider(
        &self,
        provider: &Provider,
        options: &RequestOptions,
    ) -> Result<Credentials, Error> {
        self.token_grant(
            &format!("{}AccessToken", provider.name()),
            provider.grant_body(),
            options,
        )
        .await
    }

    /// Create a user account bound to a third-party provider token. The
    /// username comes from the provider profile unless one is supplied.
    /// Returns the created user object; logging in afterwards goes through
    /// [`Self::authenticate_with_provider`].
    pub async fn create_user_with_provider(
        &self,
        provider: &Provider,
        username: Option<&str>,
        options: &RequestOptions,
    ) -> Result<Value, Error> {
        let mut body = provider.grant_body();
        if let (Some(username), Value::Object(fields)) = (username, &mut body) {
            fields.insert(self.user_id_field.clone(), json!(username));
        }
        self.user_management_request(
            &format!("createUserWith{}", provider.title_name()),
            body,
            None,
            options,
        )
        .await
    }

    /// Link the logged-in user with a third-party provider account, so the
    /// provider token can be used for future logins. Requires an active
    /// session.
    pub async fn link_provider(
        &self,
        provider: &Provider,
        options: &RequestOptions,
    ) -> Result<Value, Error> {
        let authorization = self
            .authorization_header()
            .ok_or(Error::NoActiveSession)?;
        self.user_management_request(
            &format!("linkUserWith{}", provider.title_name()),
            provider.grant_body(),
            Some(authorization),
            options,
        )
        .await
    }

    /// Exchange the stored refresh token for a new access token.
    ///
    /// At most one exchange is in flight at a time; concurrent callers await
    /// the in-flight result instead of issuing duplicates.
    pub async fn refresh(&self) -> Result<Credentials, Error> {
        let observed = self.generation.load(Ordering::Acquire);
        let _gate = self.refresh_gate.lock().await;

        // Another caller refreshed while we waited on the gate.
        if self.generation.load(Ordering::Acquire) != observed {
            debug!("token refresh coalesced onto a completed exchange");
            return Ok(self.credentials());
        }

        let refresh_token = self
            .state
            .read()
            .unwrap()
            .refresh_token
            .clone()
            .ok_or(Error::NoActiveSession)?;

        debug!("refreshing access token for schema '{}'", self.user_schema);
        let body = json!({ "refresh_token": refresh_token });
        // The refresh exchange itself must never trigger another refresh.
        let options = RequestOptions::new().no_token_refresh();
        match self.token_grant("refreshToken", body, &options).await {
            Ok(credentials) => Ok(credentials),
            Err(err) if err.is_auth() => {
                warn!("refresh token exchange rejected");
                Err(Error::AuthenticationFailed)
            }
            Err(err) => Err(err),
        }
    }

    /// Invalidate the session remotely and clear local credentials. Local
    /// clearing is unconditional so a failed remote call cannot leave the
    /// client believing it is still authenticated.
    pub async fn logout(&self) -> Result<(), Error> {
        let authorization = self.authorization_header();
        {
            let mut state = self.state.write().unwrap();
            *state = TokenState::default();
        }
        self.generation.fetch_add(1, Ordering::AcqRel);

        let mut request = WireRequest::new(
            Method::Get,
            format!("{}/{}/logout", self.base_url(false), self.user_schema),
        );
        for (name, value) in self.base_headers() {
            request = request.header(name, value);
        }
        if let Some(authorization) = authorization {
            request = request.header("Authorization", authorization);
        }
        let response = self.transport.send(request).await?;
        if response.is_success() {
            Ok(())
        } else {
            Err(self.error_from_response("logout", &response))
        }
    }

    /// Kick off the forgot-password email for a user.
    pub async fn forgot_password(&self, username: &str) -> Result<(), Error> {
        let body = json!({ (&self.user_id_field): username });
        let request = self
            .endpoint_request(Method::Post, "forgotPassword", false)
            .json(body);
        let response = self.transport.send(request).await?;
        if response.is_success() {
            Ok(())
        } else {
            Err(self.error_from_response("forgotPassword", &response))
        }
    }

    /// Change the logged-in user's password, supplying the old one.
    pub async fn change_password(
        &self,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), Error> {
        let authorization = self
            .authorization_header()
            .ok_or(Error::NoActiveSession)?;
        let body = json!({
            "old": { (&self.password_field): old_password },
            "new": { (&self.password_field): new_password },
        });
        let request = self
            .endpoint_request(Method::Post, "resetPassword", true)
            .header("Authorization", authorization)
            .json(body);
        let response = self.transport.send(request).await?;
        if response.is_success() {
            Ok(())
        } else {
            Err(self.error_from_response("resetPassword", &response))
        }
    }

    fn endpoint_request(&self, method: Method, endpoint: &str, is_secure: bool) -> WireRequest {
        let mut request = WireRequest::new(
            method,
            format!(
                "{}/{}/{endpoint}",
                self.base_url(is_secure),
                self.user_schema
            ),
        );
        for (name, value) in self.base_headers() {
            request = request.header(name, value);
        }
        request
    }

    async fn token_grant(
        &self,
        endpoint: &str,
        body: Value,
        options: &RequestOptions,
    ) -> Result<Credentials, Error> {
        // Token grants always travel over https.
        let mut request = self.endpoint_request(Method::Post, endpoint, true).json(body);
        for (name, value) in &options.headers {
            request = request.header(name.clone(), value.clone());
        }

        let response = self.transport.send(request).await?;
        if !response.is_success() {
            return Err(self.grant_error(endpoint, &response));
        }

        let payload = response.json().ok_or_else(|| Error::Api {
            status: response.status,
            context: endpoint.to_string(),
            body: response.body.clone(),
        })?;
        self.store_tokens(&payload);
        Ok(self.credentials())
    }

    /// User-schema management calls that return an object rather than a
    /// token pair. Provider-token rejections map like grant failures.
    async fn user_management_request(
        &self,
        endpoint: &str,
        body: Value,
        authorization: Option<String>,
        options: &RequestOptions,
    ) -> Result<Value, Error> {
        let mut request = self.endpoint_request(Method::Post, endpoint, true).json(body);
        if let Some(authorization) = authorization {
            request = request.header("Authorization", authorization);
        }
        for (name, value) in &options.headers {
            request = request.header(name.clone(), value.clone());
        }

        let response = self.transport.send(request).await?;
        if !response.is_success() {
            return Err(self.grant_error(endpoint, &response));
        }
        Ok(response.json().unwrap_or(Value::Null))
    }

    fn store_tokens(&self, payload: &Value) {
        let access_token = payload
            .get("access_token")
            .and_then(Value::as_str)
            .map(String::from);
        let refresh_token = payload
            .get("refresh_token")
            .and_then(Value::as_str)
            .map(String::from);
        let expires_at = payload
            .get("expires_in")
            .and_then(Value::as_i64)
            .map(|seconds| Utc::now() + Duration::seconds(seconds));

        {
            let mut state = self.state.write().unwrap();
            state.access_token = access_token;
            // A grant that omits the refresh token keeps the existing one.
            if refresh_token.is_some() {
                state.refresh_token = refresh_token;
            }
            state.expires_at = expires_at;
        }
        self.generation.fetch_add(1, Ordering::AcqRel);
        debug!("stored new session tokens");
    }

    fn grant_error(&self, endpoint: &str, response: &WireResponse) -> Error {
        if response.status == 401 {
            let description = response
                .json()
                .and_then(|body| {
                    body.get("error_description")
                        .or_else(|| body.get("error"))
                        .and_then(Value::as_str)
                        .map(String::from)
                })
                .unwrap_or_default();
            if description.contains("temporary password") {
                return Error::TemporaryPasswordResetRequired;
            }
            return Error::InvalidCredentials;
        }
        self.error_from_response(endpoint, response)
    }

    fn error_from_response(&self, context: &str, response: &WireResponse) -> Error {
        Error::Api {
            status: response.status,
            context: context.to_string(),
            body: response.body.clone(),
        }
    }
}

#[cfg(test)]
impl UserSession {
    /// Seed the token state directly, bypassing the network grants.
    pub(crate) fn test_seed_tokens(
        &self,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) {
        let mut state = self.state.write().unwrap();
        state.access_token = access_token.map(String::from);
        state.refresh_token = refresh_token.map(String::from);
        state.expires_at = expires_at;
    }
}

impl std::fmt::Debug for UserSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserSession")
            .field("api_host", &self.api_host)
            .field("user_schema", &self.user_schema)
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{MockTransport, empty_response, json_response};

    fn session(transport: Arc<MockTransport>) -> UserSession {
        let _ = env_logger::builder().is_test(true).try_init();
        UserSession::new(
            "api.test.local",
            "0",
            "pubkey-123",
            "user",
            "username",
            "password",
            transport,
        )
    }

    fn token_body(access: &str, refresh: &str) -> Value {
        json!({
            "access_token": access,
            "refresh_token": refresh,
            "expires_in": 3600,
        })
    }

    fn seed_expired_session(session: &UserSession) {
        let mut state = session.state.write().unwrap();
        state.access_token = Some("stale".into());
        state.refresh_token = Some("refresh-1".into());
        state.expires_at = Some(Utc::now() - Duration::seconds(60));
    }

    #[tokio::test]
    async fn test_authenticate_stores_tokens() {
        let transport = Arc::new(MockTransport::new().stub(
            Method::Post,
            "/user/accessToken",
            vec![json_response(200, token_body("acc-1", "ref-1"))],
        ));
        let session = session(transport.clone());

        let credentials = session
            .authenticate("ada", "secret", &RequestOptions::new())
            .await
            .unwrap();
        assert_eq!(credentials.access_token.as_deref(), Some("acc-1"));
        assert_eq!(credentials.refresh_token.as_deref(), Some("ref-1"));
        assert!(session.is_authenticated());

        let requests = transport.requests();
        assert!(requests[0].url.starts_with("https://"));
        let sent = match requests[0].body.as_ref().unwrap() {
            crate::transport::RequestBody::Json(value) => value.clone(),
            _ => panic!("expected json body"),
        };
        assert_eq!(sent["username"], "ada");
        assert_eq!(sent["password"], "secret");
    }

    #[tokio::test]
    async fn test_invalid_credentials() {
        let transport = Arc::new(MockTransport::new().stub(
            Method::Post,
            "/user/accessToken",
            vec![json_response(401, json!({"error": "invalid_grant"}))],
        ));
        let session = session(transport);

        let err = session
            .authenticate("ada", "wrong", &RequestOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_temporary_password_reset_required() {
        let transport = Arc::new(MockTransport::new().stub(
            Method::Post,
            "/user/accessToken",
            vec![json_response(
                401,
                json!({"error_description": "temporary password reset required"}),
            )],
        ));
        let session = session(transport);

        let err = session
            .authenticate("ada", "temp123", &RequestOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TemporaryPasswordResetRequired));
    }

    #[tokio::test]
    async fn test_temporary_password_login_sends_new_password() {
        let transport = Arc::new(MockTransport::new().stub(
            Method::Post,
            "/user/accessToken",
            vec![json_response(200, token_body("acc-1", "ref-1"))],
        ));
        let session = session(transport.clone());

        session
            .authenticate_with_temporary_password("ada", "temp", "brand-new", &RequestOptions::new())
            .await
            .unwrap();

        let sent = match transport.requests()[0].body.as_ref().unwrap() {
            crate::transport::RequestBody::Json(value) => value.clone(),
            _ => panic!("expected json body"),
        };
        assert_eq!(sent["password"], "temp");
        assert_eq!(sent["new_password"], "brand-new");
    }

    #[tokio::test]
    async fn test_provider_login_hits_provider_endpoint() {
        let transport = Arc::new(MockTransport::new().stub(
            Method::Post,
            "/user/facebookAccessToken",
            vec![json_response(200, token_body("acc-1", "ref-1"))],
        ));
        let session = session(transport.clone());

        session
            .authenticate_with_provider(
                &Provider::Facebook {
                    token: "fb-token".into(),
                },
                &RequestOptions::new(),
            )
            .await
            .unwrap();
        assert_eq!(transport.calls("facebookAccessToken"), 1);
    }

    #[tokio::test]
    async fn test_create_user_with_provider_carries_token_and_username() {
        let transport = Arc::new(MockTransport::new().stub(
            Method::Post,
            "/user/createUserWithFacebook",
            vec![json_response(201, json!({"username": "ada", "user_id": "u1"}))],
        ));
        let session = session(transport.clone());

        let created = session
            .create_user_with_provider(
                &Provider::Facebook {
                    token: "fb-token".into(),
                },
                Some("ada"),
                &RequestOptions::new(),
            )
            .await
            .unwrap();
        assert_eq!(created["username"], "ada");

        let request = &transport.requests()[0];
        assert!(request.url.starts_with("https://"));
        let sent = match request.body.as_ref().unwrap() {
            crate::transport::RequestBody::Json(value) => value.clone(),
            _ => panic!("expected json body"),
        };
        assert_eq!(sent["provider_token"], "fb-token");
        assert_eq!(sent["username"], "ada");
    }

    #[tokio::test]
    async fn test_link_provider_requires_active_session() {
        let transport = Arc::new(MockTransport::new());
        let session = session(transport);

        let err = session
            .link_provider(
                &Provider::Twitter {
                    token: "tw-token".into(),
                    secret: "tw-secret".into(),
                },
                &RequestOptions::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoActiveSession));
    }

    #[tokio::test]
    async fn test_link_provider_sends_bearer_token() {
        let transport = Arc::new(MockTransport::new().stub(
            Method::Post,
            "/user/linkUserWithTwitter",
            vec![json_response(200, json!({"username": "ada"}))],
        ));
        let session = session(transport.clone());
        seed_expired_session(&session);

        session
            .link_provider(
                &Provider::Twitter {
                    token: "tw-token".into(),
                    secret: "tw-secret".into(),
                },
                &RequestOptions::new(),
            )
            .await
            .unwrap();

        let request = &transport.requests()[0];
        let authorization = request
            .headers
            .iter()
            .find(|(n, _)| n == "Authorization")
            .map(|(_, v)| v.as_str());
        assert_eq!(authorization, Some("Bearer stale"));
        let sent = match request.body.as_ref().unwrap() {
            crate::transport::RequestBody::Json(value) => value.clone(),
            _ => panic!("expected json body"),
        };
        assert_eq!(sent["provider_token_secret"], "tw-secret");
    }

    #[tokio::test]
    async fn test_refresh_without_session_fails() {
        let transport = Arc::new(MockTransport::new());
        let session = session(transport);
        let err = session.refresh().await.unwrap_err();
        assert!(matches!(err, Error::NoActiveSession));
    }

    #[tokio::test]
    async fn test_refresh_exchanges_refresh_token() {
        let transport = Arc::new(MockTransport::new().stub(
            Method::Post,
            "/user/refreshToken",
            vec![json_response(200, token_body("acc-2", "ref-2"))],
        ));
        let session = session(transport.clone());
        seed_expired_session(&session);

        let credentials = session.refresh().await.unwrap();
        assert_eq!(credentials.access_token.as_deref(), Some("acc-2"));
        assert_eq!(transport.calls("refreshToken"), 1);
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_coalesce_to_one_exchange() {
        let transport = Arc::new(MockTransport::new().stub(
            Method::Post,
            "/user/refreshToken",
            vec![json_response(200, token_body("acc-2", "ref-2"))],
        ));
        let session = Arc::new(session(transport.clone()));
        seed_expired_session(&session);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let session = session.clone();
            handles.push(tokio::spawn(async move {
                session
                    .ensure_valid_token(&RequestOptions::new())
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(transport.calls("refreshToken"), 1);
        assert_eq!(
            session.credentials().access_token.as_deref(),
            Some("acc-2")
        );
    }

    #[tokio::test]
    async fn test_refresh_rejection_maps_to_authentication_failed() {
        let transport = Arc::new(MockTransport::new().stub(
            Method::Post,
            "/user/refreshToken",
            vec![json_response(401, json!({"error": "invalid_grant"}))],
        ));
        let session = session(transport);
        seed_expired_session(&session);

        let err = session.refresh().await.unwrap_err();
        assert!(matches!(err, Error::AuthenticationFailed));
    }

    #[tokio::test]
    async fn test_is_authenticated_with_only_refresh_token() {
        let transport = Arc::new(MockTransport::new());
        let session = session(transport);
        {
            let mut state = session.state.write().unwrap();
            state.refresh_token = Some("ref-1".into());
        }
        // No valid access token, but a silent refresh is possible.
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn test_logout_clears_credentials_even_when_remote_fails() {
        let transport = Arc::new(MockTransport::new().stub(
            Method::Get,
            "/user/logout",
            vec![empty_response(500)],
        ));
        let session = session(transport);
        seed_expired_session(&session);

        let result = session.logout().await;
        assert!(result.is_err());
        assert!(!session.is_authenticated());
        assert!(session.authorization_header().is_none());
    }

    #[tokio::test]
    async fn test_refresh_opt_out_skips_preflight_refresh() {
        let transport = Arc::new(MockTransport::new());
        let session = session(transport.clone());
        seed_expired_session(&session);

        session
            .ensure_valid_token(&RequestOptions::new().no_token_refresh())
            .await
            .unwrap();
        assert_eq!(transport.calls("refreshToken"), 0);
    }
}
