//! Top-level client facade
//!
//! [`Client`] bundles a configured [`UserSession`], a transport, and the
//! registered entity schemas into one handle. Most applications build one
//! client at startup, install it as the process-wide default, and hand out
//! [`DataStore`] and [`GraphStore`] views from it.

use std::sync::{Arc, RwLock};

use log::info;
use serde_json::Value;

use crate::datastore::DataStore;
use crate::error::Error;
use crate::graph::GraphStore;
use crate::options::RequestOptions;
use crate::schema::SchemaRegistry;
use crate::session::{Credentials, Provider, UserSession};
use crate::transport::{HttpTransport, Transport};

pub const DEFAULT_API_HOST: &str = "api.stratus-data.com";
pub const DEFAULT_USER_SCHEMA: &str = "user";
pub const DEFAULT_USER_ID_FIELD: &str = "username";
pub const DEFAULT_PASSWORD_FIELD: &str = "password";

/// Process-wide default client, installed explicitly by the application.
static DEFAULT_CLIENT: RwLock<Option<Arc<Client>>> = RwLock::new(None);

/// Connection settings for a [`Client`]. The defaults cover everything but
/// the API version and public key.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_version: String,
    pub public_key: String,
    pub api_host: String,
    pub user_schema: String,
    pub user_id_field: String,
    pub password_field: String,
}

impl ClientConfig {
    pub fn new(api_version: impl Into<String>, public_key: impl Into<String>) -> Self {
        Self {
            api_version: api_version.into(),
            public_key: public_key.into(),
            api_host: DEFAULT_API_HOST.to_string(),
            user_schema: DEFAULT_USER_SCHEMA.to_string(),
            user_id_field: DEFAULT_USER_ID_FIELD.to_string(),
            password_field: DEFAULT_PASSWORD_FIELD.to_string(),
        }
    }

    pub fn api_host(mut self, host: impl Into<String>) -> Self {
        self.api_host = host.into();
        self
    }

    pub fn user_schema(mut self, schema: impl Into<String>) -> Self {
        self.user_schema = schema.into();
        self
    }

    pub fn user_id_field(mut self, field: impl Into<String>) -> Self {
        self.user_id_field = field.into();
        self
    }

    pub fn password_field(mut self, field: impl Into<String>) -> Self {
        self.password_field = field.into();
        self
    }
}

/// One configured connection to a datastore application.
pub struct Client {
    session: Arc<UserSession>,
    transport: Arc<dyn Transport>,
    registry: Arc<SchemaRegistry>,
}

impl Client {
    /// Build a client against the public API host with default user-schema
    /// settings.
    pub fn new(api_version: impl Into<String>, public_key: impl Into<String>) -> Self {
        Self::with_transport(
            ClientConfig::new(api_version, public_key),
            Arc::new(HttpTransport::new()),
        )
    }

    pub fn with_config(config: ClientConfig) -> Self {
        Self::with_transport(config, Arc::new(HttpTransport::new()))
    }

    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        info!(
            "initializing client for host '{}' api version {}",
            config.api_host, config.api_version
        );
        let session = Arc::new(UserSession::new(
            config.api_host,
            config.api_version,
            config.public_key,
            config.user_schema,
            config.user_id_field,
            config.password_field,
            transport.clone(),
        ));
        Self {
            session,
            transport,
            registry: Arc::new(SchemaRegistry::new()),
        }
    }

    /// Attach the entity schemas this client's graph store serves.
    pub fn with_schemas(mut self, registry: SchemaRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn session(&self) -> &Arc<UserSession> {
        &self.session
    }

    pub fn schemas(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// A REST-level view for key/value and query access.
    pub fn datastore(&self) -> DataStore {
        DataStore::new(self.session.clone(), self.transport.clone())
    }

    /// A graph-level view over the registered schemas.
    pub fn graph_store(&self) -> GraphStore {
        GraphStore::new(self.registry.clone(), self.datastore())
    }

    /// Install a client as the process-wide default.
    pub fn set_default(client: Arc<Client>) {
        *DEFAULT_CLIENT.write().unwrap() = Some(client);
    }

    /// The installed default client, if any. There is no implicit default;
    /// until [`Client::set_default`] runs this returns `None`.
    pub fn default_client() -> Option<Arc<Client>> {
        DEFAULT_CLIENT.read().unwrap().clone()
    }

    pub fn reset_default() {
        *DEFAULT_CLIENT.write().unwrap() = None;
    }

    // Session conveniences. Each delegates to the session so callers holding
    // only the client never reach through it for the common flows.

    pub async fn login(&self, username: &str, password: &str) -> Result<Credentials, Error> {
        self.session
            .authenticate(username, password, &RequestOptions::new())
            .await
    }

    /// Complete the forgot-password flow: log in with the emailed temporary
    /// password and set the real one in the same exchange.
    pub async fn login_with_temporary_password(
        &self,
        username: &str,
        temporary_password: &str,
        new_password: &str,
    ) -> Result<Credentials, Error> {
        self.session
            .authenticate_with_temporary_password(
                username,
                temporary_password,
                new_password,
                &RequestOptions::new(),
            )
            .await
    }

    pub async fn login_with_provider(&self, provider: &Provider) -> Result<Credentials, Error> {
        self.session
            .authenticate_with_provider(provider, &RequestOptions::new())
            .await
    }

    pub async fn create_user_with_provider(
        &self,
        provider: &Provider,
        username: Option<&str>,
    ) -> Result<Value, Error> {
        self.session
            .create_user_with_provider(provider, username, &RequestOptions::new())
            .await
    }

    pub async fn link_provider(&self, provider: &Provider) -> Result<Value, Error> {
        self.session
            .link_provider(provider, &RequestOptions::new())
            .await
    }

    /// Fetch the full user object for the session's logged-in user.
    pub async fn logged_in_user(&self, options: &RequestOptions) -> Result<Value, Error> {
        self.datastore()
            .read(self.session.user_schema(), "loggedInUser", options)
            .await
    }

    pub fn is_logged_in(&self) -> bool {
        self.session.is_authenticated()
    }

    pub fn is_logged_out(&self) -> bool {
        !self.is_logged_in()
    }

    pub async fn refresh_session(&self) -> Result<Credentials, Error> {
        self.session.refresh().await
    }

    pub async fn logout(&self) -> Result<(), Error> {
        self.session.logout().await
    }

    pub async fn forgot_password(&self, username: &str) -> Result<(), Error> {
        self.session.forgot_password(username).await
    }

    pub async fn change_password(
        &self,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), Error> {
        self.session.change_password(old_password, new_password).await
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("public_key", &self.session.public_key())
            .field("user_schema", &self.session.user_schema())
            .field("logged_in", &self.is_logged_in())
            .finish()
    }
}
