//! Direct REST interface to the datastore
//!
//! [`DataStore`] performs CRUD operations, queries and custom endpoint
//! calls against schema-scoped paths (`/<schema>` collections,
//! `/<schema>/<id>` resources). Every request is authenticated through the
//! session; a 401 triggers at most one coalesced token refresh followed by
//! exactly one retry of the original request. Rate-limit and 503 responses
//! are only retried when the caller registered a retry block.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};
use serde_json::{Value, json};

use crate::error::Error;
use crate::options::{MAX_SERVICE_UNAVAILABLE_RETRIES, RequestOptions};
use crate::query::Query;
use crate::session::UserSession;
use crate::transport::{Method, Transport, WireRequest, WireResponse};

/// Header carrying the relationship-expansion depth for reads and queries.
pub const HEADER_EXPAND: &str = "X-Stratus-Expand";
/// Header restricting returned fields to a comma-joined subset.
pub const HEADER_SELECT: &str = "X-Stratus-Select";
/// Header declaring nested relationship paths on a create.
pub const HEADER_RELATIONS: &str = "X-Stratus-Relations";
/// Dedupe key making the single post-refresh retry of a create safe. The
/// client-generated primary key is unique per object and already assigned
/// before commit, so it doubles as the idempotency token.
pub const HEADER_IDEMPOTENCY: &str = "X-Stratus-Idempotency-Key";

/// An arbitrary-verb request against a custom endpoint under `/api/`.
#[derive(Debug, Clone)]
pub struct CustomRequest {
    pub method: Method,
    pub endpoint: String,
    pub params: Vec<(String, String)>,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
}

impl CustomRequest {
    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::Get, endpoint, None)
    }

    pub fn post(endpoint: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(Method::Post, endpoint, Some(body.into()))
    }

    pub fn put(endpoint: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(Method::Put, endpoint, Some(body.into()))
    }

    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(Method::Delete, endpoint, None)
    }

    fn new(method: Method, endpoint: impl Into<String>, body: Option<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            params: Vec::new(),
            headers: HashMap::new(),
            body,
        }
    }

    /// Append a query string parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// The schema-scoped REST surface of the datastore.
#[derive(Clone)]
pub struct DataStore {
    session: Arc<UserSession>,
    transport: Arc<dyn Transport>,
}

impl DataStore {
    pub fn new(session: Arc<UserSession>, transport: Arc<dyn Transport>) -> Self {
        Self { session, transport }
    }

    pub fn session(&self) -> &Arc<UserSession> {
        &self.session
    }

    fn collection_url(&self, schema: &str, options: &RequestOptions) -> String {
        format!("{}/{schema}", self.session.base_url(options.is_secure))
    }

    fn resource_url(&self, schema: &str, id: &str, options: &RequestOptions) -> String {
        format!(
            "{}/{schema}/{}",
            self.session.base_url(options.is_secure),
            urlencoding::encode(id)
        )
    }

    /// Create a new object whose primary key follows the `<schema>_id`
    /// naming convention. Types with an overridden key field go through
    /// [`Self::create_with_key`].
    pub async fn create(
        &self,
        schema: &str,
        object: &Value,
        options: &RequestOptions,
    ) -> Result<Value, Error> {
        let conventional = format!("{schema}_id");
        self.create_with_key(schema, &conventional, object, options)
            .await
    }

    /// Create a new object. The caller must already have assigned a value
    /// under `primary_key_field`; the server response is returned for
    /// merging, with the client-side key as the permanent id. The key
    /// doubles as the idempotency token unless the caller set one.
    pub async fn create_with_key(
        &self,
        schema: &str,
        primary_key_field: &str,
        object: &Value,
        options: &RequestOptions,
    ) -> Result<Value, Error> {
        let mut request =
            WireRequest::new(Method::Post, self.collection_url(schema, options)).json(object.clone());
        if !options.headers.contains_key(HEADER_IDEMPOTENCY) {
            let id = object
                .get(primary_key_field)
                .and_then(Value::as_str)
                .ok_or_else(|| Error::MissingPrimaryKey {
                    schema: schema.to_string(),
                })?;
            request = request.header(HEADER_IDEMPOTENCY, id);
        }
        let response = self.execute(schema, None, request, options).await?;
        Ok(response.json().unwrap_or(Value::Null))
    }

    /// Read an object by primary key. A 404 maps to [`Error::ObjectNotFound`]
    /// so callers may probe for existence.
    pub async fn read(
        &self,
        schema: &str,
        id: &str,
        options: &RequestOptions,
    ) -> Result<Value, Error> {
        let mut request = WireRequest::new(Method::Get, self.resource_url(schema, id, options));
        request = Self::apply_read_options(request, options);
        let response = self.execute(schema, Some(id), request, options).await?;
        response.json().ok_or_else(|| Error::Api {
            status: response.status,
            context: schema.to_string(),
            body: response.body.clone(),
        })
    }

    /// Update an object with only its changed fields. The datastore applies
    /// the update all-or-nothing per object.
    pub async fn update(
        &self,
        schema: &str,
        id: &str,
        changed_fields: &Value,
        options: &RequestOptions,
    ) -> Result<Value, Error> {
        let request = WireRequest::new(Method::Put, self.resource_url(schema, id, options))
            .json(changed_fields.clone());
        let response = self.execute(schema, Some(id), request, options).await?;
        Ok(response.json().unwrap_or(Value::Null))
    }

    /// Delete an object. Local graph removal is the caller's job, and only
    /// after this reports success.
    pub async fn delete(
        &self,
        schema: &str,
        id: &str,
        options: &RequestOptions,
    ) -> Result<(), Error> {
        let request = WireRequest::new(Method::Delete, self.resource_url(schema, id, options));
        self.execute(schema, Some(id), request, options).await?;
        Ok(())
    }

    /// Atomically add a signed delta to a counter field. The arithmetic
    /// happens server side, so concurrent writers never lose updates the
    /// way a client-side read-modify-write would.
    pub async fn update_atomic_counter(
        &self,
        schema: &str,
        id: &str,
        field: &str,
        delta: i64,
        options: &RequestOptions,
    ) -> Result<Value, Error> {
        let body = json!({ (format!("{field}[inc]")): delta });
        self.update(schema, id, &body, options).await
    }

    /// Execute a query, returning the matching objects.
    pub async fn perform_query(
        &self,
        query: &Query,
        options: &RequestOptions,
    ) -> Result<Vec<Value>, Error> {
        let response = self.send_query(query, options, None).await?;
        match response.json() {
            Some(Value::Array(objects)) => Ok(objects),
            Some(other) => Err(Error::Api {
                status: response.status,
                context: query.schema().to_string(),
                body: other.to_string(),
            }),
            None => Ok(Vec::new()),
        }
    }

    /// Count the objects a query would return, without fetching them. Uses
    /// the identical filter/sort translation with a zero-width range; the
    /// cardinality comes back in the `Content-Range` total.
    pub async fn perform_count(
        &self,
        query: &Query,
        options: &RequestOptions,
    ) -> Result<u64, Error> {
        let response = self
            .send_query(query, options, Some("objects=0-0".to_string()))
            .await?;
        let total = response
            .header("Content-Range")
            .and_then(|range| range.rsplit_once('/'))
            .and_then(|(_, total)| total.parse::<u64>().ok());
        total.ok_or_else(|| Error::Api {
            status: response.status,
            context: query.schema().to_string(),
            body: "missing or malformed Content-Range header".to_string(),
        })
    }

    async fn send_query(
        &self,
        query: &Query,
        options: &RequestOptions,
        range_override: Option<String>,
    ) -> Result<WireResponse, Error> {
        let mut url = self.collection_url(query.schema(), options);
        let query_string = query.query_string();
        if !query_string.is_empty() {
            url = format!("{url}?{query_string}");
        }

        let mut request = WireRequest::new(Method::Get, url);
        match range_override.or_else(|| query.range_header()) {
            Some(range) => request = request.header("Range", range),
            None => {}
        }
        // The query's own expansion/projection win over the options'.
        if query.expansion_depth() > 0 {
            request = request.header(HEADER_EXPAND, query.expansion_depth().to_string());
        } else if options.expand_depth > 0 {
            request = request.header(HEADER_EXPAND, options.expand_depth.to_string());
        }
        if !query.field_projection().is_empty() {
            request = request.header(HEADER_SELECT, query.field_projection().join(","));
        } else if !options.field_projection.is_empty() {
            request = request.header(HEADER_SELECT, options.field_projection.join(","));
        }

        self.execute(query.schema(), None, request, options).await
    }

    /// Call a custom endpoint under `/api/`. On a 503 the caller-registered
    /// retry block is consulted; if it answers "retry" the request is
    /// re-issued unmodified. The block owns pacing; consultations are
    /// capped so a block that always retries cannot loop forever.
    pub async fn custom_request(
        &self,
        custom: &CustomRequest,
        options: &RequestOptions,
    ) -> Result<WireResponse, Error> {
        let mut url = format!(
            "{}/api/{}",
            self.session.base_url(options.is_secure),
            custom.endpoint
        );
        if !custom.params.is_empty() {
            let query_string = custom
                .params
                .iter()
                .map(|(key, value)| {
                    format!(
                        "{}={}",
                        urlencoding::encode(key),
                        urlencoding::encode(value)
                    )
                })
                .collect::<Vec<_>>()
                .join("&");
            url = format!("{url}?{query_string}");
        }

        let mut request = WireRequest::new(custom.method, url);
        for (name, value) in &custom.headers {
            request = request.header(name.clone(), value.clone());
        }
        if let Some(body) = &custom.body {
            request.body = Some(crate::transport::RequestBody::Text(body.clone()));
        }

        let mut attempt = 0u32;
        loop {
            let response = self.dispatch(request.clone(), options).await?;
            if response.status == 503 {
                attempt += 1;
                let retry = options
                    .service_unavailable_retry
                    .as_ref()
                    .is_some_and(|block| {
                        attempt <= MAX_SERVICE_UNAVAILABLE_RETRIES
                            && block.should_retry(&response, attempt)
                    });
                if retry {
                    warn!(
                        "custom endpoint '{}' unavailable, retry {attempt} requested by caller",
                        custom.endpoint
                    );
                    continue;
                }
                return Err(Error::ServiceUnavailable {
                    endpoint: custom.endpoint.clone(),
                });
            }
            if !response.is_success() {
                return Err(Error::Api {
                    status: response.status,
                    context: custom.endpoint.clone(),
                    body: response.body.clone(),
                });
            }
            return Ok(response);
        }
    }

    fn apply_read_options(mut request: WireRequest, options: &RequestOptions) -> WireRequest {
        if options.expand_depth > 0 {
            request = request.header(HEADER_EXPAND, options.expand_depth.to_string());
        }
        if !options.field_projection.is_empty() {
            request = request.header(HEADER_SELECT, options.field_projection.join(","));
        }
        request
    }

    /// Dispatch with token attachment and the 401/refresh/retry-once rule.
    /// Non-success statuses other than the handled 401 come back as `Ok`
    /// for the caller to map.
    async fn dispatch(
        &self,
        mut request: WireRequest,
        options: &RequestOptions,
    ) -> Result<WireResponse, Error> {
        self.session.ensure_valid_token(options).await?;

        for (name, value) in self.session.base_headers() {
            request.set_header(&name, value);
        }
        for (name, value) in &options.headers {
            request.set_header(name, value.clone());
        }
        if let Some(authorization) = self.session.authorization_header() {
            request.set_header("Authorization", authorization);
        }

        debug!("{} {}", request.method.as_str(), request.url);
        let response = self.transport.send(request.clone()).await?;

        if response.status == 401 && options.try_refresh_token && self.session.has_refresh_token()
        {
            warn!("request unauthorized, refreshing session and retrying once");
            self.session.refresh().await?;
            if let Some(authorization) = self.session.authorization_header() {
                request.set_header("Authorization", authorization);
            }
            let retried = self.transport.send(request).await?;
            if retried.status == 401 {
                return Err(Error::AuthenticationFailed);
            }
            return Ok(retried);
        }

        Ok(response)
    }

    /// Dispatch and map non-success statuses to the error taxonomy,
    /// carrying the schema and object id as context.
    async fn execute(
        &self,
        schema: &str,
        object_id: Option<&str>,
        request: WireRequest,
        options: &RequestOptions,
    ) -> Result<WireResponse, Error> {
        let response = self.dispatch(request, options).await?;
        if response.is_success() {
            return Ok(response);
        }
        Err(match response.status {
            404 => Error::ObjectNotFound {
                schema: schema.to_string(),
                object_id: object_id.unwrap_or_default().to_string(),
            },
            401 => Error::AuthenticationFailed,
            429 => Error::RateLimited {
                schema: schema.to_string(),
            },
            503 => Error::ServiceUnavailable {
                endpoint: schema.to_string(),
            },
            status => Error::Api {
                status,
                context: schema.to_string(),
                body: response.body.clone(),
            },
        })
    }
}
