//! Per-request configuration
//!
//! [`RequestOptions`] carries the knobs a caller can turn for a single
//! request: extra headers, transport security, automatic token refresh,
//! field projection and relationship expansion depth. Options are built
//! fresh per request and never mutated by the adapter.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::Error;
use crate::transport::WireResponse;

/// Deepest relationship expansion the datastore will inline.
pub const MAX_EXPAND_DEPTH: u8 = 3;

/// Cap on retry-block consultations for a single request, so a block that
/// always answers "retry" cannot loop forever.
pub const MAX_SERVICE_UNAVAILABLE_RETRIES: u32 = 3;

/// Caller-registered retry decision for 503 responses on custom endpoint
/// requests. The block is handed the response and the attempt number
/// (starting at 1) and answers whether the request should be re-issued
/// unmodified. The block owns any pacing; the adapter applies none.
#[derive(Clone)]
pub struct ServiceUnavailableRetry(Arc<dyn Fn(&WireResponse, u32) -> bool + Send + Sync>);

impl ServiceUnavailableRetry {
    pub fn new(decide: impl Fn(&WireResponse, u32) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(decide))
    }

    pub fn should_retry(&self, response: &WireResponse, attempt: u32) -> bool {
        (self.0)(response, attempt)
    }
}

impl fmt::Debug for ServiceUnavailableRetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ServiceUnavailableRetry")
    }
}

/// Options applied to a single datastore request.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// Extra headers attached verbatim to the request.
    pub headers: HashMap<String, String>,
    /// Use https for this request.
    pub is_secure: bool,
    /// Allow an automatic token refresh plus one retry on 401. Disabled for
    /// the refresh exchange itself to prevent recursion.
    pub try_refresh_token: bool,
    /// Restrict returned fields to this subset. Empty means all fields.
    pub field_projection: Vec<String>,
    /// Relationship expansion depth, 0..=3. Zero expands nothing.
    pub expand_depth: u8,
    /// Retry decision for 503 responses on custom endpoint requests.
    pub service_unavailable_retry: Option<ServiceUnavailableRetry>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            headers: HashMap::new(),
            is_secure: false,
            try_refresh_token: true,
            field_projection: Vec::new(),
            expand_depth: 0,
            service_unavailable_retry: None,
        }
    }
}

impl RequestOptions {
    /// Default options with no special settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Options carrying additional request headers.
    pub fn with_headers(headers: HashMap<String, String>) -> Self {
        Self {
            headers,
            ..Self::default()
        }
    }

    /// Options with https enabled.
    pub fn https() -> Self {
        Self {
            is_secure: true,
            ..Self::default()
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn secure(mut self, is_secure: bool) -> Self {
        self.is_secure = is_secure;
        self
    }

    /// Opt out of the automatic refresh-and-retry on 401.
    pub fn no_token_refresh(mut self) -> Self {
        self.try_refresh_token = false;
        self
    }

    /// Inline related objects up to `depth` relationship hops. Honored for
    /// logins, reads and queries.
    pub fn expand_depth(mut self, depth: u8) -> Result<Self, Error> {
        if depth > MAX_EXPAND_DEPTH {
            return Err(Error::InvalidOption {
                reason: format!("expand depth {depth} exceeds maximum {MAX_EXPAND_DEPTH}"),
            });
        }
        self.expand_depth = depth;
        Ok(self)
    }

    /// Return only the named fields.
    pub fn restrict_fields(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.field_projection = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Register a retry decision for 503 responses on custom endpoint
    /// requests.
    pub fn on_service_unavailable(mut self, retry: ServiceUnavailableRetry) -> Self {
        self.service_unavailable_retry = Some(retry);
        self
    }
}
