//! Transport seam between the datastore layer and HTTP
//!
//! All requests flow through the [`Transport`] trait so the adapter logic can
//! be exercised against a scripted double in tests. The production
//! implementation wraps a shared `reqwest::Client`; connection reuse and TLS
//! are reqwest's concern.

use async_trait::async_trait;
use log::debug;
use serde_json::Value;

use crate::error::Error;

/// HTTP method subset used by the datastore API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

/// Request body forms accepted by the datastore.
///
/// CRUD operations carry JSON field maps; custom endpoint requests may carry
/// a raw text body.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(Value),
    Text(String),
}

/// A fully assembled outbound request.
#[derive(Debug, Clone)]
pub struct WireRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

impl WireRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    /// Replace or insert a header, used when re-issuing a request with a
    /// fresh bearer token.
    pub fn set_header(&mut self, name: &str, value: String) {
        if let Some(slot) = self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            slot.1 = value;
        } else {
            self.headers.push((name.to_string(), value));
        }
    }
}

/// A raw response from the datastore.
#[derive(Debug, Clone)]
pub struct WireResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl WireResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Parse the body as JSON, if there is one.
    pub fn json(&self) -> Option<Value> {
        if self.body.is_empty() {
            return None;
        }
        serde_json::from_str(&self.body).ok()
    }
}

/// Dispatches assembled requests to the datastore.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: WireRequest) -> Result<WireResponse, Error>;
}

/// Production transport over a shared `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: WireRequest) -> Result<WireResponse, Error> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
            Method::Put => self.client.put(&request.url),
            Method::Delete => self.client.delete(&request.url),
        };

        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        builder = match request.body {
            Some(RequestBody::Json(value)) => builder.json(&value),
            Some(RequestBody::Text(text)) => builder.body(text),
            None => builder,
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.text().await?;

        debug!("response status {status} ({} bytes)", body.len());
        Ok(WireResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted transport double used by the unit tests.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct Rule {
        method: Method,
        path_fragment: String,
        responses: Mutex<VecDeque<WireResponse>>,
        /// Last response is repeated once the queue is drained.
        last: WireResponse,
    }

    /// Route-matched transport double. Each stubbed route holds a response
    /// queue; the final response repeats once the queue runs dry, which keeps
    /// concurrency tests deterministic.
    #[derive(Default)]
    pub(crate) struct MockTransport {
        rules: Vec<Rule>,
        log: Mutex<Vec<WireRequest>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn stub(
            mut self,
            method: Method,
            path_fragment: &str,
            responses: Vec<WireResponse>,
        ) -> Self {
            assert!(!responses.is_empty(), "stub needs at least one response");
            let last = responses.last().cloned().unwrap();
            self.rules.push(Rule {
                method,
                path_fragment: path_fragment.to_string(),
                responses: Mutex::new(responses.into()),
                last,
            });
            self
        }

        /// Number of dispatched requests whose URL contains the fragment.
        pub fn calls(&self, path_fragment: &str) -> usize {
            self.log
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.url.contains(path_fragment))
                .count()
        }

        /// Clone of every dispatched request, in dispatch order.
        pub fn requests(&self) -> Vec<WireRequest> {
            self.log.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&self, request: WireRequest) -> Result<WireResponse, Error> {
            self.log.lock().unwrap().push(request.clone());
            for rule in &self.rules {
                if rule.method == request.method && request.url.contains(&rule.path_fragment) {
                    let next = rule.responses.lock().unwrap().pop_front();
                    return Ok(next.unwrap_or_else(|| rule.last.clone()));
                }
            }
            panic!(
                "no stub for {} {}",
                request.method.as_str(),
                request.url
            );
        }
    }

    pub(crate) fn json_response(status: u16, body: Value) -> WireResponse {
        WireResponse {
            status,
            headers: vec![("content-type".into(), "application/json".into())],
            body: body.to_string(),
        }
    }

    pub(crate) fn empty_response(status: u16) -> WireResponse {
        WireResponse {
            status,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub(crate) fn response_with_header(status: u16, name: &str, value: &str) -> WireResponse {
        WireResponse {
            status,
            headers: vec![(name.to_string(), value.to_string())],
            body: String::new(),
        }
    }
}
