use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::{fmt, sync::Arc};
use tracing::{debug, warn};
use url::Url;

use crate::types::ApiResponse;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Any status >= 300. Displays as the server-supplied message only.
    #[error("{message}")]
    Status { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl fmt::Display for QueryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryValue::Str(s) => f.write_str(s),
            QueryValue::Int(i) => write!(f, "{}", i),
            QueryValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::Str(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        QueryValue::Str(value)
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        QueryValue::Int(value)
    }
}

impl From<i32> for QueryValue {
    fn from(value: i32) -> Self {
        QueryValue::Int(value.into())
    }
}

impl From<u32> for QueryValue {
    fn from(value: u32) -> Self {
        QueryValue::Int(value.into())
    }
}

impl From<bool> for QueryValue {
    fn from(value: bool) -> Self {
        QueryValue::Bool(value)
    }
}

/// Ordered query mapping. `None` values are nil and never serialized.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query(Vec<(String, Option<QueryValue>)>);

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.0.push((key.into(), Some(value.into())));
        self
    }

    pub fn with_opt<V: Into<QueryValue>>(
        mut self,
        key: impl Into<String>,
        value: Option<V>,
    ) -> Self {
        self.0.push((key.into(), value.map(Into::into)));
        self
    }

    pub fn has_values(&self) -> bool {
        self.0.iter().any(|(_, v)| v.is_some())
    }
}

pub fn stringify(query: &Query) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in &query.0 {
        if let Some(value) = value {
            serializer.append_pair(key, &value.to_string());
        }
    }
    serializer.finish()
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormPart {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        mime: String,
        bytes: Vec<u8>,
    },
}

/// Multipart body, passed to the transport untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormData {
    parts: Vec<FormPart>,
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.parts.push(FormPart::Text {
            name: name.into(),
            value: value.into(),
        });
    }

    pub fn append_file(
        &mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        mime: impl Into<String>,
        bytes: Vec<u8>,
    ) {
        self.parts.push(FormPart::File {
            name: name.into(),
            file_name: file_name.into(),
            mime: mime.into(),
            bytes,
        });
    }

    pub fn parts(&self) -> &[FormPart] {
        &self.parts
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.parts.iter().find_map(|part| match part {
            FormPart::Text { name: n, value } if n == name => Some(value.as_str()),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Json(serde_json::Value),
    Multipart(FormData),
}

#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub query: Option<Query>,
    pub body: Option<Body>,
    pub notification_on_error: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::Get,
            query: None,
            body: None,
            notification_on_error: true,
        }
    }
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post(body: Body) -> Self {
        Self {
            method: Method::Post,
            body: Some(body),
            ..Self::default()
        }
    }

    pub fn query(mut self, query: Query) -> Self {
        self.query = Some(query);
        self
    }

    pub fn silent(mut self) -> Self {
        self.notification_on_error = false;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    SameOrigin,
    Cors,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Alternate API host for cross-origin deployments (host[:port], no scheme).
    pub api_host: Option<String>,
    /// Origin the site is served from.
    pub origin: Url,
}

impl ClientConfig {
    pub fn new(origin: Url, api_host: Option<String>) -> Self {
        Self {
            api_host: api_host.filter(|h| !h.is_empty()),
            origin,
        }
    }

    fn current_host(&self) -> String {
        let host = self.origin.host_str().unwrap_or_default();
        match self.origin.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PreparedBody {
    Text(String),
    Multipart(FormData),
}

#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: Url,
    pub mode: RequestMode,
    pub headers: Vec<(String, String)>,
    pub body: Option<PreparedBody>,
    pub credentials_include: bool,
}

impl PreparedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: PreparedRequest) -> Result<RawResponse, ClientError>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: PreparedRequest) -> Result<RawResponse, ClientError> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let mut builder = self.client.request(method, request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder = match request.body {
            Some(PreparedBody::Text(text)) => builder.body(text),
            Some(PreparedBody::Multipart(form)) => builder.multipart(to_multipart(form)?),
            None => builder,
        };

        let response = builder
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        Ok(RawResponse {
            status,
            body: body.to_vec(),
        })
    }
}

fn to_multipart(form: FormData) -> Result<reqwest::multipart::Form, ClientError> {
    let mut multipart = reqwest::multipart::Form::new();
    for part in form.parts {
        multipart = match part {
            FormPart::Text { name, value } => multipart.text(name, value),
            FormPart::File {
                name,
                file_name,
                mime,
                bytes,
            } => {
                let part = reqwest::multipart::Part::bytes(bytes)
                    .file_name(file_name)
                    .mime_str(&mime)
                    .map_err(|e| ClientError::Transport(e.to_string()))?;
                multipart.part(name, part)
            }
        };
    }
    Ok(multipart)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub title: String,
    pub description: String,
}

/// User-visible error toasts.
pub trait Notifier: Send + Sync {
    fn error(&self, notification: Notification);
}

pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn error(&self, notification: Notification) {
        warn!("{}: {}", notification.title, notification.description);
    }
}

#[derive(Clone)]
pub struct Client {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    notifier: Arc<dyn Notifier>,
}

impl Client {
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            transport,
            notifier,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Base URL and transport mode for `path`.
    pub fn resolve(&self, path: &str) -> (String, RequestMode) {
        if path.starts_with("https://") {
            let mode = match Url::parse(path) {
                Ok(target) if target.origin() == self.config.origin.origin() => {
                    RequestMode::SameOrigin
                }
                _ => RequestMode::Cors,
            };
            return (String::new(), mode);
        }

        if let Some(host) = &self.config.api_host {
            let base = format!("{}://{}/api", self.config.origin.scheme(), host);
            let mode = if *host != self.config.current_host() {
                RequestMode::Cors
            } else {
                RequestMode::SameOrigin
            };
            return (base, mode);
        }

        (
            format!("{}/api", self.config.origin.origin().ascii_serialization()),
            RequestMode::SameOrigin,
        )
    }

    pub fn prepare(
        &self,
        path: &str,
        options: &RequestOptions,
    ) -> Result<PreparedRequest, ClientError> {
        let (base, mode) = self.resolve(path);

        let mut headers = Vec::new();
        let body = match &options.body {
            Some(Body::Multipart(form)) => Some(PreparedBody::Multipart(form.clone())),
            Some(Body::Json(value)) => {
                headers.push(("content-type".to_string(), "application/json".to_string()));
                Some(PreparedBody::Text(value.to_string()))
            }
            None => None,
        };

        let query_string = match &options.query {
            Some(query) if query.has_values() => format!("?{}", stringify(query)),
            _ => String::new(),
        };

        let raw = format!("{}{}{}", base, path, query_string);
        let url = Url::parse(&raw).map_err(|e| ClientError::InvalidUrl(format!("{}: {}", raw, e)))?;

        Ok(PreparedRequest {
            method: options.method,
            url,
            mode,
            headers,
            body,
            credentials_include: true,
        })
    }

    pub async fn request<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse<T>, ClientError> {
        let prepared = self.prepare(path, &options)?;
        debug!(
            "{} {} ({:?})",
            prepared.method.as_str(),
            prepared.url,
            prepared.mode
        );

        let response = self.transport.send(prepared).await?;
        let json: serde_json::Value = serde_json::from_slice(&response.body)
            .map_err(|e| ClientError::Decode(e.to_string()))?;

        if response.status >= 300 {
            let message = json
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| format!("request failed with status {}", response.status));
            if options.notification_on_error {
                self.notifier.error(Notification {
                    title: format!("Request error: {}", response.status),
                    description: message.clone(),
                });
            }
            return Err(ClientError::Status {
                status: response.status,
                message,
            });
        }

        serde_json::from_value(json).map_err(|e| ClientError::Decode(e.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned responses in order and records each request.
    #[derive(Default)]
    pub struct FakeTransport {
        pub responses: Mutex<VecDeque<RawResponse>>,
        pub requests: Mutex<Vec<PreparedRequest>>,
        /// Leave requests pending forever once the canned responses run out.
        pub hang: bool,
    }

    impl FakeTransport {
        pub fn with(responses: Vec<(u16, serde_json::Value)>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(
                    responses
                        .into_iter()
                        .map(|(status, body)| RawResponse {
                            status,
                            body: body.to_string().into_bytes(),
                        })
                        .collect(),
                ),
                requests: Mutex::new(Vec::new()),
                hang: false,
            })
        }

        pub fn hanging(responses: Vec<(u16, serde_json::Value)>) -> Arc<Self> {
            let mut transport = Self::with(responses);
            if let Some(inner) = Arc::get_mut(&mut transport) {
                inner.hang = true;
            }
            transport
        }

        pub fn requests(&self) -> Vec<PreparedRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn send(&self, request: PreparedRequest) -> Result<RawResponse, ClientError> {
            self.requests.lock().unwrap().push(request);
            let next = self.responses.lock().unwrap().pop_front();
            if next.is_none() && self.hang {
                futures::future::pending::<()>().await;
            }
            next.ok_or_else(|| ClientError::Transport("no canned response".to_string()))
        }
    }

    #[derive(Default)]
    pub struct RecordingNotifier {
        pub seen: Mutex<Vec<Notification>>,
    }

    impl Notifier for RecordingNotifier {
        fn error(&self, notification: Notification) {
            self.seen.lock().unwrap().push(notification);
        }
    }

    pub fn client(transport: Arc<FakeTransport>) -> (Client, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        let config = ClientConfig::new(Url::parse("https://blog.example.com").unwrap(), None);
        (Client::new(config, transport, notifier.clone()), notifier)
    }
}
