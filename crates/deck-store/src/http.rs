//! HTTP adapters for the Gateway admin API and the control-plane API
//!
//! Both APIs share the entity model and URL layout below their base path, so a
//! single adapter serves both; [`HttpStoreConfig`] selects the base path and
//! the authentication header. Transient failures are retried here with
//! exponential backoff. Callers above this layer never retry.

use std::sync::OnceLock;
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use reqwest::Method;
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::kind::{EntityKind, SubResource};
use crate::record::EntityRecord;
use crate::store::{EntityStore, Scope, StoreRole};

const GATEWAY_TOKEN_HEADER: &str = "kong-admin-token";

/// Connection settings for one store
#[derive(Debug, Clone)]
pub struct HttpStoreConfig {
    /// Which API this is
    pub role: StoreRole,
    /// Admin API address or control-plane API host
    pub base_url: String,
    /// Control plane id (control plane only)
    pub control_plane_id: Option<String>,
    /// Admin token or personal access token
    pub token: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
    /// Total time spent retrying one request
    pub retry_budget: Duration,
    /// First retry delay
    pub retry_initial_interval: Duration,
    /// Page size requested when listing
    pub page_size: usize,
}

impl HttpStoreConfig {
    /// Settings for a Gateway admin API such as `http://localhost:8001`
    pub fn gateway(base_url: impl Into<String>) -> Self {
        Self {
            role: StoreRole::Gateway,
            base_url: base_url.into(),
            control_plane_id: None,
            token: None,
            timeout: Duration::from_secs(30),
            retry_budget: Duration::from_secs(30),
            retry_initial_interval: Duration::from_millis(250),
            page_size: 1000,
        }
    }

    /// Settings for a control plane reachable under `base_url`
    pub fn control_plane(base_url: impl Into<String>, control_plane_id: impl Into<String>) -> Self {
        Self {
            role: StoreRole::ControlPlane,
            control_plane_id: Some(control_plane_id.into()),
            page_size: 100,
            ..Self::gateway(base_url)
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets how long transient failures are retried
    #[must_use]
    pub fn with_retry(mut self, budget: Duration, initial_interval: Duration) -> Self {
        self.retry_budget = budget;
        self.retry_initial_interval = initial_interval;
        self
    }

    /// URL prefix under which entity collections live
    fn entity_base(&self) -> Result<String> {
        let root = self.base_url.trim_end_matches('/');
        match self.role {
            StoreRole::Gateway => Ok(root.to_string()),
            StoreRole::ControlPlane => {
                let id = self.control_plane_id.as_deref().ok_or_else(|| {
                    Error::Config("control plane id is required".to_string())
                })?;
                Ok(format!("{root}/v2/control-planes/{id}/core-entities"))
            }
        }
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let Some(token) = &self.token else {
            return Ok(headers);
        };
        let (name, value) = match self.role {
            StoreRole::Gateway => (
                HeaderName::from_static(GATEWAY_TOKEN_HEADER),
                HeaderValue::from_str(token),
            ),
            StoreRole::ControlPlane => (AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}"))),
        };
        let mut value = value.map_err(|e| Error::Config(format!("invalid token: {e}")))?;
        value.set_sensitive(true);
        headers.insert(name, value);
        Ok(headers)
    }
}

/// An [`EntityStore`] backed by a REST API
#[derive(Debug)]
pub struct HttpStore {
    config: HttpStoreConfig,
    client: Client,
    entity_base: String,
    label: String,
    dbless: OnceLock<bool>,
}

impl HttpStore {
    /// Build an adapter; no request is made until the first call
    pub fn new(config: HttpStoreConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(config.headers()?)
            .build()?;
        let entity_base = config.entity_base()?;
        let label = config.role.to_string();
        Ok(Self {
            config,
            client,
            entity_base,
            label,
            dbless: OnceLock::new(),
        })
    }

    pub fn role(&self) -> StoreRole {
        self.config.role
    }

    fn collection_url(&self, kind: EntityKind, scope: Option<&Scope>) -> String {
        match scope {
            Some(scope) => format!(
                "{}/{}/{}/{}",
                self.entity_base,
                scope.parent.plural(),
                scope.id_or_name,
                kind.plural()
            ),
            None => format!("{}/{}", self.entity_base, kind.plural()),
        }
    }

    fn entity_url(&self, kind: EntityKind, id_or_name: &str) -> String {
        format!("{}/{}/{}", self.entity_base, kind.plural(), id_or_name)
    }

    fn nested_url(&self, parent: EntityKind, parent_id: &str, sub: SubResource) -> String {
        format!(
            "{}/{}/{}/{}",
            self.entity_base,
            parent.plural(),
            parent_id,
            sub.path()
        )
    }

    /// Send one request, retrying transport errors, 429 and 5xx
    fn send(&self, method: Method, url: &str, body: Option<&Value>) -> Result<Response> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.config.retry_initial_interval)
            .with_max_elapsed_time(Some(self.config.retry_budget))
            .build();

        let op = || {
            tracing::debug!("{} {}", method, url);
            let mut request = self.client.request(method.clone(), url);
            if let Some(body) = body {
                request = request.json(body);
            }
            let response = request
                .send()
                .map_err(|e| backoff::Error::transient(Error::Transport(e)))?;
            if response.status().is_success() {
                return Ok(response);
            }
            let error = api_error(response);
            if error.is_transient() {
                tracing::debug!("Transient failure on {} {}: {}", method, url, error);
                Err(backoff::Error::transient(error))
            } else {
                Err(backoff::Error::permanent(error))
            }
        };

        backoff::retry(policy, op).map_err(|e| match e {
            backoff::Error::Permanent(err) => err,
            backoff::Error::Transient { err, .. } => err,
        })
    }

    fn send_json(&self, method: Method, url: &str, body: Option<&Value>) -> Result<Value> {
        let response = self.send(method, url, body)?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        let text = response.text()?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    fn send_record(&self, method: Method, url: &str, body: Option<&Value>) -> Result<EntityRecord> {
        match self.send_json(method, url, body)? {
            Value::Object(record) => Ok(record),
            other => Err(Error::InvalidResponse(format!(
                "expected an entity object from {url}, got {other}"
            ))),
        }
    }

    /// Follow `next` links or `offset` tokens until the collection is exhausted
    fn list_pages(&self, url: &str) -> Result<Vec<EntityRecord>> {
        let mut records = Vec::new();
        let mut next = Some(format!("{url}?size={}", self.config.page_size));

        while let Some(page_url) = next.take() {
            let page = self.send_json(Method::GET, &page_url, None)?;
            let data = page
                .get("data")
                .and_then(Value::as_array)
                .ok_or_else(|| Error::InvalidResponse(format!("no data array at {page_url}")))?;
            records.extend(data.iter().filter_map(|item| item.as_object().cloned()));

            next = match page.get("next").and_then(Value::as_str) {
                Some(link) => Some(self.absolute(link)),
                None => page
                    .get("offset")
                    .and_then(Value::as_str)
                    .map(|offset| format!("{url}?size={}&offset={offset}", self.config.page_size)),
            };
        }
        Ok(records)
    }

    fn absolute(&self, link: &str) -> String {
        if link.starts_with("http://") || link.starts_with("https://") {
            link.to_string()
        } else {
            format!("{}{}", self.config.base_url.trim_end_matches('/'), link)
        }
    }
}

impl EntityStore for HttpStore {
    fn label(&self) -> &str {
        &self.label
    }

    fn list(&self, kind: EntityKind, scope: Option<&Scope>) -> Result<Vec<EntityRecord>> {
        self.list_pages(&self.collection_url(kind, scope))
    }

    fn get(&self, kind: EntityKind, id_or_name: &str) -> Result<Option<EntityRecord>> {
        match self.send_record(Method::GET, &self.entity_url(kind, id_or_name), None) {
            Ok(record) => Ok(Some(record)),
            Err(err) if err.status_code() == Some(404) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn create(&mut self, kind: EntityKind, body: &EntityRecord) -> Result<EntityRecord> {
        let body = Value::Object(body.clone());
        self.send_record(Method::POST, &self.collection_url(kind, None), Some(&body))
    }

    fn update(
        &mut self,
        kind: EntityKind,
        id_or_name: &str,
        body: &EntityRecord,
    ) -> Result<EntityRecord> {
        let body = Value::Object(body.clone());
        self.send_record(Method::PUT, &self.entity_url(kind, id_or_name), Some(&body))
    }

    fn patch(
        &mut self,
        kind: EntityKind,
        id_or_name: &str,
        body: &EntityRecord,
    ) -> Result<EntityRecord> {
        let body = Value::Object(body.clone());
        self.send_record(Method::PATCH, &self.entity_url(kind, id_or_name), Some(&body))
    }

    fn delete(&mut self, kind: EntityKind, id_or_name: &str) -> Result<()> {
        self.send(Method::DELETE, &self.entity_url(kind, id_or_name), None)?;
        Ok(())
    }

    fn list_nested(
        &self,
        parent: EntityKind,
        parent_id: &str,
        sub: SubResource,
    ) -> Result<Vec<EntityRecord>> {
        self.list_pages(&self.nested_url(parent, parent_id, sub))
    }

    fn create_nested(
        &mut self,
        parent: EntityKind,
        parent_id: &str,
        sub: SubResource,
        body: &EntityRecord,
    ) -> Result<EntityRecord> {
        let body = Value::Object(body.clone());
        self.send_record(
            Method::POST,
            &self.nested_url(parent, parent_id, sub),
            Some(&body),
        )
    }

    fn supports_incremental_apply(&self) -> Result<bool> {
        if self.config.role == StoreRole::ControlPlane {
            return Ok(true);
        }
        if let Some(dbless) = self.dbless.get() {
            return Ok(!dbless);
        }
        let root = format!("{}/", self.config.base_url.trim_end_matches('/'));
        let info = self.send_json(Method::GET, &root, None)?;
        let dbless = info
            .pointer("/configuration/database")
            .and_then(Value::as_str)
            == Some("off");
        if dbless {
            tracing::info!("Gateway at {} runs without a database", self.config.base_url);
        }
        Ok(!*self.dbless.get_or_init(|| dbless))
    }

    fn replace_config(&mut self, document: &Value) -> Result<()> {
        if self.config.role == StoreRole::ControlPlane {
            return Err(Error::Unsupported {
                store: self.label.clone(),
                operation: "bulk config replacement".to_string(),
            });
        }
        let url = format!("{}/config", self.config.base_url.trim_end_matches('/'));
        self.send(Method::POST, &url, Some(document))?;
        Ok(())
    }
}

/// Turn a non-2xx response into an API error, preferring the body's `message`
fn api_error(response: Response) -> Error {
    let status = response.status().as_u16();
    let text = response.text().unwrap_or_default();
    let message = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|body| body.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or(text);
    Error::api(status, message)
}
