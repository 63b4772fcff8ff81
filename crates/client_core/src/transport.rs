//! The four list/create/update/delete calls a controller makes, plus job
//! triggers, and their HTTP binding.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::Value;
use shared::{
    domain::{ResourceKind, RowId},
    error::check_envelope,
    protocol::QueryParams,
};
use tracing::debug;
use url::Url;

use crate::error::TransportError;

#[async_trait]
pub trait ResourceEndpoint: Send + Sync {
    /// Raw list payload; shape normalization is the caller's job.
    async fn list(&self, params: &QueryParams) -> Result<Value, TransportError>;
    async fn get(&self, id: &RowId) -> Result<Value, TransportError>;
    async fn create(&self, body: Value) -> Result<Option<Value>, TransportError>;
    async fn update(&self, body: Value) -> Result<Option<Value>, TransportError>;
    async fn delete(&self, ids: &[RowId]) -> Result<(), TransportError>;
    /// POSTs to `<resource>/<action>`; the backend returns before the job ends.
    async fn trigger(&self, action: &str, body: Option<Value>)
        -> Result<Option<Value>, TransportError>;
}

/// `ResourceEndpoint` over the backend's REST routes:
/// `GET <api>/<resource>/list`, `POST|PUT <api>/<resource>`,
/// `DELETE <api>/<resource>/{ids}`.
#[derive(Clone)]
pub struct HttpResourceEndpoint {
    http: Client,
    api_base: Url,
    resource: &'static str,
}

impl HttpResourceEndpoint {
    pub fn new(
        http: Client,
        api_base: &str,
        kind: ResourceKind,
    ) -> Result<Self, TransportError> {
        let api_base = Url::parse(api_base.trim())?;
        if api_base.cannot_be_a_base() {
            return Err(url::ParseError::RelativeUrlWithCannotBeABaseBase.into());
        }
        Ok(Self {
            http,
            api_base,
            resource: kind.path(),
        })
    }

    fn url(&self, tail: &[&str]) -> Result<Url, TransportError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|()| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(self.resource.split('/'))
            .extend(tail);
        Ok(url)
    }

    fn request(&self, method: Method, tail: &[&str]) -> Result<RequestBuilder, TransportError> {
        let url = self.url(tail)?;
        debug!(method = %method, url = %url, "backend request");
        Ok(self.http.request(method, url))
    }
}

/// Reads a response body, failing on non-2xx statuses and on envelopes with
/// a failure code. Empty bodies are `None`.
async fn read_body(res: Response) -> Result<Option<Value>, TransportError> {
    let status = res.status();
    let text = res.text().await?;
    if !status.is_success() {
        return Err(TransportError::Status {
            status: status.as_u16(),
            body: text,
        });
    }
    if text.trim().is_empty() {
        return Ok(None);
    }
    let body: Value = serde_json::from_str(&text)?;
    check_envelope(&body)?;
    Ok(Some(body))
}

#[async_trait]
impl ResourceEndpoint for HttpResourceEndpoint {
    async fn list(&self, params: &QueryParams) -> Result<Value, TransportError> {
        let res = self
            .request(Method::GET, &["list"])?
            .query(&params.to_query_pairs())
            .send()
            .await?;
        Ok(read_body(res).await?.unwrap_or(Value::Null))
    }

    async fn get(&self, id: &RowId) -> Result<Value, TransportError> {
        let id = id.to_string();
        let res = self.request(Method::GET, &[id.as_str()])?.send().await?;
        Ok(read_body(res).await?.unwrap_or(Value::Null))
    }

    async fn create(&self, body: Value) -> Result<Option<Value>, TransportError> {
        let res = self.request(Method::POST, &[])?.json(&body).send().await?;
        read_body(res).await
    }

    async fn update(&self, body: Value) -> Result<Option<Value>, TransportError> {
        let res = self.request(Method::PUT, &[])?.json(&body).send().await?;
        read_body(res).await
    }

    async fn delete(&self, ids: &[RowId]) -> Result<(), TransportError> {
        let joined = ids
            .iter()
            .map(RowId::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let res = self
            .request(Method::DELETE, &[joined.as_str()])?
            .send()
            .await?;
        read_body(res).await.map(|_| ())
    }

    async fn trigger(
        &self,
        action: &str,
        body: Option<Value>,
    ) -> Result<Option<Value>, TransportError> {
        let mut req = self.request(Method::POST, &[action])?;
        if let Some(body) = body {
            req = req.json(&body);
        }
        read_body(req.send().await?).await
    }
}
