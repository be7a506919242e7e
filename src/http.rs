//! Request/response transport used by [`Session`](crate::Session).

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use reqwest::Method;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::Error;

/// Streamed response body.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, Error>> + Send>>;

/// Value of one multipart field.
#[derive(Debug, Clone, PartialEq)]
pub enum FormPart {
    Text(String),
    File { file_name: String, data: Vec<u8> },
}

/// Multipart form body. Fields keep insertion order and may repeat.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultipartForm {
    parts: Vec<(String, FormPart)>,
}

impl MultipartForm {
    /// Creates an empty form.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a text field.
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push((name.into(), FormPart::Text(value.into())));
        self
    }

    /// Appends a file field.
    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        self.parts.push((
            name.into(),
            FormPart::File {
                file_name: file_name.into(),
                data,
            },
        ));
        self
    }

    /// Fields in insertion order.
    pub fn parts(&self) -> &[(String, FormPart)] {
        &self.parts
    }

    /// First text value of `name`.
    pub fn text_value(&self, name: &str) -> Option<&str> {
        self.parts.iter().find_map(|(field, part)| match part {
            FormPart::Text(value) if field == name => Some(value.as_str()),
            _ => None,
        })
    }

    fn into_reqwest(self) -> reqwest::multipart::Form {
        self.parts
            .into_iter()
            .fold(reqwest::multipart::Form::new(), |form, (name, part)| match part {
                FormPart::Text(value) => form.text(name, value),
                FormPart::File { file_name, data } => form.part(
                    name,
                    reqwest::multipart::Part::bytes(data).file_name(file_name),
                ),
            })
    }
}

/// Body of an outgoing request.
enum Payload {
    Empty,
    Bytes(Vec<u8>),
    Form(MultipartForm),
}

impl From<Option<Vec<u8>>> for Payload {
    fn from(body: Option<Vec<u8>>) -> Self {
        body.map_or(Payload::Empty, Payload::Bytes)
    }
}

/// Minimal HTTP surface the REST helpers need.
///
/// Implementations attach credentials and turn non-success statuses into
/// [`Error::Http`].
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends a request and returns the whole response body.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
        headers: &[(&str, &str)],
    ) -> Result<Vec<u8>, Error>;

    /// Sends a request and returns the response body as it arrives.
    async fn stream_request(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
        headers: &[(&str, &str)],
    ) -> Result<ByteStream, Error>;

    /// Sends a multipart form and returns the whole response body.
    async fn multipart_request(
        &self,
        method: Method,
        path: &str,
        form: MultipartForm,
    ) -> Result<Vec<u8>, Error>;
}

/// [`HttpTransport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ReqwestTransport {
    /// Builds a client for `config`. Fails without an API key.
    pub fn new(config: &ClientConfig) -> Result<Self, Error> {
        if config.api_key.is_empty() {
            return Err(Error::MissingApiKey);
        }
        Ok(Self {
            client: reqwest::Client::builder().build()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Payload,
        headers: &[(&str, &str)],
    ) -> Result<reqwest::Response, Error> {
        let url = format!("{}{}", self.base_url, path);
        debug!(method = %method, url = %url, "HTTP request");

        let mut builder = self
            .client
            .request(method, &url)
            .bearer_auth(&self.api_key);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder = match body {
            Payload::Empty => builder,
            Payload::Bytes(bytes) => builder.body(bytes),
            Payload::Form(form) => builder.multipart(form.into_reqwest()),
        };

        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = error_detail(&body)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
        warn!(status = status.as_u16(), message = %message, url = %url, "HTTP request failed");
        Err(Error::Http {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
        headers: &[(&str, &str)],
    ) -> Result<Vec<u8>, Error> {
        let response = self.send(method, path, body.into(), headers).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn stream_request(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
        headers: &[(&str, &str)],
    ) -> Result<ByteStream, Error> {
        let response = self.send(method, path, body.into(), headers).await?;
        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(Error::from));
        Ok(Box::pin(chunks))
    }

    async fn multipart_request(
        &self,
        method: Method,
        path: &str,
        form: MultipartForm,
    ) -> Result<Vec<u8>, Error> {
        let response = self.send(method, path, Payload::Form(form), &[]).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

/// Pulls `detail` out of a JSON error body.
pub(crate) fn error_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        serde_json::Value::String(detail) => Some(detail.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_detail() {
        assert_eq!(
            error_detail(r#"{"detail":"Invalid token"}"#).as_deref(),
            Some("Invalid token")
        );
        assert_eq!(
            error_detail(r#"{"detail":[{"loc":"text"}]}"#).as_deref(),
            Some(r#"[{"loc":"text"}]"#)
        );
        assert_eq!(error_detail("Bad Gateway"), None);
        assert_eq!(error_detail(r#"{"status":500}"#), None);
    }

    #[test]
    fn test_multipart_form_keeps_order_and_repeats() {
        let form = MultipartForm::new()
            .text("tags", "a")
            .file("voices", "v0", vec![1])
            .text("tags", "b");

        assert_eq!(form.parts().len(), 3);
        assert_eq!(form.parts()[0], ("tags".to_string(), FormPart::Text("a".to_string())));
        assert_eq!(form.text_value("tags"), Some("a"));
        assert_eq!(form.text_value("voices"), None);
    }

    #[test]
    fn test_transport_requires_api_key() {
        assert!(matches!(
            ReqwestTransport::new(&ClientConfig::new("")),
            Err(Error::MissingApiKey)
        ));
    }
}
