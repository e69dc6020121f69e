//! The HTTP surface `httpDo`/`request`/`notification`/`webhook` share,
//! mirroring `oam_render::ProcessingClient` — the same pattern for the same
//! reason (pluggable, fakeable I/O at a crate seam) applied to the
//! workflow side of the wire.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

/// Requests time out after this long regardless of what the step asked
/// for, so a hung webhook can't wedge the whole workflow parallelism
/// budget.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn do_request(
        &self,
        method: &str,
        url: &str,
        body: Option<serde_json::Value>,
        headers: &BTreeMap<String, String>,
    ) -> Result<serde_json::Value, String>;
}

#[derive(Debug, Clone, Default)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn do_request(
        &self,
        method: &str,
        url: &str,
        body: Option<serde_json::Value>,
        headers: &BTreeMap<String, String>,
    ) -> Result<serde_json::Value, String> {
        let mut builder = match method.to_ascii_uppercase().as_str() {
            "GET" => self.client.get(url),
            "POST" => self.client.post(url),
            "PUT" => self.client.put(url),
            "PATCH" => self.client.patch(url),
            "DELETE" => self.client.delete(url),
            other => return Err(format!("unsupported HTTP method {other:?}")),
        };
        for (key, value) in headers {
            builder = builder.header(key, value);
        }
        if let Some(body) = body {
            builder = builder.json(&body);
        }
        let response = tokio::time::timeout(REQUEST_TIMEOUT, builder.send())
            .await
            .map_err(|_| format!("request to {url} timed out after {REQUEST_TIMEOUT:?}"))?
            .map_err(|err| err.to_string())?;
        let status = response.status();
        let text = response.text().await.map_err(|err| err.to_string())?;
        if !status.is_success() {
            return Err(format!("{url} returned {status}: {text}"));
        }
        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&text).map_err(|err| err.to_string())
    }
}
