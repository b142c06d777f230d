use std::time::{Duration, Instant};

use futures::future::join_all;
use reqwest::redirect::Policy;
use tracing::trace;

use super::{EdgeBody, EdgeSnapshot, HttpResponse, JsonDocument};
use crate::error::ProbeError;

const MAX_REDIRECTS: usize = 10;

/// HTTP transport shared by every HTTP-based monitor variant
pub struct HttpProbe {
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl HttpProbe {
    pub fn new(max_body_bytes: usize) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("uppe-engine/", env!("CARGO_PKG_VERSION")))
            .redirect(Policy::limited(MAX_REDIRECTS))
            .build()?;

        Ok(Self { client, max_body_bytes })
    }

    /// GET `url`, optionally buffering the body up to the configured cap
    pub async fn fetch(&self, url: &str, timeout: Duration, read_body: bool) -> Result<HttpResponse, ProbeError> {
        let start = Instant::now();

        let mut response = self.client.get(url).timeout(timeout).send().await.map_err(|e| request_error(&e))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| (name.as_str().to_string(), String::from_utf8_lossy(value.as_bytes()).into_owned()))
            .collect();

        let (body, body_truncated) = if read_body {
            self.read_body(&mut response).await?
        } else {
            (Vec::new(), false)
        };

        let latency_ms = start.elapsed().as_millis() as u64;
        trace!(url, status, latency_ms, bytes = body.len(), "HTTP probe finished");

        Ok(HttpResponse { status, headers, body, body_truncated, latency_ms })
    }

    async fn read_body(&self, response: &mut reqwest::Response) -> Result<(Vec<u8>, bool), ProbeError> {
        let mut body = Vec::new();

        while let Some(chunk) = response.chunk().await.map_err(|e| request_error(&e))? {
            let room = self.max_body_bytes.saturating_sub(body.len());
            if chunk.len() > room {
                body.extend_from_slice(&chunk[..room]);
                return Ok((body, true));
            }
            body.extend_from_slice(&chunk);
        }

        Ok((body, false))
    }

    /// Fetch a status document; an unparseable body yields `json: None`
    pub async fn fetch_json(&self, url: &str, timeout: Duration) -> Result<JsonDocument, ProbeError> {
        let response = self.fetch(url, timeout, true).await?;
        let json = serde_json::from_slice(&response.body).ok();

        Ok(JsonDocument { url: url.to_string(), status: response.status, json, latency_ms: response.latency_ms })
    }

    /// Fetch the baseline, then every edge concurrently.
    ///
    /// A baseline failure fails the whole probe; edge failures are kept per edge.
    pub async fn edges(
        &self,
        baseline_url: &str,
        endpoints: &[String],
        timeout: Duration,
    ) -> Result<EdgeSnapshot, ProbeError> {
        let start = Instant::now();

        let baseline = self.fetch(baseline_url, timeout, true).await.map_err(|err| {
            ProbeError::new(err.kind, format!("baseline {baseline_url} unreachable: {}", err.message))
        })?;

        let fetches = endpoints.iter().map(|endpoint| async move {
            let body = self.fetch(endpoint, timeout, true).await.map(|response| response.body);
            EdgeBody { endpoint: endpoint.clone(), body }
        });
        let edges = join_all(fetches).await;

        Ok(EdgeSnapshot { baseline: baseline.body, edges, latency_ms: start.elapsed().as_millis() as u64 })
    }
}

fn request_error(err: &reqwest::Error) -> ProbeError {
    if err.is_timeout() {
        ProbeError::timeout(err.to_string())
    } else {
        ProbeError::classify(err)
    }
}
