//! HTTP requester issuing one GET per work item. Houses the `HttpRequester`
//! and the `ItemRequester` trait consumed by the batch dispatcher.

use crate::dispatch::item::WorkItem;
use crate::request::headers::build_header_map;
use crate::request::metrics::{RequestMetrics, RequestMetricsSnapshot};
use crate::request::options::RequesterOptions;
use crate::request::outcome::{render_payload, RequestError, RequestOutcome};
use crate::request::target::RequestTarget;
use crate::runtime::config::DispatchConfig;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use reqwest::{Client, Response};
use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};

const MAX_ERROR_BODY_CHARS: usize = 512;

/// Issues the single outbound request for one work item.
///
/// Implementations must settle every call into a [`RequestOutcome`]; a
/// failed request is reported as [`RequestOutcome::Failure`], never as a
/// panic, so sibling requests in the same batch are unaffected.
pub trait ItemRequester: Send + Sync + 'static {
    fn issue(&self, item: WorkItem) -> BoxFuture<'_, RequestOutcome>;
}

impl<R: ItemRequester + ?Sized> ItemRequester for Arc<R> {
    fn issue(&self, item: WorkItem) -> BoxFuture<'_, RequestOutcome> {
        (**self).issue(item)
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequester {
    target: Arc<RequestTarget>,
    client: Client,
    options: RequesterOptions,
    metrics: Arc<RequestMetrics>,
}

impl ItemRequester for HttpRequester {
    fn issue(&self, item: WorkItem) -> BoxFuture<'_, RequestOutcome> {
        Box::pin(async move { self.request(&item).await })
    }
}

impl HttpRequester {
    pub fn new(target: RequestTarget, headers: &[(String, String)]) -> Result<Self> {
        Self::with_options(target, headers, RequesterOptions::default())
    }

    pub fn with_options(
        target: RequestTarget,
        headers: &[(String, String)],
        options: RequesterOptions,
    ) -> Result<Self> {
        options.validate()?;

        let client = Client::builder()
            .default_headers(build_header_map(headers)?)
            .connect_timeout(options.connect_timeout)
            .pool_idle_timeout(options.pool_idle_timeout)
            .pool_max_idle_per_host(options.pool_max_idle_per_host)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            target: Arc::new(target),
            client,
            options,
            metrics: Arc::new(RequestMetrics::default()),
        })
    }

    pub fn from_config(config: &DispatchConfig) -> Result<Self> {
        config.validate()?;
        let options = RequesterOptions {
            request_timeout: config.request_timeout(),
            connect_timeout: config.connect_timeout(),
            pool_max_idle_per_host: config.batch_size(),
            error_for_status: config.error_for_status(),
            max_response_body_bytes: config.max_response_body_bytes(),
            ..RequesterOptions::default()
        };
        let target = RequestTarget::new(config.endpoint(), config.id_param())?;
        Self::with_options(target, config.headers(), options)
    }

    pub fn target(&self) -> &RequestTarget {
        &self.target
    }

    pub fn metrics(&self) -> RequestMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Sends the request for `item` and settles it into an outcome.
    pub async fn request(&self, item: &WorkItem) -> RequestOutcome {
        tracing::info!(
            index = item.index(),
            item = item.identifier(),
            "dispatching item request"
        );

        let start = Instant::now();
        match self.perform(item).await {
            Ok((status, payload)) => {
                self.metrics.observe(None, start.elapsed());
                tracing::info!(
                    index = item.index(),
                    item = item.identifier(),
                    status,
                    payload = %render_payload(&payload),
                    "item request succeeded"
                );
                RequestOutcome::Success { status, payload }
            }
            Err(error) => {
                self.metrics.observe(Some(&error), start.elapsed());
                tracing::warn!(
                    index = item.index(),
                    item = item.identifier(),
                    error = %error,
                    "item request failed"
                );
                RequestOutcome::Failure { error }
            }
        }
    }

    async fn perform(&self, item: &WorkItem) -> Result<(u16, String), RequestError> {
        let url = self
            .target
            .url_for(item.identifier())
            .map_err(|err| RequestError::transport(format!("{err:#}")))?;
        let limit = self.options.request_timeout;
        let max_body = self.options.max_response_body_bytes;

        let exchange = async {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|err| classify_transport_error(&err, limit))?;
            let status = response.status();
            let body = read_body(response, max_body).await?;
            Ok::<_, RequestError>((status, body))
        };

        let (status, body) = timeout(limit, exchange)
            .await
            .map_err(|_| RequestError::Timeout { after: limit })??;

        if self.options.error_for_status && !status.is_success() {
            return Err(RequestError::Status {
                code: status.as_u16(),
                body: truncate_chars(body.trim(), MAX_ERROR_BODY_CHARS),
            });
        }

        Ok((status.as_u16(), body))
    }
}

/// Reads the body chunk by chunk, giving up as soon as it outgrows `limit`.
/// The payload is kept verbatim, so a body that is not UTF-8 is a failure.
async fn read_body(mut response: Response, limit: usize) -> Result<String, RequestError> {
    if let Some(declared) = response.content_length() {
        if declared > limit as u64 {
            return Err(RequestError::Body {
                message: format!("declared length {declared} exceeds the {limit} byte limit"),
            });
        }
    }

    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(|err| RequestError::Body {
        message: error_chain(&err),
    })? {
        if body.len() + chunk.len() > limit {
            return Err(RequestError::Body {
                message: format!("body exceeds the {limit} byte limit"),
            });
        }
        body.extend_from_slice(&chunk);
    }

    String::from_utf8(body).map_err(|err| RequestError::Body {
        message: format!("body is not valid UTF-8: {}", err.utf8_error()),
    })
}

fn classify_transport_error(err: &reqwest::Error, limit: Duration) -> RequestError {
    if err.is_timeout() {
        RequestError::Timeout { after: limit }
    } else if err.is_connect() {
        RequestError::Connect {
            message: error_chain(err),
        }
    } else {
        RequestError::Transport {
            message: error_chain(err),
        }
    }
}

fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn truncate_chars(value: &str, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &value[..cut]),
        None => value.to_owned(),
    }
}
