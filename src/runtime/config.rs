use crate::dispatch::batch::BatchPlan;
use crate::dispatch::item::{IdTemplate, DEFAULT_ID_TEMPLATE};
use crate::request::options::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, DEFAULT_RESPONSE_BODY_LIMIT_BYTES,
};
use crate::request::target::RequestTarget;
use crate::runtime::telemetry;
use anyhow::{bail, Context, Result};
use std::time::Duration;

pub const DEFAULT_TOTAL_ITEMS: u64 = 50_000;
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Runtime configuration for a dispatch run.
///
/// All instances must be constructed via [`DispatchConfig::builder`] or [`DispatchConfig::new`]
/// so invariants are validated before any consumer observes the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    endpoint: String,
    id_param: Option<String>,
    headers: Vec<(String, String)>,
    total_items: u64,
    batch_size: usize,
    id_template: String,
    request_timeout: Duration,
    connect_timeout: Duration,
    metrics_interval: Duration,
    error_for_status: bool,
    max_response_body_bytes: usize,
}

pub struct DispatchConfigParams {
    pub endpoint: String,
    pub id_param: Option<String>,
    pub headers: Vec<(String, String)>,
    pub total_items: u64,
    pub batch_size: usize,
    pub id_template: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub metrics_interval: Duration,
    pub error_for_status: bool,
    pub max_response_body_bytes: usize,
}

impl DispatchConfig {
    /// Returns a builder to incrementally construct and validate a configuration.
    pub fn builder() -> DispatchConfigBuilder {
        DispatchConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values.
    pub fn new(params: DispatchConfigParams) -> Result<Self> {
        let DispatchConfigParams {
            endpoint,
            id_param,
            headers,
            total_items,
            batch_size,
            id_template,
            request_timeout,
            connect_timeout,
            metrics_interval,
            error_for_status,
            max_response_body_bytes,
        } = params;

        let config = Self {
            endpoint: trimmed_string(endpoint),
            id_param: id_param
                .map(trimmed_string)
                .filter(|param| !param.is_empty()),
            headers,
            total_items,
            batch_size,
            id_template: trimmed_string(id_template),
            request_timeout,
            connect_timeout,
            metrics_interval,
            error_for_status,
            max_response_body_bytes,
        };

        config.validate()?;
        Ok(config)
    }

    /// Endpoint URL, either containing `{id}` or paired with [`Self::id_param`].
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Query parameter that carries the identifier, if the endpoint has no `{id}`.
    pub fn id_param(&self) -> Option<&str> {
        self.id_param.as_deref()
    }

    /// Headers sent with every request, in order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Total number of work items (`N`).
    pub fn total_items(&self) -> u64 {
        self.total_items
    }

    /// Items per batch, which is also the concurrency bound (`B`).
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn id_template(&self) -> &str {
        &self.id_template
    }

    /// Upper bound on one request, from connect to the end of the body.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Interval used by the telemetry reporter.
    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    /// Whether non-2xx responses settle as failures.
    pub fn error_for_status(&self) -> bool {
        self.error_for_status
    }

    /// Largest response body accepted before the request settles as a failure.
    pub fn max_response_body_bytes(&self) -> usize {
        self.max_response_body_bytes
    }

    pub fn plan(&self) -> Result<BatchPlan> {
        BatchPlan::new(self.total_items, self.batch_size)
    }

    pub fn id_scheme(&self) -> Result<IdTemplate> {
        IdTemplate::parse(&self.id_template)
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        RequestTarget::new(&self.endpoint, self.id_param.as_deref())?;

        if self.batch_size == 0 {
            bail!("batch_size must be greater than 0");
        }

        IdTemplate::parse(&self.id_template)?;

        if self.request_timeout.is_zero() {
            bail!("request_timeout must be greater than 0");
        }

        if self.connect_timeout.is_zero() {
            bail!("connect_timeout must be greater than 0");
        }

        if self.connect_timeout > self.request_timeout {
            bail!("connect_timeout must not exceed request_timeout");
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        if self.max_response_body_bytes == 0 {
            bail!("max_response_body_bytes must be greater than 0");
        }

        for (name, _) in &self.headers {
            if name.trim().is_empty() {
                bail!("header names cannot be empty");
            }
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct DispatchConfigBuilder {
    endpoint: Option<String>,
    id_param: Option<String>,
    headers: Vec<(String, String)>,
    total_items: Option<u64>,
    batch_size: Option<usize>,
    id_template: Option<String>,
    request_timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    metrics_interval: Option<Duration>,
    error_for_status: Option<bool>,
    max_response_body_bytes: Option<usize>,
}

impl DispatchConfigBuilder {
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn id_param(mut self, param: impl Into<String>) -> Self {
        self.id_param = Some(param.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn total_items(mut self, total: u64) -> Self {
        self.total_items = Some(total);
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    pub fn id_template(mut self, template: impl Into<String>) -> Self {
        self.id_template = Some(template.into());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn error_for_status(mut self, enabled: bool) -> Self {
        self.error_for_status = Some(enabled);
        self
    }

    pub fn max_response_body_bytes(mut self, bytes: usize) -> Self {
        self.max_response_body_bytes = Some(bytes);
        self
    }

    pub fn build(self) -> Result<DispatchConfig> {
        let request_timeout = self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        let params = DispatchConfigParams {
            endpoint: self.endpoint.context("endpoint is required")?,
            id_param: self.id_param,
            headers: self.headers,
            total_items: self.total_items.unwrap_or(DEFAULT_TOTAL_ITEMS),
            batch_size: self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            id_template: self
                .id_template
                .unwrap_or_else(|| DEFAULT_ID_TEMPLATE.to_owned()),
            request_timeout,
            connect_timeout: self
                .connect_timeout
                .unwrap_or_else(|| DEFAULT_CONNECT_TIMEOUT.min(request_timeout)),
            metrics_interval: self
                .metrics_interval
                .unwrap_or(telemetry::DEFAULT_METRICS_INTERVAL),
            error_for_status: self.error_for_status.unwrap_or(true),
            max_response_body_bytes: self
                .max_response_body_bytes
                .unwrap_or(DEFAULT_RESPONSE_BODY_LIMIT_BYTES),
        };

        DispatchConfig::new(params)
    }
}

fn trimmed_string(value: String) -> String {
    value.trim().to_owned()
}
