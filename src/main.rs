use std::env;
use std::process::ExitCode;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use batchcast::request::parse_header_list;
use batchcast::runtime::config::{DEFAULT_BATCH_SIZE, DEFAULT_TOTAL_ITEMS};
use batchcast::{DispatchConfig, RunSummary, Runner};

const DEFAULT_ID_TEMPLATE: &str = batchcast::dispatch::item::DEFAULT_ID_TEMPLATE;
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_METRICS_SECS: u64 = 5;
const DEFAULT_MAX_RESPONSE_MB: usize = 10;

#[tokio::main]
async fn main() -> ExitCode {
    batchcast::init_tracing();

    match run().await {
        Ok(summary) => {
            tracing::info!(
                batches = summary.batches.len(),
                succeeded = summary.succeeded,
                failed = summary.failed,
                cancelled = summary.cancelled,
                "batchcast finished"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "batchcast aborted");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<RunSummary> {
    let args = CliArgs::from_env()?;
    let config = args.to_dispatch_config()?;
    tracing::info!(
        endpoint = config.endpoint(),
        total_items = config.total_items(),
        batch_size = config.batch_size(),
        id_template = config.id_template(),
        "configuration loaded"
    );

    let runner = Runner::new(config)?;
    runner.run_until_ctrl_c().await
}

struct CliArgs {
    endpoint: String,
    id_param: Option<String>,
    headers: Vec<(String, String)>,
    total_items: u64,
    batch_size: usize,
    id_template: String,
    timeout_secs: u64,
    metrics_secs: u64,
    accept_any_status: bool,
    max_response_mb: usize,
}

impl CliArgs {
    fn from_env() -> Result<Self> {
        let endpoint = env::var("BATCHCAST_ENDPOINT")
            .context("BATCHCAST_ENDPOINT must be set to the request URL")?;
        let id_param = env::var("BATCHCAST_ID_PARAM")
            .ok()
            .filter(|value| !value.trim().is_empty());
        let headers = match env::var("BATCHCAST_HEADERS") {
            Ok(raw) => parse_header_list(&raw).context("failed to parse BATCHCAST_HEADERS")?,
            Err(_) => Vec::new(),
        };

        Ok(Self {
            endpoint,
            id_param,
            headers,
            total_items: parse_env_with_default("BATCHCAST_TOTAL_ITEMS", DEFAULT_TOTAL_ITEMS)?,
            batch_size: parse_env_with_default("BATCHCAST_BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
            id_template: read_env_or_default("BATCHCAST_ID_TEMPLATE", DEFAULT_ID_TEMPLATE),
            timeout_secs: parse_env_with_default("BATCHCAST_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?,
            metrics_secs: parse_env_with_default("BATCHCAST_METRICS_SECS", DEFAULT_METRICS_SECS)?,
            accept_any_status: parse_env_with_default("BATCHCAST_ACCEPT_ANY_STATUS", false)?,
            max_response_mb: parse_env_with_default(
                "BATCHCAST_MAX_RESPONSE_MB",
                DEFAULT_MAX_RESPONSE_MB,
            )?,
        })
    }

    fn to_dispatch_config(&self) -> Result<DispatchConfig> {
        let max_response_body_bytes = self
            .max_response_mb
            .checked_mul(1024 * 1024)
            .context("BATCHCAST_MAX_RESPONSE_MB is too large")?;

        let mut builder = DispatchConfig::builder()
            .endpoint(self.endpoint.clone())
            .headers(self.headers.iter().cloned())
            .total_items(self.total_items)
            .batch_size(self.batch_size)
            .id_template(self.id_template.clone())
            .request_timeout(Duration::from_secs(self.timeout_secs))
            .metrics_interval(Duration::from_secs(self.metrics_secs))
            .error_for_status(!self.accept_any_status)
            .max_response_body_bytes(max_response_body_bytes);

        if let Some(param) = &self.id_param {
            builder = builder.id_param(param.clone());
        }

        builder.build()
    }
}

fn read_env_or_default(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => default.to_string(),
    }
}

fn parse_env_with_default<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("failed to parse {key}='{value}'")),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("failed to read {key}")),
    }
}
