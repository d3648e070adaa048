//! Transport knobs for the HTTP requester along with validation helpers.

use anyhow::{bail, Result};
use std::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_RESPONSE_BODY_LIMIT_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_POOL_IDLE_TIMEOUT_SECS: u64 = 90;

#[derive(Debug, Clone)]
pub struct RequesterOptions {
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub pool_idle_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    /// Bodies larger than this settle as [`RequestError::Body`](crate::RequestError::Body).
    pub max_response_body_bytes: usize,
    /// Treat non-2xx responses as failures.
    pub error_for_status: bool,
}

impl Default for RequesterOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            pool_idle_timeout: Duration::from_secs(DEFAULT_POOL_IDLE_TIMEOUT_SECS),
            pool_max_idle_per_host: 32,
            max_response_body_bytes: DEFAULT_RESPONSE_BODY_LIMIT_BYTES,
            error_for_status: true,
        }
    }
}

impl RequesterOptions {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.request_timeout.is_zero() {
            bail!("request_timeout must be greater than 0");
        }
        if self.connect_timeout.is_zero() {
            bail!("connect_timeout must be greater than 0");
        }
        if self.connect_timeout > self.request_timeout {
            bail!("connect_timeout must not exceed request_timeout");
        }
        if self.max_response_body_bytes == 0 {
            bail!("max_response_body_bytes must be greater than 0");
        }
        Ok(())
    }
}
