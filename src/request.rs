//! Per-item HTTP request plumbing: target construction, fixed headers,
//! transport options, outcome capture, and latency metrics.

pub mod client;
pub mod headers;
pub mod metrics;
pub mod options;
pub mod outcome;
pub mod target;

pub use client::{HttpRequester, ItemRequester};
pub use headers::parse_header_list;
pub use metrics::RequestMetricsSnapshot;
pub use options::RequesterOptions;
pub use outcome::{RequestError, RequestOutcome};
pub use target::RequestTarget;
