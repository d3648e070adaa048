pub mod dispatch;
pub mod request;
pub mod runtime;

pub use dispatch::batch::BatchPlan;
pub use dispatch::dispatcher::{BatchDispatcher, BatchReport, DispatchState, RunSummary};
pub use dispatch::item::{IdTemplate, IdentifierScheme, WorkItem};
pub use request::{
    HttpRequester, ItemRequester, RequestError, RequestOutcome, RequestTarget, RequesterOptions,
};
pub use runtime::config::{DispatchConfig, DispatchConfigBuilder, DispatchConfigParams};
pub use runtime::progress::DispatchRun;
pub use runtime::runner::Runner;
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
