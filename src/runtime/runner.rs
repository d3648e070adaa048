use crate::dispatch::dispatcher::{BatchDispatcher, RunSummary};
use crate::request::client::{HttpRequester, ItemRequester};
use crate::runtime::config::DispatchConfig;
use crate::runtime::progress::DispatchRun;
use crate::runtime::telemetry::{spawn_metrics_reporter, Telemetry};
use anyhow::{bail, Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Drives one dispatch run end to end: metrics reporting, OS signal handling,
/// and the top-level error boundary around the batch loop.
///
/// A runner drives a single run; build a new one to dispatch again.
pub struct Runner<R: ItemRequester = HttpRequester> {
    config: DispatchConfig,
    dispatcher: BatchDispatcher<R>,
    run: Arc<DispatchRun>,
    telemetry: Arc<Telemetry>,
    shutdown: CancellationToken,
    started: AtomicBool,
}

impl Runner<HttpRequester> {
    /// Creates a runner issuing real HTTP requests as described by `config`.
    pub fn new(config: DispatchConfig) -> Result<Self> {
        let requester = HttpRequester::from_config(&config)?;
        Self::with_requester(config, requester)
    }
}

impl<R: ItemRequester> Runner<R> {
    /// Creates a runner around a custom requester; the config still provides
    /// the plan, identifier scheme, and metrics cadence.
    pub fn with_requester(config: DispatchConfig, requester: R) -> Result<Self> {
        config.validate()?;
        let shutdown = CancellationToken::new();
        let telemetry = Arc::new(Telemetry::default());
        let run = Arc::new(DispatchRun::new(config.plan()?));
        let dispatcher = BatchDispatcher::new(requester, config.id_scheme()?)
            .with_telemetry(telemetry.clone())
            .with_cancellation_token(shutdown.clone());

        Ok(Self {
            config,
            dispatcher,
            run,
            telemetry,
            shutdown,
            started: AtomicBool::new(false),
        })
    }

    /// Returns a clone of the root shutdown token so external callers can integrate
    /// with their own signal handlers or cancellation strategies.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    pub fn progress(&self) -> Arc<DispatchRun> {
        self.run.clone()
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &BatchDispatcher<R> {
        &self.dispatcher
    }

    /// Runs every batch to completion, or until the shutdown token is cancelled.
    pub async fn run(&self) -> Result<RunSummary> {
        if self.started.swap(true, Ordering::SeqCst) {
            bail!("runner already used; create a new runner for another run");
        }

        let reporter_token = self.shutdown.child_token();
        let reporter = spawn_metrics_reporter(
            self.telemetry.clone(),
            reporter_token.clone(),
            self.config.metrics_interval(),
        );

        let result = self.dispatcher.run_with_progress(&self.run).await;

        reporter_token.cancel();
        if let Err(err) = reporter.await {
            tracing::warn!(error = %err, "metrics reporter task panicked");
        }

        result.context("dispatch run aborted")
    }

    /// Runs until every batch settled or a Ctrl-C (SIGINT) is received. After
    /// Ctrl-C the in-flight batch still joins before the run stops.
    pub async fn run_until_ctrl_c(&self) -> Result<RunSummary> {
        let shutdown = self.shutdown.clone();
        let signal_task = tokio::spawn(async move {
            tokio::select! {
                received = signal::ctrl_c() => {
                    match received {
                        Ok(()) => {
                            tracing::info!("Ctrl-C received; stopping after the current batch");
                            shutdown.cancel();
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "failed to listen for Ctrl-C");
                        }
                    }
                }
                _ = shutdown.cancelled() => {}
            }
        });

        let result = self.run().await;
        signal_task.abort();
        result
    }
}
