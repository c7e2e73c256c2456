//! Supervises the forwarder's long-running loops with graceful shutdown.
//!
//! The runner owns one [`CancellationToken`] shared by every named process:
//! - Processes run concurrently until SIGINT/SIGTERM, an external cancel,
//!   or the first process error
//! - Remaining processes are awaited after cancellation, never aborted
//! - Closers (final flush, state save) run afterward under a timeout
//! - [`Runner::run`] reports a [`RunOutcome`]; the binary picks the exit code
//!
//! # Example
//!
//! ```no_run
//! use hearth_runner::Runner;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let outcome = Runner::new()
//!         .with_named_process("ticker", |ctx| async move {
//!             loop {
//!                 tokio::select! {
//!                     _ = ctx.cancelled() => break,
//!                     _ = tokio::time::sleep(Duration::from_secs(1)) => {
//!                         tracing::info!("tick");
//!                     }
//!                 }
//!             }
//!             Ok(())
//!         })
//!         .with_closer(|| async move {
//!             tracing::info!("saving state");
//!             Ok(())
//!         })
//!         .with_closer_timeout(Duration::from_secs(5))
//!         .run()
//!         .await;
//!
//!     std::process::exit(outcome.exit_code());
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

pub type ProcessFuture = Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send>>;

/// A long-running process: receives the shared token, resolves when done.
pub type AppProcess = Box<dyn FnOnce(CancellationToken) -> ProcessFuture + Send>;

/// A cleanup step executed after every process has stopped.
pub type Closer = Box<dyn FnOnce() -> ProcessFuture + Send>;

/// How the supervised processes ended
#[derive(Debug)]
pub enum RunOutcome {
    /// Stopped by signal, external cancellation, or every process returned `Ok`
    Clean,
    /// A process failed (or panicked) before shutdown was requested
    Failed {
        process: String,
        error: anyhow::Error,
    },
}

impl RunOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(self, RunOutcome::Clean)
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Clean => 0,
            RunOutcome::Failed { .. } => 1,
        }
    }
}

pub struct Runner {
    app_processes: Vec<(String, AppProcess)>,
    closers: Vec<Closer>,
    closer_timeout: Duration,
    cancellation_token: CancellationToken,
    handle_signals: bool,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    /// Creates a runner with a 10 second closer timeout and OS signal handling.
    pub fn new() -> Self {
        Self {
            app_processes: Vec::new(),
            closers: Vec::new(),
            closer_timeout: Duration::from_secs(10),
            cancellation_token: CancellationToken::new(),
            handle_signals: true,
        }
    }

    /// Adds an anonymous process, named after its position.
    pub fn with_app_process<F, Fut>(self, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        let name = format!("process_{}", self.app_processes.len());
        self.with_named_process(name, process)
    }

    /// Adds a process whose name is attached to its logs and failure report.
    pub fn with_named_process<F, Fut>(mut self, name: impl Into<String>, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.app_processes
            .push((name.into(), Box::new(|token| Box::pin(process(token)))));
        self
    }

    /// Adds an already boxed process, as produced by `into_runner_processes`.
    pub fn with_boxed_process(mut self, name: impl Into<String>, process: AppProcess) -> Self {
        self.app_processes.push((name.into(), process));
        self
    }

    /// Adds a closer. Closers run sequentially in registration order so a
    /// final flush can precede the state save.
    pub fn with_closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.closers.push(Box::new(|| Box::pin(closer())));
        self
    }

    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    /// Shares an externally owned token; cancelling it stops the runner.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Disables SIGINT/SIGTERM handling (tests, embedding).
    pub fn without_signal_handlers(mut self) -> Self {
        self.handle_signals = false;
        self
    }

    /// Runs every process until shutdown, then the closers.
    pub async fn run(self) -> RunOutcome {
        let token = self.cancellation_token;
        let mut join_set = JoinSet::new();

        for (name, process) in self.app_processes {
            let process_token = token.clone();
            let span = tracing::info_span!("process", name = %name);
            join_set.spawn(
                async move {
                    let result = process(process_token).await;
                    (name, result)
                }
                .instrument(span),
            );
        }

        if self.handle_signals {
            spawn_signal_listener(token.clone());
        }

        let mut failure = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((name, Ok(()))) => {
                    debug!(process = %name, "process completed");
                }
                Ok((name, Err(err))) => {
                    if !token.is_cancelled() {
                        error!(process = %name, "process failed: {:#}", err);
                        failure = Some((name, err));
                        token.cancel();
                    } else {
                        warn!(process = %name, "process failed during shutdown: {:#}", err);
                    }
                }
                Err(err) => {
                    error!("process panicked: {}", err);
                    if !token.is_cancelled() {
                        failure = Some((
                            "unknown".to_string(),
                            anyhow::anyhow!("process panicked: {}", err),
                        ));
                        token.cancel();
                    }
                }
            }
        }

        if !self.closers.is_empty() {
            info!("running closers with timeout of {:?}", self.closer_timeout);
            match tokio::time::timeout(self.closer_timeout, run_closers(self.closers)).await {
                Ok(()) => info!("all closers completed"),
                Err(_) => error!("closers timed out after {:?}", self.closer_timeout),
            }
        }

        match failure {
            Some((process, error)) => RunOutcome::Failed { process, error },
            None => {
                info!("runner stopped cleanly");
                RunOutcome::Clean
            }
        }
    }
}

async fn run_closers(closers: Vec<Closer>) {
    for closer in closers {
        if let Err(err) = closer().await {
            error!("closer error: {:#}", err);
        }
    }
}

fn spawn_signal_listener(token: CancellationToken) {
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = ctrl_c_token.cancelled() => {}
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => {
                    info!("received shutdown signal");
                    ctrl_c_token.cancel();
                }
                Err(err) => error!("error setting up signal handler: {}", err),
            }
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(err) => {
                error!("error setting up SIGTERM handler: {}", err);
                return;
            }
        };
        tokio::select! {
            _ = token.cancelled() => {}
            _ = sigterm.recv() => {
                info!("received SIGTERM signal");
                token.cancel();
            }
        }
    });
}
