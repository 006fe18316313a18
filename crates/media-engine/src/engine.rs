//! Engine abstraction and the lazily-initialized engine handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::OnceCell;

use sidebyside_common::error::{ComposeError, ComposeResult};

use crate::progress::PercentTracker;
use crate::workspace::Workspace;

/// Receives integer percents `0..=100`, never decreasing within one run.
///
/// Sinks usually borrow job-local state, so the alias carries that borrow.
pub type PercentSink<'a> = dyn Fn(u8) + Send + Sync + 'a;

/// A workspace blob read by an invocation, and where decoding starts.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationInput {
    pub name: String,
    pub seek_secs: f64,
}

/// A fully serialized engine command.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// Inputs referenced by `args`, used to estimate run length.
    pub inputs: Vec<InvocationInput>,

    /// Engine arguments, excluding engine-level logging/progress flags.
    pub args: Vec<String>,

    /// Workspace name the invocation writes.
    pub output: String,
}

/// A ready-to-use multimedia engine.
#[async_trait::async_trait]
pub trait Engine: Send + Sync {
    /// Engine name, for logs.
    fn name(&self) -> &str;

    /// The store this engine reads inputs from and writes outputs to.
    fn workspace(&self) -> &dyn Workspace;

    /// Execute an invocation to completion, reporting completion ratios in
    /// `[0, 1]` to `progress`.
    async fn run(
        &self,
        invocation: &Invocation,
        progress: &(dyn Fn(f64) + Send + Sync),
    ) -> ComposeResult<()>;
}

/// Performs the (possibly slow) engine initialization.
#[async_trait::async_trait]
pub trait EngineLoader: Send + Sync {
    async fn load(&self) -> ComposeResult<Arc<dyn Engine>>;
}

/// Owns the single engine instance and initializes it at most once.
///
/// A failed initialization leaves the handle empty, so the next
/// [`EngineHandle::ensure_ready`] call tries again.
///
/// The engine has one workspace, so jobs are serialized here: running an
/// invocation requires a [`JobLease`], and only one lease exists at a time
/// no matter how many callers share the handle.
pub struct EngineHandle {
    loader: Box<dyn EngineLoader>,
    engine: OnceCell<Arc<dyn Engine>>,
    leased: AtomicBool,
}

/// Exclusive right to stage into and run on the handle's engine.
///
/// Released on drop.
pub struct JobLease<'a> {
    handle: &'a EngineHandle,
}

impl EngineHandle {
    pub fn new(loader: impl EngineLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            engine: OnceCell::new(),
            leased: AtomicBool::new(false),
        }
    }

    /// Claim the engine for one job, or `None` if another job holds it.
    pub fn try_lease(&self) -> Option<JobLease<'_>> {
        self.leased
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| JobLease { handle: self })
    }

    /// Whether a job currently holds the lease.
    pub fn is_leased(&self) -> bool {
        self.leased.load(Ordering::Acquire)
    }

    /// Whether initialization has completed.
    pub fn is_ready(&self) -> bool {
        self.engine.initialized()
    }

    /// Initialize the engine if needed and return it.
    ///
    /// Concurrent callers wait on a single initialization.
    pub async fn ensure_ready(&self) -> ComposeResult<Arc<dyn Engine>> {
        let engine = self
            .engine
            .get_or_try_init(|| async {
                let started = Instant::now();
                tracing::info!("Initializing media engine");
                match self.loader.load().await {
                    Ok(engine) => {
                        tracing::info!(
                            engine = engine.name(),
                            init_ms = started.elapsed().as_millis(),
                            "Media engine ready"
                        );
                        Ok(engine)
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "Media engine initialization failed");
                        Err(match err {
                            ComposeError::EngineUnavailable { .. } => err,
                            other => ComposeError::engine_unavailable(other.to_string()),
                        })
                    }
                }
            })
            .await?;
        Ok(Arc::clone(engine))
    }
}

impl JobLease<'_> {
    pub fn handle(&self) -> &EngineHandle {
        self.handle
    }

    /// Initialize the engine if needed and return it.
    pub async fn engine(&self) -> ComposeResult<Arc<dyn Engine>> {
        self.handle.ensure_ready().await
    }

    /// Run an invocation, forwarding monotonic percent progress.
    pub async fn run(
        &self,
        invocation: &Invocation,
        on_progress: &PercentSink<'_>,
    ) -> ComposeResult<()> {
        let engine = self.handle.ensure_ready().await?;
        let tracker = PercentTracker::new();
        let sink = |ratio: f64| {
            if let Some(percent) = tracker.advance(ratio) {
                on_progress(percent);
            }
        };
        engine.run(invocation, &sink).await
    }
}

impl Drop for JobLease<'_> {
    fn drop(&mut self) {
        self.handle.leased.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("ready", &self.is_ready())
            .field("leased", &self.is_leased())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::MemoryWorkspace;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct StubEngine {
        workspace: MemoryWorkspace,
        ratios: Vec<f64>,
    }

    #[async_trait::async_trait]
    impl Engine for StubEngine {
        fn name(&self) -> &str {
            "stub"
        }

        fn workspace(&self) -> &dyn Workspace {
            &self.workspace
        }

        async fn run(
            &self,
            invocation: &Invocation,
            progress: &(dyn Fn(f64) + Send + Sync),
        ) -> ComposeResult<()> {
            for ratio in &self.ratios {
                progress(*ratio);
            }
            if invocation.args.iter().any(|a| a == "--fail") {
                return Err(ComposeError::engine_execution("stub failure"));
            }
            self.workspace.put(&invocation.output, b"ok".to_vec());
            Ok(())
        }
    }

    struct CountingLoader {
        attempts: Arc<AtomicUsize>,
        fail_first: usize,
    }

    #[async_trait::async_trait]
    impl EngineLoader for CountingLoader {
        async fn load(&self) -> ComposeResult<Arc<dyn Engine>> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if attempt < self.fail_first {
                return Err(ComposeError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "binary missing",
                )));
            }
            Ok(Arc::new(StubEngine {
                workspace: MemoryWorkspace::new(),
                ratios: vec![0.0, 0.5, 0.25, 1.0],
            }))
        }
    }

    fn invocation(args: &[&str]) -> Invocation {
        Invocation {
            inputs: vec![],
            args: args.iter().map(|s| s.to_string()).collect(),
            output: "output.gif".to_string(),
        }
    }

    #[tokio::test]
    async fn test_concurrent_ensure_ready_initializes_once() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let handle = Arc::new(EngineHandle::new(CountingLoader {
            attempts: Arc::clone(&attempts),
            fail_first: 0,
        }));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let handle = Arc::clone(&handle);
            tasks.push(tokio::spawn(async move { handle.ensure_ready().await }));
        }
        let mut engines = Vec::new();
        for task in tasks {
            engines.push(task.await.unwrap().unwrap());
        }

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(engines.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert!(handle.is_ready());
    }

    #[tokio::test]
    async fn test_failed_init_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let handle = EngineHandle::new(CountingLoader {
            attempts: Arc::clone(&attempts),
            fail_first: 1,
        });

        let err = handle.ensure_ready().await.err().unwrap();
        assert!(matches!(err, ComposeError::EngineUnavailable { .. }));
        assert!(!handle.is_ready());

        handle.ensure_ready().await.unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_run_reports_monotonic_percent() {
        let handle = EngineHandle::new(CountingLoader {
            attempts: Arc::new(AtomicUsize::new(0)),
            fail_first: 0,
        });
        // The sink borrows a local, as job-state forwarders do.
        let seen = Mutex::new(Vec::new());
        let record = |p: u8| seen.lock().unwrap().push(p);

        let lease = handle.try_lease().unwrap();
        lease.run(&invocation(&[]), &record).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![0, 50, 100]);
    }

    #[tokio::test]
    async fn test_run_propagates_engine_failure() {
        let handle = EngineHandle::new(CountingLoader {
            attempts: Arc::new(AtomicUsize::new(0)),
            fail_first: 0,
        });
        let lease = handle.try_lease().unwrap();
        let err = lease
            .run(&invocation(&["--fail"]), &|_: u8| {})
            .await
            .unwrap_err();
        assert!(matches!(err, ComposeError::EngineExecution { .. }));
    }

    #[test]
    fn test_lease_is_exclusive_across_sharers() {
        let handle = Arc::new(EngineHandle::new(CountingLoader {
            attempts: Arc::new(AtomicUsize::new(0)),
            fail_first: 0,
        }));
        let other = Arc::clone(&handle);

        let lease = handle.try_lease().unwrap();
        assert!(other.try_lease().is_none());
        assert!(other.is_leased());

        drop(lease);
        assert!(!handle.is_leased());
        assert!(other.try_lease().is_some());
    }
}
