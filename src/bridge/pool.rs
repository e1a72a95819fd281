//! Worker pool supervisor
//!
//! Owns a fixed number of long-lived workers, hands each call to any ready
//! worker, and restarts workers that crash. Restarts back off exponentially;
//! a worker that cannot be brought back within the restart budget fails the
//! whole pool instead of spinning forever.

use futures_util::future::join_all;
use rand::Rng;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, error, info, warn};

use super::protocol::{CallRequest, CallResponse};
use super::worker::{ChannelError, WorkerChannel, WorkerSpawner};
use crate::error::{Error, Result};

/// Pool sizing and timing
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    /// Number of workers
    pub size: usize,
    /// Bound on a whole call: waiting for a worker plus execution
    pub call_timeout: Duration,
    /// Bound on one worker start, handshake included
    pub startup_timeout: Duration,
    /// Consecutive failed starts tolerated per worker
    pub max_restart_attempts: u32,
    pub restart_base_delay: Duration,
    pub restart_max_delay: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: 16,
            call_timeout: Duration::from_secs(30),
            startup_timeout: Duration::from_secs(30),
            max_restart_attempts: 5,
            restart_base_delay: Duration::from_millis(250),
            restart_max_delay: Duration::from_secs(10),
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.call_timeout.is_zero() {
            return Err(Error::PoolInitialization(
                "call timeout must be greater than zero".into(),
            ));
        }
        if self.startup_timeout.is_zero() {
            return Err(Error::PoolInitialization(
                "startup timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Delay before restart attempt `attempt` (1-based), with jitter.
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self
            .restart_base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        let capped = exp.min(self.restart_max_delay);
        let jitter_ms = (capped.as_millis() as u64 / 4).max(1);
        capped + Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Starting,
    Ready,
    Busy,
    Crashed,
    Stopped,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerState::Starting => write!(f, "starting"),
            WorkerState::Ready => write!(f, "ready"),
            WorkerState::Busy => write!(f, "busy"),
            WorkerState::Crashed => write!(f, "crashed"),
            WorkerState::Stopped => write!(f, "stopped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum PoolStatus {
    Running,
    /// Restart budget exhausted; every call fails fast
    Failed(String),
    Stopped,
}

/// Point-in-time view of the pool
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolStats {
    pub size: usize,
    pub starting: usize,
    pub ready: usize,
    pub busy: usize,
    pub crashed: usize,
    pub restarts: u64,
    pub calls_served: u64,
    pub status: PoolStatus,
}

struct Worker {
    id: usize,
    channel: Box<dyn WorkerChannel>,
}

struct Shared {
    config: PoolConfig,
    spawner: Arc<dyn WorkerSpawner>,
    idle_tx: mpsc::UnboundedSender<Worker>,
    idle_rx: AsyncMutex<mpsc::UnboundedReceiver<Worker>>,
    states: Mutex<Vec<WorkerState>>,
    status: watch::Sender<PoolStatus>,
    next_request_id: AtomicU64,
    restarts: AtomicU64,
    calls_served: AtomicU64,
}

impl Shared {
    fn states(&self) -> MutexGuard<'_, Vec<WorkerState>> {
        self.states.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, id: usize, state: WorkerState) {
        if let Some(slot) = self.states().get_mut(id) {
            *slot = state;
        }
    }

    fn is_running(&self) -> bool {
        matches!(*self.status.borrow(), PoolStatus::Running)
    }

    fn status_error(&self) -> Option<Error> {
        match &*self.status.borrow() {
            PoolStatus::Running => None,
            PoolStatus::Failed(reason) => Some(Error::PoolInitialization(reason.clone())),
            PoolStatus::Stopped => Some(Error::WorkerUnavailable("pool is shut down".into())),
        }
    }

    /// Marks the pool failed and stops every idle worker. Busy workers are
    /// stopped when their call returns.
    async fn fail(&self, reason: String) {
        error!(reason = %reason, "Worker pool failed");
        self.status.send_replace(PoolStatus::Failed(reason));
        let stopped = self.stop_idle().await;
        info!(stopped, "Stopped idle workers of failed pool");
    }

    /// Terminates everything in the idle queue.
    async fn stop_idle(&self) -> usize {
        let mut idle = self.idle_rx.lock().await;
        let mut stopped = 0usize;
        while let Ok(mut worker) = idle.try_recv() {
            worker.channel.terminate().await;
            self.set_state(worker.id, WorkerState::Stopped);
            stopped += 1;
        }
        stopped
    }

    /// Returns a healthy worker to the idle queue, or stops it if the pool
    /// is no longer running.
    async fn release(&self, mut worker: Worker) {
        if !self.is_running() {
            worker.channel.terminate().await;
            self.set_state(worker.id, WorkerState::Stopped);
            return;
        }

        self.set_state(worker.id, WorkerState::Ready);
        // receiver lives in `self`, send cannot fail
        let _ = self.idle_tx.send(worker);
        // a shutdown or failure may have drained the queue in between
        if !self.is_running() {
            self.stop_idle().await;
        }
    }

    /// Kills a worker that can no longer be trusted and restarts it in the
    /// background.
    async fn recycle(self: &Arc<Self>, mut worker: Worker, reason: &str) {
        let id = worker.id;
        warn!(worker = id, reason = %reason, "Worker crashed, restarting");
        self.set_state(id, WorkerState::Crashed);
        worker.channel.terminate().await;

        if !self.is_running() {
            self.set_state(id, WorkerState::Stopped);
            return;
        }

        let shared = self.clone();
        tokio::spawn(async move {
            match shared.start_worker(id).await {
                Ok(worker) => {
                    shared.restarts.fetch_add(1, Ordering::Relaxed);
                    shared.release(worker).await;
                }
                Err(e) => {
                    shared.set_state(id, WorkerState::Stopped);
                    if shared.is_running() {
                        shared.fail(e.reason()).await;
                    }
                }
            }
        });
    }

    /// Starts worker `id`, retrying with backoff until the budget runs out.
    async fn start_worker(&self, id: usize) -> Result<Worker> {
        let mut attempt: u32 = 0;
        loop {
            self.set_state(id, WorkerState::Starting);
            let reason = match timeout(self.config.startup_timeout, self.spawner.spawn(id)).await {
                Ok(Ok(channel)) => {
                    self.set_state(id, WorkerState::Ready);
                    info!(worker = id, attempt, "Worker ready");
                    return Ok(Worker { id, channel });
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!(
                    "no handshake within {}ms",
                    self.config.startup_timeout.as_millis()
                ),
            };

            self.set_state(id, WorkerState::Crashed);
            attempt += 1;
            if attempt > self.config.max_restart_attempts {
                return Err(Error::PoolInitialization(format!(
                    "worker {} failed to start after {} attempts: {}",
                    id, attempt, reason
                )));
            }
            if !self.is_running() {
                return Err(self
                    .status_error()
                    .unwrap_or_else(|| Error::WorkerUnavailable("pool stopped".into())));
            }

            let delay = self.config.backoff(attempt);
            warn!(
                worker = id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %reason,
                "Worker start failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// A worker taken out of the idle queue for one call.
///
/// Dropped while still holding the worker (the caller abandoned the call),
/// the worker is recycled: its stream may still carry the pending response.
struct Checkout {
    worker: Option<Worker>,
    shared: Arc<Shared>,
}

impl Checkout {
    async fn call(
        &mut self,
        request: &CallRequest,
    ) -> std::result::Result<CallResponse, ChannelError> {
        match self.worker.as_mut() {
            Some(worker) => worker.channel.call(request).await,
            None => Err(ChannelError::Closed),
        }
    }

    async fn release(mut self) {
        if let Some(worker) = self.worker.take() {
            self.shared.release(worker).await;
        }
    }

    async fn recycle(mut self, reason: &str) {
        if let Some(worker) = self.worker.take() {
            self.shared.recycle(worker, reason).await;
        }
    }
}

impl Drop for Checkout {
    fn drop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let id = worker.id;
        match Handle::try_current() {
            Ok(handle) => {
                let shared = self.shared.clone();
                handle.spawn(async move {
                    shared.recycle(worker, "caller abandoned the call").await;
                });
            }
            Err(_) => {
                // runtime gone; the channel's own drop kills the process
                self.shared.set_state(id, WorkerState::Stopped);
            }
        }
    }
}

/// Fixed-size pool of supervised workers.
///
/// Cloning is cheap; clones share the same workers.
#[derive(Clone)]
pub struct WorkerPool {
    shared: Arc<Shared>,
}

impl WorkerPool {
    /// Starts every worker concurrently and returns once all are ready.
    pub async fn start(config: PoolConfig, spawner: Arc<dyn WorkerSpawner>) -> Result<Self> {
        config.validate()?;

        let (idle_tx, idle_rx) = mpsc::unbounded_channel();
        let (status, _) = watch::channel(PoolStatus::Running);
        let shared = Arc::new(Shared {
            states: Mutex::new(vec![WorkerState::Starting; config.size]),
            config,
            spawner,
            idle_tx,
            idle_rx: AsyncMutex::new(idle_rx),
            status,
            next_request_id: AtomicU64::new(1),
            restarts: AtomicU64::new(0),
            calls_served: AtomicU64::new(0),
        });

        info!(size = shared.config.size, "Starting worker pool...");
        let results = join_all((0..shared.config.size).map(|id| shared.start_worker(id))).await;

        let mut workers = Vec::with_capacity(results.len());
        let mut failure = None;
        for result in results {
            match result {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    if failure.is_none() {
                        failure = Some(e);
                    }
                }
            }
        }

        if let Some(e) = failure {
            for mut worker in workers {
                worker.channel.terminate().await;
                shared.set_state(worker.id, WorkerState::Stopped);
            }
            shared.fail(e.reason()).await;
            return Err(Error::PoolInitialization(e.reason()));
        }

        for worker in workers {
            let _ = shared.idle_tx.send(worker);
        }

        info!(size = shared.config.size, "✅ Worker pool ready");
        Ok(Self { shared })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Runs `function(args...)` on the next free worker.
    ///
    /// Returns the raw library value. Worker crashes and timeouts come back
    /// as errors; the worker is restarted in the background. Dropping the
    /// returned future mid-call restarts the worker as well.
    pub async fn call(&self, function: &str, args: Vec<Value>) -> Result<Value> {
        let started = Instant::now();
        let deadline = started + self.shared.config.call_timeout;
        let request = CallRequest::new(
            self.shared.next_request_id.fetch_add(1, Ordering::Relaxed),
            function,
            args,
        );

        loop {
            let (id, mut checkout) = self.acquire(deadline).await?;
            self.shared.set_state(id, WorkerState::Busy);

            match timeout_at(deadline, checkout.call(&request)).await {
                Ok(Ok(response)) => {
                    checkout.release().await;
                    self.shared.calls_served.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        worker = id,
                        function,
                        ok = response.result.is_ok(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Call complete"
                    );
                    return response.result.map_err(Error::RemoteExecution);
                }
                Ok(Err(ChannelError::Encode(reason))) => {
                    checkout.release().await;
                    return Err(Error::Serialization(reason));
                }
                Ok(Err(ChannelError::Unsent(reason))) => {
                    // nothing reached the worker, another one may take it
                    warn!(worker = id, function, error = %reason, "Worker unreachable, redispatching");
                    checkout.recycle(&reason).await;
                }
                Ok(Err(ChannelError::Malformed(reason))) => {
                    checkout.recycle(&reason).await;
                    return Err(Error::Serialization(format!(
                        "worker {} sent an unreadable response: {}",
                        id, reason
                    )));
                }
                Ok(Err(e)) => {
                    let reason = e.to_string();
                    checkout.recycle(&reason).await;
                    return Err(Error::RemoteExecution(format!(
                        "worker {} crashed during {}: {}",
                        id, function, reason
                    )));
                }
                Err(_) => {
                    let waited = started.elapsed().as_millis();
                    checkout.recycle("call timed out").await;
                    return Err(Error::WorkerUnavailable(format!(
                        "{} timed out after {}ms",
                        function, waited
                    )));
                }
            }
        }
    }

    async fn acquire(&self, deadline: Instant) -> Result<(usize, Checkout)> {
        if let Some(e) = self.shared.status_error() {
            return Err(e);
        }

        let mut status = self.shared.status.subscribe();
        let next_idle = async {
            let mut idle = self.shared.idle_rx.lock().await;
            // wrapped while the lock is held so a cancelled acquire never
            // holds a bare worker
            idle.recv().await.map(|worker| {
                (
                    worker.id,
                    Checkout {
                        worker: Some(worker),
                        shared: self.shared.clone(),
                    },
                )
            })
        };

        tokio::select! {
            checkout = timeout_at(deadline, next_idle) => match checkout {
                Ok(Some(checkout)) => Ok(checkout),
                Ok(None) => Err(Error::WorkerUnavailable("pool closed".into())),
                Err(_) => Err(Error::WorkerUnavailable(format!(
                    "no worker became available within {}ms",
                    self.shared.config.call_timeout.as_millis()
                ))),
            },
            changed = status.wait_for(|s| !matches!(s, PoolStatus::Running)) => {
                drop(changed);
                Err(self
                    .shared
                    .status_error()
                    .unwrap_or_else(|| Error::WorkerUnavailable("pool stopped".into())))
            }
        }
    }

    pub fn status(&self) -> PoolStatus {
        self.shared.status.borrow().clone()
    }

    /// Current state of every worker, indexed by worker id
    pub fn states(&self) -> Vec<WorkerState> {
        self.shared.states().clone()
    }

    pub fn stats(&self) -> PoolStats {
        let states = self.states();
        let count = |wanted: WorkerState| states.iter().filter(|s| **s == wanted).count();
        PoolStats {
            size: self.shared.config.size,
            starting: count(WorkerState::Starting),
            ready: count(WorkerState::Ready),
            busy: count(WorkerState::Busy),
            crashed: count(WorkerState::Crashed),
            restarts: self.shared.restarts.load(Ordering::Relaxed),
            calls_served: self.shared.calls_served.load(Ordering::Relaxed),
            status: self.status(),
        }
    }

    /// Stops accepting calls and terminates idle workers. Busy workers are
    /// terminated as soon as their current call returns.
    pub async fn shutdown(&self) {
        if self.status() == PoolStatus::Stopped {
            return;
        }
        self.shared.status.send_replace(PoolStatus::Stopped);
        let stopped = self.shared.stop_idle().await;
        info!(stopped, "Worker pool shut down");
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.shared.config)
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mockall::mock;
    use serde_json::json;

    mock! {
        Spawner {}

        #[async_trait]
        impl WorkerSpawner for Spawner {
            async fn spawn(&self, worker_id: usize) -> std::result::Result<Box<dyn WorkerChannel>, ChannelError>;
        }
    }

    struct EchoChannel;

    #[async_trait]
    impl WorkerChannel for EchoChannel {
        async fn call(
            &mut self,
            request: &CallRequest,
        ) -> std::result::Result<CallResponse, ChannelError> {
            Ok(CallResponse::ok(request.id, json!(request.function)))
        }

        async fn terminate(&mut self) {}
    }

    fn fast_config(size: usize) -> PoolConfig {
        PoolConfig {
            size,
            call_timeout: Duration::from_millis(500),
            startup_timeout: Duration::from_millis(500),
            max_restart_attempts: 2,
            restart_base_delay: Duration::from_millis(1),
            restart_max_delay: Duration::from_millis(5),
        }
    }

    #[test]
    fn backoff_grows_and_caps() {
        let config = PoolConfig {
            restart_base_delay: Duration::from_millis(100),
            restart_max_delay: Duration::from_millis(1000),
            ..PoolConfig::default()
        };
        let first = config.backoff(1);
        assert!(first >= Duration::from_millis(100) && first < Duration::from_millis(126));
        let third = config.backoff(3);
        assert!(third >= Duration::from_millis(400));
        let capped = config.backoff(20);
        assert!(capped >= Duration::from_millis(1000) && capped < Duration::from_millis(1251));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = PoolConfig {
            call_timeout: Duration::ZERO,
            ..PoolConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::PoolInitialization(_))));
    }

    #[tokio::test]
    async fn start_retries_then_succeeds() {
        let mut spawner = MockSpawner::new();
        let mut seq = mockall::Sequence::new();
        spawner
            .expect_spawn()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(ChannelError::Spawn("node not ready".into())));
        spawner
            .expect_spawn()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Box::new(EchoChannel) as Box<dyn WorkerChannel>));

        let pool = WorkerPool::start(fast_config(1), Arc::new(spawner))
            .await
            .unwrap();
        assert_eq!(pool.states(), vec![WorkerState::Ready]);
        assert_eq!(pool.call("fetchTime", vec![]).await.unwrap(), json!("fetchTime"));
    }

    #[tokio::test]
    async fn start_gives_up_after_budget() {
        let mut spawner = MockSpawner::new();
        spawner
            .expect_spawn()
            .times(3)
            .returning(|_| Err(ChannelError::Spawn("cannot find module 'ccxt'".into())));

        let err = WorkerPool::start(fast_config(1), Arc::new(spawner))
            .await
            .unwrap_err();
        match err {
            Error::PoolInitialization(reason) => {
                assert!(reason.contains("after 3 attempts"), "{}", reason);
                assert!(reason.contains("cannot find module"), "{}", reason);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn stats_reflect_served_calls() {
        let mut spawner = MockSpawner::new();
        spawner
            .expect_spawn()
            .times(2)
            .returning(|_| Ok(Box::new(EchoChannel) as Box<dyn WorkerChannel>));
        let pool = WorkerPool::start(fast_config(2), Arc::new(spawner))
            .await
            .unwrap();

        pool.call("a", vec![]).await.unwrap();
        pool.call("b", vec![]).await.unwrap();
        let stats = pool.stats();
        assert_eq!(stats.size, 2);
        assert_eq!(stats.ready, 2);
        assert_eq!(stats.calls_served, 2);
        assert_eq!(stats.status, PoolStatus::Running);

        pool.shutdown().await;
        assert_eq!(pool.states(), vec![WorkerState::Stopped; 2]);
        assert!(matches!(
            pool.call("c", vec![]).await,
            Err(Error::WorkerUnavailable(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn shutdown_racing_releases_leaves_no_live_worker() {
        let mut spawner = MockSpawner::new();
        spawner
            .expect_spawn()
            .times(4)
            .returning(|_| Ok(Box::new(EchoChannel) as Box<dyn WorkerChannel>));
        let pool = WorkerPool::start(fast_config(4), Arc::new(spawner))
            .await
            .unwrap();

        let callers: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                tokio::spawn(async move {
                    for _ in 0..200 {
                        if pool.call("fetchTime", vec![]).await.is_err() {
                            break;
                        }
                    }
                })
            })
            .collect();
        tokio::task::yield_now().await;
        pool.shutdown().await;
        for caller in callers {
            caller.await.unwrap();
        }

        assert_eq!(pool.states(), vec![WorkerState::Stopped; 4]);
    }
}
