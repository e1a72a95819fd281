//! In-process scripted workers
//!
//! Speaks the real line protocol over in-memory pipes, with replies decided
//! by a closure instead of the exchange library. Used to exercise the pool
//! and the facade without Node, and to inject crashes and hangs.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::task::JoinHandle;

use super::protocol::{CallRequest, CallResponse, ReadyMessage};
use super::worker::{ChannelError, LineChannel, WorkerChannel, WorkerSpawner};

/// What a scripted worker does with one request
#[derive(Debug, Clone)]
pub enum Reply {
    Ok(Value),
    Error(String),
    /// Reply after a pause
    Delayed(Duration, Value),
    /// Exit without replying
    Crash,
    /// Never reply
    Hang,
}

type Handler = dyn Fn(usize, &str, &[Value]) -> Reply + Send + Sync;

/// Spawns scripted workers; the handler sees `(worker_id, function, args)`.
pub struct ScriptedSpawner {
    handler: Arc<Handler>,
    spawned: AtomicUsize,
    failing_spawns: AtomicUsize,
}

impl ScriptedSpawner {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(usize, &str, &[Value]) -> Reply + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
            spawned: AtomicUsize::new(0),
            failing_spawns: AtomicUsize::new(0),
        }
    }

    /// Makes the next `n` spawns fail.
    pub fn fail_next_spawns(&self, n: usize) {
        self.failing_spawns.store(n, Ordering::SeqCst);
    }

    /// Successful spawns so far, restarts included
    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> bool {
        self.failing_spawns
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl WorkerSpawner for ScriptedSpawner {
    async fn spawn(&self, worker_id: usize) -> Result<Box<dyn WorkerChannel>, ChannelError> {
        if self.take_failure() {
            return Err(ChannelError::Spawn(format!(
                "scripted worker {} refused to start",
                worker_id
            )));
        }

        let (client_out, worker_in) = duplex(64 * 1024);
        let (worker_out, client_in) = duplex(64 * 1024);
        let task = tokio::spawn(run_worker(
            worker_id,
            self.handler.clone(),
            worker_in,
            worker_out,
        ));

        let mut inner = LineChannel::new(client_in, client_out);
        inner.handshake().await?;
        self.spawned.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedChannel { inner, task }))
    }
}

async fn run_worker(
    worker_id: usize,
    handler: Arc<Handler>,
    input: DuplexStream,
    mut output: DuplexStream,
) {
    let ready = ReadyMessage {
        ready: true,
        version: Some("scripted".to_string()),
    };
    let Ok(mut line) = serde_json::to_string(&ready) else {
        return;
    };
    line.push('\n');
    if output.write_all(line.as_bytes()).await.is_err() {
        return;
    }

    let mut lines = BufReader::new(input).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let Ok(request) = serde_json::from_str::<CallRequest>(&line) else {
            continue;
        };

        let response = match handler(worker_id, &request.function, &request.args) {
            Reply::Ok(value) => CallResponse::ok(request.id, value),
            Reply::Error(reason) => CallResponse::error(request.id, reason),
            Reply::Delayed(pause, value) => {
                tokio::time::sleep(pause).await;
                CallResponse::ok(request.id, value)
            }
            Reply::Crash => return,
            Reply::Hang => std::future::pending().await,
        };

        let Ok(reply) = response.to_line() else {
            return;
        };
        if output.write_all(reply.as_bytes()).await.is_err() {
            return;
        }
    }
}

struct ScriptedChannel {
    inner: LineChannel<DuplexStream, DuplexStream>,
    task: JoinHandle<()>,
}

#[async_trait]
impl WorkerChannel for ScriptedChannel {
    async fn call(&mut self, request: &CallRequest) -> Result<CallResponse, ChannelError> {
        self.inner.call(request).await
    }

    async fn terminate(&mut self) {
        self.task.abort();
        self.inner.terminate().await;
    }
}

impl Drop for ScriptedChannel {
    fn drop(&mut self) {
        self.task.abort();
    }
}
