//! Worker processes and the channels used to talk to them

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, Command};

use super::protocol::{CallRequest, CallResponse, ReadyMessage};

/// Failures on the channel to one worker
#[derive(Error, Debug)]
pub enum ChannelError {
    /// The request never reached the worker; it is safe to retry elsewhere.
    #[error("request not delivered: {0}")]
    Unsent(String),

    #[error("request could not be encoded: {0}")]
    Encode(String),

    #[error("worker closed its output")]
    Closed,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed worker message: {0}")]
    Malformed(String),

    #[error("response id {got} does not match request {expected}")]
    Desync { expected: u64, got: u64 },

    #[error("worker failed to start: {0}")]
    Spawn(String),
}

/// A live connection to one worker
#[async_trait]
pub trait WorkerChannel: Send {
    /// Sends one request and waits for its response.
    async fn call(&mut self, request: &CallRequest) -> Result<CallResponse, ChannelError>;

    /// Stops the worker. Must be safe to call on an already dead worker.
    async fn terminate(&mut self);
}

/// Creates ready-to-use workers for the pool
#[async_trait]
pub trait WorkerSpawner: Send + Sync {
    /// Starts worker `worker_id` and returns once its handshake completed.
    async fn spawn(&self, worker_id: usize) -> Result<Box<dyn WorkerChannel>, ChannelError>;
}

/// Newline-delimited JSON channel over any reader/writer pair
pub struct LineChannel<R, W> {
    lines: Lines<BufReader<R>>,
    writer: W,
    child: Option<Child>,
}

impl<R, W> LineChannel<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
            child: None,
        }
    }

    /// Ties the channel to a child process, killed on `terminate`.
    pub fn with_child(mut self, child: Child) -> Self {
        self.child = Some(child);
        self
    }

    /// Next JSON line from the worker. Anything that is not a JSON object
    /// (stray library output) is skipped.
    async fn next_message(&mut self) -> Result<String, ChannelError> {
        loop {
            match self.lines.next_line().await? {
                None => return Err(ChannelError::Closed),
                Some(line) => {
                    let trimmed = line.trim();
                    if trimmed.starts_with('{') {
                        return Ok(line);
                    }
                    if !trimmed.is_empty() {
                        tracing::debug!(line = %trimmed, "Skipping non-protocol worker output");
                    }
                }
            }
        }
    }

    /// Waits for the worker's ready line.
    pub async fn handshake(&mut self) -> Result<ReadyMessage, ChannelError> {
        let line = self.next_message().await?;
        ReadyMessage::parse(&line).map_err(ChannelError::Malformed)
    }
}

#[async_trait]
impl<R, W> WorkerChannel for LineChannel<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn call(&mut self, request: &CallRequest) -> Result<CallResponse, ChannelError> {
        let line = request
            .to_line()
            .map_err(|e| ChannelError::Encode(e.to_string()))?;

        if let Err(e) = self.writer.write_all(line.as_bytes()).await {
            return Err(ChannelError::Unsent(e.to_string()));
        }
        if let Err(e) = self.writer.flush().await {
            return Err(ChannelError::Unsent(e.to_string()));
        }

        let reply = self.next_message().await?;
        let response = CallResponse::parse(&reply).map_err(ChannelError::Malformed)?;
        if response.id != request.id {
            return Err(ChannelError::Desync {
                expected: request.id,
                got: response.id,
            });
        }
        Ok(response)
    }

    async fn terminate(&mut self) {
        let _ = self.writer.shutdown().await;
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                tracing::debug!(error = %e, "Worker process already gone");
            }
        }
    }
}

/// Spawns `node <worker_script>` processes that load the exchange library
#[derive(Debug, Clone)]
pub struct NodeSpawner {
    pub node_path: PathBuf,
    pub worker_script: PathBuf,
    /// Exported as `NODE_PATH` so the script can resolve the library
    pub library_path: Option<PathBuf>,
}

impl NodeSpawner {
    pub fn new(node_path: impl Into<PathBuf>, worker_script: impl Into<PathBuf>) -> Self {
        Self {
            node_path: node_path.into(),
            worker_script: worker_script.into(),
            library_path: None,
        }
    }

    pub fn library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_path = Some(path.into());
        self
    }

    fn command(&self, worker_id: usize) -> Command {
        let mut cmd = Command::new(&self.node_path);
        cmd.arg(&self.worker_script)
            .env("BRIDGE_WORKER_ID", worker_id.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(path) = &self.library_path {
            cmd.env("NODE_PATH", path);
        }
        cmd
    }
}

#[async_trait]
impl WorkerSpawner for NodeSpawner {
    async fn spawn(&self, worker_id: usize) -> Result<Box<dyn WorkerChannel>, ChannelError> {
        let mut child = self.command(worker_id).spawn().map_err(|e| {
            ChannelError::Spawn(format!("{}: {}", self.node_path.display(), e))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ChannelError::Spawn("worker stdin not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ChannelError::Spawn("worker stdout not captured".into()))?;

        // Library warnings and crash traces end up here
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::warn!(worker = worker_id, stderr = %line, "Worker stderr");
                }
            });
        }

        let mut channel = LineChannel::new(stdout, stdin).with_child(child);
        let ready = match channel.handshake().await {
            Ok(ready) => ready,
            Err(e) => {
                channel.terminate().await;
                return Err(e);
            }
        };

        tracing::debug!(
            worker = worker_id,
            library_version = ?ready.version,
            "Worker handshake complete"
        );
        Ok(Box::new(channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::duplex;

    #[tokio::test]
    async fn line_channel_round_trip() {
        let (client_out, mut worker_in) = duplex(1024);
        let (mut worker_out, client_in) = duplex(1024);
        let mut channel = LineChannel::new(client_in, client_out);

        let worker = tokio::spawn(async move {
            worker_out
                .write_all(b"{\"ready\":true}\nsome banner\n")
                .await
                .unwrap();
            let mut lines = BufReader::new(&mut worker_in).lines();
            let line = lines.next_line().await.unwrap().unwrap();
            let req: CallRequest = serde_json::from_str(&line).unwrap();
            let reply = CallResponse::ok(req.id, json!(req.args.len()))
                .to_line()
                .unwrap();
            worker_out.write_all(reply.as_bytes()).await.unwrap();
        });

        channel.handshake().await.unwrap();
        let response = channel
            .call(&CallRequest::new(11, "fetchTime", vec![json!("kraken")]))
            .await
            .unwrap();
        assert_eq!(response, CallResponse::ok(11, json!(1)));
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn eof_is_closed() {
        let (client_out, _worker_in) = duplex(1024);
        let (worker_out, client_in) = duplex(1024);
        drop(worker_out);
        let mut channel = LineChannel::new(client_in, client_out);
        let err = channel
            .call(&CallRequest::new(1, "fetchTime", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Closed));
    }

    #[tokio::test]
    async fn mismatched_id_is_desync() {
        let (client_out, _worker_in) = duplex(1024);
        let (mut worker_out, client_in) = duplex(1024);
        worker_out
            .write_all(b"{\"id\":99,\"ok\":null}\n")
            .await
            .unwrap();
        let mut channel = LineChannel::new(client_in, client_out);
        let err = channel
            .call(&CallRequest::new(1, "fetchTime", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Desync { expected: 1, got: 99 }));
    }

    #[tokio::test]
    async fn missing_node_binary_fails_spawn() {
        let spawner = NodeSpawner::new("/nonexistent/node-binary", "bridge/worker.js");
        let err = spawner.spawn(0).await.err().unwrap();
        assert!(matches!(err, ChannelError::Spawn(_)));
    }
}
