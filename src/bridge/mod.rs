//! Cross-runtime call bridge
//!
//! Calls into the external exchange library are shipped as
//! `(function, positional args)` to one of a fixed set of supervised worker
//! processes:
//! - `protocol`: newline-delimited JSON request/response framing
//! - `worker`: channel and spawner seams, plus the Node.js spawner
//! - `pool`: the supervisor (dispatch, timeouts, crash restarts)
//! - `scripted`: in-process workers with scripted replies

pub mod pool;
pub mod protocol;
pub mod scripted;
pub mod worker;

pub use pool::{PoolConfig, PoolStats, PoolStatus, WorkerPool, WorkerState};
pub use protocol::{CallRequest, CallResponse, ReadyMessage};
pub use scripted::{Reply, ScriptedSpawner};
pub use worker::{ChannelError, LineChannel, NodeSpawner, WorkerChannel, WorkerSpawner};
