//! ccxt-bridge Library
//!
//! Unified cryptocurrency exchange API backed by a supervised pool of
//! Node.js workers running the ccxt library

pub mod bridge;
pub mod config;
pub mod credentials;
pub mod error;
pub mod exchange;
pub mod normalize;
pub mod telemetry;
pub mod types;

pub use bridge::{PoolConfig, WorkerPool};
pub use credentials::{Credential, RequiredCredentials};
pub use error::{Error, Result};
pub use exchange::ExchangeClient;
