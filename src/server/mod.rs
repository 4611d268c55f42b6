//! Worker protocol and hosting
//!
//! Architecture:
//! - `worker`: owns the engine for one root, answers protocol messages in order
//! - `client`: host-side handle to a worker running on a thread or in a child process
//! - `host`: one worker per root, with create / status / remove administration

pub mod client;
pub mod host;
pub mod protocol;
pub mod worker;

pub use client::{ClientError, ClientResult, IndexStatus, WorkerHandle};
pub use host::IndexHost;
pub use protocol::{InitOptions, InitStatus, Message, MsgId, Reply, WorkerState};
pub use worker::{Worker, serve_framed};
