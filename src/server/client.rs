//! Host-side handle to one index worker
//!
//! The worker runs either on a dedicated thread or as a child process
//! (`treeidx worker --root <dir>`). Requests carry a msg id; a router thread
//! reads every reply, hands correlated ones to whoever is waiting for that id
//! and tracks the worker's readiness from `init-response` replies.

use crate::error::IndexError;
use crate::index::types::{IndexConfig, SearchHit};
use crate::server::protocol::{
    InitOptions, InitStatus, Message, MsgId, Reply, WorkerState, read_message, write_message,
};
use crate::server::worker::{Worker, run_channel};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in client operations
#[derive(Debug, Error)]
pub enum ClientError {
    /// Worker has exited or its channel is closed
    #[error("Index worker is not running")]
    NotRunning,
    /// Communication error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Worker returned an error
    #[error("Worker error: {0}")]
    Worker(String),
    /// Reply did not match the request
    #[error("Invalid response from worker")]
    InvalidResponse,
    /// No reply within the request timeout
    #[error("Timed out waiting for the index worker")]
    Timeout,
    /// Index exists but is still being built
    #[error("Index is not ready")]
    NotReady,
    /// Worker could not be constructed
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Readiness of an index as seen by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexStatus {
    Available,
    Indexing,
    Unavailable,
}

impl fmt::Display for IndexStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IndexStatus::Available => "available",
            IndexStatus::Indexing => "indexing",
            IndexStatus::Unavailable => "unavailable",
        };
        f.write_str(s)
    }
}

impl From<InitStatus> for IndexStatus {
    fn from(status: InitStatus) -> Self {
        match status {
            InitStatus::Ready => IndexStatus::Available,
            InitStatus::Indexing => IndexStatus::Indexing,
        }
    }
}

/// Where requests go
enum Outbox {
    Thread(mpsc::Sender<Message>),
    Process(Mutex<BufWriter<ChildStdin>>),
}

impl Outbox {
    fn send(&self, msg: Message) -> ClientResult<()> {
        match self {
            Outbox::Thread(tx) => tx.send(msg).map_err(|_| ClientError::NotRunning),
            Outbox::Process(writer) => {
                let mut writer = writer.lock().map_err(|_| ClientError::NotRunning)?;
                write_message(&mut *writer, &msg)?;
                Ok(())
            }
        }
    }
}

/// What keeps the worker alive
enum Runner {
    Thread(JoinHandle<()>),
    Process(Child),
}

/// State shared with the router thread
struct Shared {
    pending: Mutex<HashMap<MsgId, mpsc::Sender<Reply>>>,
    status: Mutex<IndexStatus>,
}

impl Shared {
    fn set_status(&self, status: IndexStatus) {
        if let Ok(mut current) = self.status.lock() {
            *current = status;
        }
    }

    fn route(&self, reply: Reply) {
        match &reply {
            Reply::InitResponse { message, .. } => self.set_status((*message).into()),
            Reply::Stopped => self.set_status(IndexStatus::Unavailable),
            Reply::Error { msg_id, message } => {
                // a build that fails after announcing `indexing` never becomes ready
                if let Ok(mut current) = self.status.lock()
                    && *current == IndexStatus::Indexing
                {
                    *current = IndexStatus::Unavailable;
                }
                if msg_id.is_none() {
                    tracing::warn!(error = %message, "worker reported an error");
                }
            }
            _ => {}
        }

        let Some(msg_id) = reply.msg_id() else {
            return;
        };
        if let Ok(pending) = self.pending.lock()
            && let Some(tx) = pending.get(&msg_id)
        {
            let _ = tx.send(reply);
        }
    }
}

/// Connection to one running worker
pub struct WorkerHandle {
    root: PathBuf,
    outbox: Outbox,
    shared: Arc<Shared>,
    next_id: AtomicU64,
    timeout: Duration,
    router: Mutex<Option<JoinHandle<()>>>,
    runner: Mutex<Option<Runner>>,
}

impl WorkerHandle {
    /// Run a worker for `root` on a background thread
    pub fn spawn(root: &Path, config: IndexConfig, timeout: Duration) -> ClientResult<Self> {
        let worker = Worker::new(root, config)?;
        let (msg_tx, msg_rx) = mpsc::channel::<Message>();
        let (reply_tx, reply_rx) = mpsc::channel::<Reply>();

        let label = root.display().to_string();
        let runner = thread::Builder::new()
            .name("treeidx-worker".to_string())
            .spawn(move || {
                let mut out = reply_tx;
                if let Err(e) = run_channel(worker, msg_rx, &mut out) {
                    tracing::error!(root = %label, error = %e, "worker exited with error");
                }
            })?;

        Self::start(
            root,
            Outbox::Thread(msg_tx),
            Runner::Thread(runner),
            Box::new(reply_rx.into_iter()),
            timeout,
        )
    }

    /// Run a worker for `root` as a child process of `program`
    pub fn spawn_process(program: &Path, root: &Path, timeout: Duration) -> ClientResult<Self> {
        let mut child = Command::new(program)
            .arg("worker")
            .arg("--root")
            .arg(root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;

        let stdin = child.stdin.take().ok_or(ClientError::NotRunning)?;
        let stdout = child.stdout.take().ok_or(ClientError::NotRunning)?;
        let mut reader = BufReader::new(stdout);
        let replies = std::iter::from_fn(move || read_message::<_, Reply>(&mut reader).ok());

        Self::start(
            root,
            Outbox::Process(Mutex::new(BufWriter::new(stdin))),
            Runner::Process(child),
            Box::new(replies),
            timeout,
        )
    }

    fn start(
        root: &Path,
        outbox: Outbox,
        runner: Runner,
        replies: Box<dyn Iterator<Item = Reply> + Send>,
        timeout: Duration,
    ) -> ClientResult<Self> {
        let shared = Arc::new(Shared {
            pending: Mutex::new(HashMap::new()),
            status: Mutex::new(IndexStatus::Unavailable),
        });

        let router_shared = Arc::clone(&shared);
        let router = thread::Builder::new()
            .name("treeidx-router".to_string())
            .spawn(move || {
                for reply in replies {
                    router_shared.route(reply);
                }
                router_shared.set_status(IndexStatus::Unavailable);
                // dropping the senders wakes every waiter
                if let Ok(mut pending) = router_shared.pending.lock() {
                    pending.clear();
                }
            })?;

        Ok(Self {
            root: root.to_path_buf(),
            outbox,
            shared,
            next_id: AtomicU64::new(1),
            timeout,
            router: Mutex::new(Some(router)),
            runner: Mutex::new(Some(runner)),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Readiness as last reported by the worker
    pub fn status(&self) -> IndexStatus {
        self.shared
            .status
            .lock()
            .map(|s| *s)
            .unwrap_or(IndexStatus::Unavailable)
    }

    /// Send `init` and wait for the first reply.
    ///
    /// A cold build answers `Indexing` right away; readiness is reported
    /// later through [`status`](Self::status).
    pub fn init(&self, options: Option<InitOptions>) -> ClientResult<InitStatus> {
        let reply = self.request(|msg_id| Message::Init {
            msg_id: Some(msg_id),
            options,
        })?;

        match reply {
            Reply::InitResponse { message, .. } => Ok(message),
            Reply::Error { message, .. } => Err(ClientError::Worker(message)),
            _ => Err(ClientError::InvalidResponse),
        }
    }

    /// Ask the worker for its state and document count
    pub fn probe(&self) -> ClientResult<(WorkerState, usize)> {
        let reply = self.request(|msg_id| Message::Status {
            msg_id: Some(msg_id),
        })?;

        match reply {
            Reply::StatusResponse {
                message, documents, ..
            } => Ok((message, documents)),
            Reply::Error { message, .. } => Err(ClientError::Worker(message)),
            _ => Err(ClientError::InvalidResponse),
        }
    }

    /// Queue a file for (re-)indexing without waiting
    pub fn add_file(&self, rel_path: &str) -> ClientResult<()> {
        self.outbox.send(Message::AddFile {
            idx_rel_path: rel_path.to_string(),
            msg_id: None,
        })
    }

    /// Queue a file for removal without waiting
    pub fn remove_file(&self, rel_path: &str) -> ClientResult<()> {
        self.outbox.send(Message::RemoveFile {
            idx_rel_path: rel_path.to_string(),
            msg_id: None,
        })
    }

    /// Execute a search query
    pub fn search(&self, query: &str) -> ClientResult<Vec<SearchHit>> {
        let reply = self.request(|msg_id| Message::Search {
            query: query.to_string(),
            msg_id,
        })?;

        match reply {
            Reply::SearchResponse { message, .. } => Ok(message),
            Reply::NotReady { .. } => Err(ClientError::NotReady),
            Reply::Error { message, .. } => Err(ClientError::Worker(message)),
            _ => Err(ClientError::InvalidResponse),
        }
    }

    /// Ask the worker to flush and exit, then wait for it
    pub fn stop(&self) -> ClientResult<()> {
        let sent = self.outbox.send(Message::Stop);

        if let Some(router) = self.router.lock().ok().and_then(|mut r| r.take()) {
            let _ = router.join();
        }

        match self.runner.lock().ok().and_then(|mut r| r.take()) {
            Some(Runner::Thread(handle)) => {
                let _ = handle.join();
            }
            Some(Runner::Process(mut child)) => {
                child.wait()?;
            }
            None => {}
        }

        self.shared.set_status(IndexStatus::Unavailable);
        match sent {
            Err(ClientError::NotRunning) => Ok(()),
            other => other,
        }
    }

    /// Send a correlated request and wait for its reply
    fn request(&self, build: impl FnOnce(MsgId) -> Message) -> ClientResult<Reply> {
        let msg_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel();

        self.shared
            .pending
            .lock()
            .map_err(|_| ClientError::NotRunning)?
            .insert(msg_id, tx);

        let result = self.outbox.send(build(msg_id)).and_then(|()| {
            rx.recv_timeout(self.timeout).map_err(|e| match e {
                RecvTimeoutError::Timeout => ClientError::Timeout,
                RecvTimeoutError::Disconnected => ClientError::NotRunning,
            })
        });

        if let Ok(mut pending) = self.shared.pending.lock() {
            pending.remove(&msg_id);
        }
        result
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        let running = self.runner.lock().map(|r| r.is_some()).unwrap_or(false);
        if running {
            let _ = self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Instant;
    use tempfile::TempDir;

    fn spawn(dir: &TempDir) -> WorkerHandle {
        WorkerHandle::spawn(dir.path(), IndexConfig::default(), Duration::from_secs(10)).unwrap()
    }

    fn wait_available(handle: &WorkerHandle) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while handle.status() != IndexStatus::Available {
            assert!(Instant::now() < deadline, "worker never became available");
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_status_follows_init_responses() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.js"), "apple").unwrap();

        let handle = spawn(&dir);
        assert_eq!(handle.status(), IndexStatus::Unavailable);

        assert_eq!(handle.init(None).unwrap(), InitStatus::Indexing);
        wait_available(&handle);

        let hits = handle.search("apple").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].reference, "a.js");

        handle.stop().unwrap();
        assert_eq!(handle.status(), IndexStatus::Unavailable);
    }

    #[test]
    fn test_fire_and_forget_updates_are_ordered() {
        let dir = TempDir::new().unwrap();
        let handle = spawn(&dir);
        handle.init(None).unwrap();

        fs::write(dir.path().join("b.md"), "banana").unwrap();
        handle.add_file("b.md").unwrap();
        // processed before the search that follows it
        assert_eq!(handle.search("banana").unwrap()[0].reference, "b.md");

        handle.remove_file("b.md").unwrap();
        assert!(handle.search("banana").unwrap().is_empty());
    }

    #[test]
    fn test_probe_reports_documents() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.js"), "apple").unwrap();
        fs::write(dir.path().join("b.js"), "banana").unwrap();

        let handle = spawn(&dir);
        assert_eq!(handle.probe().unwrap(), (WorkerState::Ready, 2));
    }

    #[test]
    fn test_requests_after_stop_fail() {
        let dir = TempDir::new().unwrap();
        let handle = spawn(&dir);
        handle.stop().unwrap();

        assert!(matches!(handle.search("x"), Err(ClientError::NotRunning)));
        assert!(handle.stop().is_ok());
    }

    #[test]
    fn test_index_status_display() {
        assert_eq!(IndexStatus::Available.to_string(), "available");
        assert_eq!(IndexStatus::from(InitStatus::Indexing), IndexStatus::Indexing);
    }

    #[test]
    fn test_failed_build_leaves_indexing() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("plain.txt");
        fs::write(&file, "not a directory").unwrap();

        let handle =
            WorkerHandle::spawn(&file, IndexConfig::default(), Duration::from_secs(10)).unwrap();
        assert_eq!(handle.init(None).unwrap(), InitStatus::Indexing);

        let deadline = Instant::now() + Duration::from_secs(10);
        while handle.status() != IndexStatus::Unavailable {
            assert!(Instant::now() < deadline, "status stuck at {}", handle.status());
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_error_after_ready_keeps_status() {
        let shared = Shared {
            pending: Mutex::new(HashMap::new()),
            status: Mutex::new(IndexStatus::Unavailable),
        };
        shared.route(Reply::InitResponse {
            msg_id: Some(1),
            message: InitStatus::Ready,
        });
        shared.route(Reply::error(Some(2), "addFile failed"));
        assert_eq!(*shared.status.lock().unwrap(), IndexStatus::Available);

        shared.route(Reply::InitResponse {
            msg_id: Some(3),
            message: InitStatus::Indexing,
        });
        shared.route(Reply::error(Some(3), "build failed"));
        assert_eq!(*shared.status.lock().unwrap(), IndexStatus::Unavailable);
    }
}
