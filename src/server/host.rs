//! Index administration for a host process
//!
//! Keeps one worker per indexed root and exposes the create / status / remove
//! operations, plus file notifications and search routed to the right worker.

use crate::index::snapshot::snapshot_path;
use crate::index::types::SearchHit;
use crate::server::client::{ClientError, ClientResult, IndexStatus, WorkerHandle};
use crate::utils::AppConfig;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Registry of running index workers keyed by canonical root
pub struct IndexHost {
    config: AppConfig,
    program: Option<PathBuf>,
    workers: Mutex<HashMap<PathBuf, Arc<WorkerHandle>>>,
}

impl IndexHost {
    /// Host whose workers run on background threads
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            program: None,
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Run each worker as a child process of `program` instead of a thread
    pub fn with_worker_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = Some(program.into());
        self
    }

    fn key(root: &Path) -> PathBuf {
        root.canonicalize().unwrap_or_else(|_| root.to_path_buf())
    }

    fn worker(&self, root: &Path) -> Option<Arc<WorkerHandle>> {
        let workers = self.workers.lock().ok()?;
        workers.get(&Self::key(root)).cloned()
    }

    /// Start indexing `root`, or report on the index already running there
    pub fn create_index(&self, root: &Path) -> ClientResult<IndexStatus> {
        let key = root.canonicalize()?;

        // held until the new worker is registered so one root never gets two
        let mut workers = self.workers.lock().map_err(|_| ClientError::NotRunning)?;
        if let Some(handle) = workers.get(&key).cloned() {
            drop(workers);
            return Ok(handle.init(None)?.into());
        }

        let handle = match &self.program {
            Some(program) => {
                WorkerHandle::spawn_process(program, &key, self.config.request_timeout())?
            }
            None => WorkerHandle::spawn(&key, self.config.index.clone(), self.config.request_timeout())?,
        };
        let status = handle.init(None)?;
        tracing::info!(root = %key.display(), status = ?status, "index created");

        let handle = Arc::new(handle);
        workers.insert(key, Arc::clone(&handle));
        // the router records each init-response before handing it over
        Ok(handle.status())
    }

    /// Readiness of the index for `root`
    pub fn get_status(&self, root: &Path) -> IndexStatus {
        self.worker(root)
            .map_or(IndexStatus::Unavailable, |handle| handle.status())
    }

    /// Stop the worker for `root` and delete its snapshot.
    ///
    /// Returns false if no index was running there.
    pub fn remove_index(&self, root: &Path) -> ClientResult<bool> {
        let key = Self::key(root);
        let handle = self
            .workers
            .lock()
            .map_err(|_| ClientError::NotRunning)?
            .remove(&key);

        let Some(handle) = handle else {
            return Ok(false);
        };
        handle.stop()?;

        match fs::remove_file(snapshot_path(&key, &self.config.index)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        tracing::info!(root = %key.display(), "index removed");
        Ok(true)
    }

    /// Forward a file change; returns false if `root` has no index
    pub fn add_file(&self, root: &Path, rel_path: &str) -> ClientResult<bool> {
        match self.worker(root) {
            Some(handle) => handle.add_file(rel_path).map(|()| true),
            None => Ok(false),
        }
    }

    /// Forward a file deletion; returns false if `root` has no index
    pub fn remove_file(&self, root: &Path, rel_path: &str) -> ClientResult<bool> {
        match self.worker(root) {
            Some(handle) => handle.remove_file(rel_path).map(|()| true),
            None => Ok(false),
        }
    }

    /// Search the index for `root`
    pub fn search(&self, root: &Path, query: &str) -> ClientResult<Vec<SearchHit>> {
        let handle = self.worker(root).ok_or(ClientError::NotReady)?;
        if handle.status() != IndexStatus::Available {
            return Err(ClientError::NotReady);
        }
        handle.search(query)
    }

    /// Stop every worker, keeping their snapshots
    pub fn shutdown(&self) {
        let handles: Vec<_> = match self.workers.lock() {
            Ok(mut workers) => workers.drain().map(|(_, h)| h).collect(),
            Err(_) => return,
        };

        for handle in handles {
            if let Err(e) = handle.stop() {
                tracing::warn!(root = %handle.root().display(), error = %e, "worker stop failed");
            }
        }
    }
}

impl Drop for IndexHost {
    fn drop(&mut self) {
        self.shutdown();
    }
}
