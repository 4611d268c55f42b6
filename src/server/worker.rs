//! Index worker
//!
//! Owns one engine for one root and processes protocol messages strictly in
//! arrival order. A worker runs either on a thread (fed by channels) or as a
//! child process speaking framed JSON over stdin/stdout.

use crate::error::{IndexError, Result};
use crate::index::build::build_index;
use crate::index::content::{DocumentStream, normalize_rel_path};
use crate::index::engine::SearchIndex;
use crate::index::snapshot;
use crate::index::types::{IndexConfig, SearchHit};
use crate::server::protocol::{
    InitOptions, InitStatus, Message, MsgId, Reply, WorkerState, read_frame, write_message,
};
use crate::utils::Tokenizer;
use lru::LruCache;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

/// Destination for worker replies
pub trait ReplySink {
    fn send(&mut self, reply: Reply) -> Result<()>;
}

impl ReplySink for mpsc::Sender<Reply> {
    fn send(&mut self, reply: Reply) -> Result<()> {
        mpsc::Sender::send(self, reply).map_err(|_| {
            IndexError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "host disconnected"))
        })
    }
}

impl ReplySink for Vec<Reply> {
    fn send(&mut self, reply: Reply) -> Result<()> {
        self.push(reply);
        Ok(())
    }
}

/// Length-prefixed JSON frames on a byte stream
pub struct FramedSink<W: Write>(pub W);

impl<W: Write> ReplySink for FramedSink<W> {
    fn send(&mut self, reply: Reply) -> Result<()> {
        write_message(&mut self.0, &reply)?;
        Ok(())
    }
}

/// Whether the worker loop keeps running after a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// State and engine for one indexed root
pub struct Worker {
    root: PathBuf,
    config: IndexConfig,
    tokenizer: Tokenizer,
    state: WorkerState,
    index: Option<SearchIndex>,
    cache: Option<LruCache<String, Vec<SearchHit>>>,
}

impl Worker {
    /// Create an uninitialized worker. Fails if the configured tokenizer is
    /// not registered.
    pub fn new(root: impl Into<PathBuf>, config: IndexConfig) -> Result<Self> {
        let tokenizer = resolve_tokenizer(&config.tokenizer)?;
        let cache = NonZeroUsize::new(config.query_cache_size).map(LruCache::new);

        Ok(Self {
            root: root.into(),
            config,
            tokenizer,
            state: WorkerState::Uninitialized,
            index: None,
            cache,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn index(&self) -> Option<&SearchIndex> {
        self.index.as_ref()
    }

    pub fn snapshot_path(&self) -> PathBuf {
        snapshot::snapshot_path(&self.root, &self.config)
    }

    /// Process one message. Errors are returned only when the sink fails;
    /// everything else is reported through replies.
    pub fn handle(&mut self, msg: Message, out: &mut impl ReplySink) -> Result<Flow> {
        if self.state == WorkerState::Stopped {
            return Ok(Flow::Stop);
        }

        let msg = match msg {
            Message::Init { msg_id, options } => {
                self.init(msg_id, options, out)?;
                return Ok(Flow::Continue);
            }
            other => other,
        };

        self.ensure_initialized(out)?;

        match msg {
            Message::Init { .. } => unreachable!("handled above"),
            Message::AddFile { idx_rel_path, msg_id } => {
                if let Err(e) = self.add_file(&idx_rel_path) {
                    tracing::warn!(path = %idx_rel_path, error = %e, "addFile failed");
                    out.send(Reply::error(msg_id, e.to_string()))?;
                }
            }
            Message::RemoveFile { idx_rel_path, msg_id } => {
                if let Err(e) = self.remove_file(&idx_rel_path) {
                    tracing::warn!(path = %idx_rel_path, error = %e, "removeFile failed");
                    out.send(Reply::error(msg_id, e.to_string()))?;
                }
            }
            Message::Search { query, msg_id } => match self.search(&query) {
                Ok(hits) => out.send(Reply::SearchResponse {
                    msg_id,
                    message: hits,
                })?,
                Err(_) => out.send(Reply::NotReady {
                    msg_id: Some(msg_id),
                })?,
            },
            Message::Status { msg_id } => out.send(Reply::StatusResponse {
                msg_id,
                message: self.state,
                documents: self.index.as_ref().map_or(0, SearchIndex::len),
            })?,
            Message::Stop => {
                if let Err(e) = self.persist() {
                    tracing::error!(error = %e, "final snapshot write failed");
                    out.send(Reply::error(None, e.to_string()))?;
                }
                self.state = WorkerState::Stopped;
                tracing::info!(root = %self.root.display(), "worker stopped");
                out.send(Reply::Stopped)?;
                return Ok(Flow::Stop);
            }
            Message::Unknown => out.send(Reply::error(None, "Unknown message type"))?,
        }

        Ok(Flow::Continue)
    }

    /// Run the initialization sequence if nothing has started it yet
    pub fn ensure_initialized(&mut self, out: &mut impl ReplySink) -> Result<()> {
        if self.state == WorkerState::Uninitialized {
            tracing::debug!("implicit init");
            self.init(None, None, out)?;
        }
        Ok(())
    }

    fn init(
        &mut self,
        msg_id: Option<MsgId>,
        options: Option<InitOptions>,
        out: &mut impl ReplySink,
    ) -> Result<()> {
        if self.state == WorkerState::Ready {
            if options.is_some() {
                tracing::debug!("ignoring init options, index already loaded");
            }
            return out.send(Reply::InitResponse {
                msg_id,
                message: InitStatus::Ready,
            });
        }

        if let Some(options) = options
            && let Err(e) = self.apply_options(options)
        {
            return out.send(Reply::error(msg_id, e.to_string()));
        }

        self.state = WorkerState::Initializing;
        self.clear_cache();

        let path = self.snapshot_path();
        match snapshot::load(&path, self.tokenizer, self.config.scoring.clone()) {
            Ok(index) => {
                tracing::info!(root = %self.root.display(), docs = index.len(), "loaded snapshot");
                self.index = Some(index);
                self.state = WorkerState::Ready;
                return out.send(Reply::InitResponse {
                    msg_id,
                    message: InitStatus::Ready,
                });
            }
            Err(IndexError::Read { ref source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                tracing::info!(root = %self.root.display(), "no snapshot, building index");
            }
            Err(e) => {
                tracing::warn!(root = %self.root.display(), error = %e, "snapshot unusable, rebuilding");
            }
        }

        out.send(Reply::InitResponse {
            msg_id,
            message: InitStatus::Indexing,
        })?;

        match build_index(&self.root, &self.config, self.tokenizer, true) {
            Ok((index, _report)) => {
                self.index = Some(index);
                self.state = WorkerState::Ready;
                if let Err(e) = self.persist() {
                    tracing::error!(error = %e, "snapshot write failed");
                    out.send(Reply::error(msg_id, e.to_string()))?;
                }
                out.send(Reply::InitResponse {
                    msg_id,
                    message: InitStatus::Ready,
                })
            }
            Err(e) => {
                tracing::error!(root = %self.root.display(), error = %e, "index build failed");
                self.state = WorkerState::Uninitialized;
                out.send(Reply::error(msg_id, e.to_string()))
            }
        }
    }

    fn apply_options(&mut self, options: InitOptions) -> Result<()> {
        if let Some(name) = options.tokenizer {
            self.tokenizer = resolve_tokenizer(&name)?;
            self.config.tokenizer = name;
        }
        if let Some(extensions) = options.extensions {
            self.config.extensions = extensions;
        }
        if let Some(max_file_size) = options.max_file_size {
            self.config.max_file_size = max_file_size;
        }
        Ok(())
    }

    /// Index (or re-index) one file and persist. Explicitly named files are
    /// not subject to the discovery filters.
    pub fn add_file(&mut self, rel_path: &str) -> Result<()> {
        let index = self.index.as_mut().ok_or(IndexError::NotReady)?;

        let mut stream = DocumentStream::single(&self.root, rel_path);
        let doc = match stream.next() {
            Some(doc) => doc?,
            None => return Ok(()),
        };

        tracing::debug!(path = %doc.path, "indexing file");
        index.add(doc);
        self.clear_cache();
        self.persist()
    }

    /// Drop one file and persist. Unknown paths are a no-op.
    pub fn remove_file(&mut self, rel_path: &str) -> Result<()> {
        let index = self.index.as_mut().ok_or(IndexError::NotReady)?;
        let path = normalize_rel_path(rel_path);

        if !index.remove(&path) {
            tracing::debug!(path = %path, "remove of unindexed file");
            return Ok(());
        }

        self.clear_cache();
        self.persist()
    }

    /// Ranked results for a free-text query
    pub fn search(&mut self, query: &str) -> Result<Vec<SearchHit>> {
        if self.state != WorkerState::Ready {
            return Err(IndexError::NotReady);
        }
        let index = self.index.as_ref().ok_or(IndexError::NotReady)?;

        if let Some(cache) = self.cache.as_mut()
            && let Some(hits) = cache.get(query)
        {
            return Ok(hits.clone());
        }

        let hits = index.search(query);
        if let Some(cache) = self.cache.as_mut() {
            cache.put(query.to_string(), hits.clone());
        }
        Ok(hits)
    }

    fn persist(&self) -> Result<()> {
        match &self.index {
            Some(index) => snapshot::save(index, &self.snapshot_path()),
            None => Ok(()),
        }
    }

    fn clear_cache(&mut self) {
        if let Some(cache) = self.cache.as_mut() {
            cache.clear();
        }
    }
}

fn resolve_tokenizer(name: &str) -> Result<Tokenizer> {
    Tokenizer::by_name(name).ok_or_else(|| IndexError::UnknownTokenizer(name.to_string()))
}

/// Process messages from a channel until `stop` or until the host hangs up
pub fn run_channel(
    mut worker: Worker,
    inbox: mpsc::Receiver<Message>,
    out: &mut impl ReplySink,
) -> Result<()> {
    for msg in inbox {
        if worker.handle(msg, out)? == Flow::Stop {
            return Ok(());
        }
    }

    tracing::debug!(root = %worker.root().display(), "host disconnected");
    Ok(())
}

/// Serve framed messages from `reader`, writing framed replies to `writer`.
///
/// Frames that do not decode as a message get an `error` reply and the loop
/// continues. End of input ends the loop.
pub fn serve_framed<R: Read, W: Write>(mut worker: Worker, reader: R, writer: W) -> Result<()> {
    let mut reader = BufReader::new(reader);
    let mut out = FramedSink(BufWriter::new(writer));

    loop {
        let frame = match read_frame(&mut reader) {
            Ok(frame) => frame,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        };

        let msg: Message = match serde_json::from_slice(&frame) {
            Ok(msg) => msg,
            Err(e) => {
                let err = IndexError::Channel(e.to_string());
                tracing::warn!(error = %err, "dropping frame");
                out.send(Reply::error(None, err.to_string()))?;
                continue;
            }
        };

        if worker.handle(msg, &mut out)? == Flow::Stop {
            break;
        }
    }

    Ok(())
}
