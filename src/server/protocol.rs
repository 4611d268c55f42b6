//! Protocol messages between a host and an index worker
//!
//! Messages are flat JSON records discriminated by `type`. Over a byte stream
//! each record is framed as:
//! - 4 bytes (little-endian u32): message length
//! - N bytes: JSON-encoded message

use crate::index::types::SearchHit;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Correlation id chosen by the sender of a request
pub type MsgId = u64;

/// Upper bound for a single frame
const MAX_FRAME_LEN: usize = 100 * 1024 * 1024;

/// Per-init overrides of the worker's configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenizer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_file_size: Option<u64>,
}

/// Request from host to worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum Message {
    /// Load or build the index
    #[serde(rename = "init")]
    Init {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        msg_id: Option<MsgId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        options: Option<InitOptions>,
    },

    /// (Re-)index one file, relative to the root
    #[serde(rename = "addFile")]
    AddFile {
        idx_rel_path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        msg_id: Option<MsgId>,
    },

    /// Drop one file from the index
    #[serde(rename = "removeFile")]
    RemoveFile {
        idx_rel_path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        msg_id: Option<MsgId>,
    },

    /// Ranked free-text query
    #[serde(rename = "search")]
    Search {
        #[serde(default)]
        query: String,
        msg_id: MsgId,
    },

    /// Readiness probe
    #[serde(rename = "status")]
    Status {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        msg_id: Option<MsgId>,
    },

    /// Flush and terminate
    #[serde(rename = "stop")]
    Stop,

    /// Any `type` this worker does not understand
    #[serde(other)]
    Unknown,
}

/// Outcome of an `init`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitStatus {
    Ready,
    Indexing,
}

/// Lifecycle of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Uninitialized,
    Initializing,
    Ready,
    Stopped,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkerState::Uninitialized => "uninitialized",
            WorkerState::Initializing => "initializing",
            WorkerState::Ready => "ready",
            WorkerState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Reply from worker to host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Reply {
    InitResponse {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        msg_id: Option<MsgId>,
        message: InitStatus,
    },

    SearchResponse {
        msg_id: MsgId,
        message: Vec<SearchHit>,
    },

    /// The engine could not answer because it is not ready
    NotReady {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        msg_id: Option<MsgId>,
    },

    StatusResponse {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        msg_id: Option<MsgId>,
        message: WorkerState,
        documents: usize,
    },

    /// Final snapshot written; the worker exits after this
    Stopped,

    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        msg_id: Option<MsgId>,
        message: String,
    },
}

impl Reply {
    pub fn error(msg_id: Option<MsgId>, message: impl Into<String>) -> Self {
        Reply::Error {
            msg_id,
            message: message.into(),
        }
    }

    /// Correlation id, if the reply answers a specific request
    pub fn msg_id(&self) -> Option<MsgId> {
        match self {
            Reply::InitResponse { msg_id, .. }
            | Reply::NotReady { msg_id }
            | Reply::StatusResponse { msg_id, .. }
            | Reply::Error { msg_id, .. } => *msg_id,
            Reply::SearchResponse { msg_id, .. } => Some(*msg_id),
            Reply::Stopped => None,
        }
    }
}

/// Write a message to a stream with length prefix
pub fn write_message<W: Write>(writer: &mut W, msg: &impl Serialize) -> std::io::Result<()> {
    let json = serde_json::to_vec(msg).map_err(|e| {
        std::io::Error::new(std::io::ErrorKind::InvalidData, e)
    })?;

    let len = json.len() as u32;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&json)?;
    writer.flush()?;

    Ok(())
}

/// Read one length-prefixed frame without decoding it
pub fn read_frame<R: Read>(reader: &mut R) -> std::io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;

    if len > MAX_FRAME_LEN {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "Message too large",
        ));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Read a message from a stream with length prefix
pub fn read_message<R: Read, T: for<'de> Deserialize<'de>>(reader: &mut R) -> std::io::Result<T> {
    let buf = read_frame(reader)?;
    serde_json::from_slice(&buf).map_err(|e| {
        std::io::Error::new(std::io::ErrorKind::InvalidData, e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    #[test]
    fn test_message_wire_names() {
        let msg: Message =
            serde_json::from_value(json!({"type": "addFile", "idxRelPath": "src/a.js"})).unwrap();
        assert_eq!(
            msg,
            Message::AddFile {
                idx_rel_path: "src/a.js".to_string(),
                msg_id: None
            }
        );

        let msg: Message =
            serde_json::from_value(json!({"type": "search", "query": "foo", "msgId": 7})).unwrap();
        assert_eq!(
            msg,
            Message::Search {
                query: "foo".to_string(),
                msg_id: 7
            }
        );

        let msg: Message = serde_json::from_value(json!({"type": "stop"})).unwrap();
        assert_eq!(msg, Message::Stop);
    }

    #[test]
    fn test_init_options_are_optional() {
        let msg: Message = serde_json::from_value(json!({"type": "init"})).unwrap();
        assert_eq!(
            msg,
            Message::Init {
                msg_id: None,
                options: None
            }
        );

        let msg: Message = serde_json::from_value(json!({
            "type": "init",
            "msgId": 1,
            "options": {"tokenizer": "whitespace", "maxFileSize": 10}
        }))
        .unwrap();
        let Message::Init { options: Some(options), .. } = msg else {
            panic!("Wrong variant");
        };
        assert_eq!(options.tokenizer.as_deref(), Some("whitespace"));
        assert_eq!(options.max_file_size, Some(10));
    }

    #[test]
    fn test_unknown_type_decodes() {
        let msg: Message = serde_json::from_value(json!({"type": "reindexAll"})).unwrap();
        assert_eq!(msg, Message::Unknown);
    }

    #[test]
    fn test_missing_type_is_an_error() {
        assert!(serde_json::from_value::<Message>(json!({"query": "x"})).is_err());
    }

    #[test]
    fn test_reply_wire_shape() {
        let reply = Reply::SearchResponse {
            msg_id: 3,
            message: vec![SearchHit {
                reference: "a.txt".to_string(),
                score: 0.5,
            }],
        };
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            json!({"type": "search-response", "msgId": 3, "message": [{"ref": "a.txt", "score": 0.5}]})
        );

        let reply = Reply::InitResponse {
            msg_id: None,
            message: InitStatus::Indexing,
        };
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            json!({"type": "init-response", "message": "indexing"})
        );

        assert_eq!(
            serde_json::to_value(Reply::error(None, "Unknown message type")).unwrap(),
            json!({"type": "error", "message": "Unknown message type"})
        );
    }

    #[test]
    fn test_reply_msg_id() {
        assert_eq!(Reply::NotReady { msg_id: Some(4) }.msg_id(), Some(4));
        assert_eq!(Reply::Stopped.msg_id(), None);
    }

    #[test]
    fn test_framed_roundtrip() {
        let mut buf = Vec::new();
        write_message(&mut buf, &Message::Status { msg_id: Some(9) }).unwrap();
        write_message(&mut buf, &Message::Stop).unwrap();

        let mut cursor = Cursor::new(buf);
        let first: Message = read_message(&mut cursor).unwrap();
        let second: Message = read_message(&mut cursor).unwrap();
        assert_eq!(first, Message::Status { msg_id: Some(9) });
        assert_eq!(second, Message::Stop);

        let err = read_frame(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&u32::MAX.to_le_bytes());
        let err = read_frame(&mut Cursor::new(buf)).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }
}
