//! Messages exchanged with the coordinator.
//!
//! The channel is newline-delimited JSON: requests arrive on stdin, responses
//! leave on stdout, one object per line, tagged by `type`.

use crate::error::ProtocolError;
use crate::types::{Coords, Properties};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadRequest {
    pub layer: String,
    pub datapath: PathBuf,
    #[serde(default)]
    pub localized_admin_names: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchRequest {
    /// Correlation token, echoed back untouched.
    pub id: Value,
    pub coords: Coords,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Load(LoadRequest),
    Search(SearchRequest),
    /// Any other `type`; kept whole so it can be logged.
    Unknown(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Response {
    Loaded {
        layer: String,
        seconds: f64,
    },
    Results {
        layer: String,
        id: Value,
        results: Properties,
    },
    LoadFailed {
        layer: String,
        error: String,
    },
}

impl Request {
    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(line)?;
        let kind = match value.as_object() {
            Some(object) => object.get("type").and_then(Value::as_str).map(str::to_string),
            None => return Err(ProtocolError::NotAnObject),
        };

        let invalid = |kind: &str, e: serde_json::Error| ProtocolError::InvalidFields {
            kind: kind.to_string(),
            reason: e.to_string(),
        };

        match kind.as_deref() {
            Some("load") => serde_json::from_value(value)
                .map(Request::Load)
                .map_err(|e| invalid("load", e)),
            Some("search") => serde_json::from_value(value)
                .map(Request::Search)
                .map_err(|e| invalid("search", e)),
            _ => Ok(Request::Unknown(value)),
        }
    }
}

impl Response {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Decodes lines from `reader` and forwards them until EOF or the receiver goes away.
///
/// Lines that cannot be decoded are logged and dropped.
pub async fn read_requests<R>(reader: R, tx: mpsc::Sender<Request>) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match Request::decode(&line) {
            Ok(request) => {
                if tx.send(request).await.is_err() {
                    break;
                }
            }
            Err(e) => warn!(error = %e, "dropping undecodable message"),
        }
    }
    debug!("request channel closed");
    Ok(())
}

/// Writes responses to `writer`, one JSON line each, flushing after every line.
pub async fn write_responses<W>(mut writer: W, mut rx: mpsc::Receiver<Response>) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let mut line = response.encode()?;
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}
