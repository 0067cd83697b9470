//! Content-Length framing of DAP messages.

use serde::Serialize;
use serde_json::Value;
use std::io::{self, BufRead, Read};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("missing Content-Length header")]
    MissingContentLength,
    #[error("invalid Content-Length header: {0}")]
    InvalidContentLength(String),
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
}

impl TransportError {
    /// Return true if the stream is still usable and the next message can be read.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, TransportError::Io(_))
    }
}

/// Upper bound of a message body, larger frames are skipped.
pub const MAX_CONTENT_LENGTH: usize = 16 * 1024 * 1024;

/// Read a single framed message, `None` if the client closed the stream between messages.
pub fn read_message(reader: &mut dyn BufRead) -> Result<Option<Value>, TransportError> {
    let mut content_length: Option<Result<usize, String>> = None;
    let mut header_seen = false;
    let mut raw = Vec::new();
    loop {
        raw.clear();
        if reader.read_until(b'\n', &mut raw)? == 0 {
            if header_seen {
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
            }
            return Ok(None);
        }
        let line = String::from_utf8_lossy(&raw);
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            if header_seen {
                break;
            }
            // stray separator between messages
            continue;
        }
        header_seen = true;
        if let Some(v) = line.strip_prefix("Content-Length:") {
            content_length = Some(v.trim().parse().map_err(|_| v.trim().to_string()));
        }
    }

    let len = match content_length {
        None => return Err(TransportError::MissingContentLength),
        Some(Err(raw)) => return Err(TransportError::InvalidContentLength(raw)),
        Some(Ok(len)) if len > MAX_CONTENT_LENGTH => {
            io::copy(&mut Read::take(&mut *reader, len as u64), &mut io::sink())?;
            return Err(TransportError::InvalidContentLength(format!(
                "{len} exceeds limit of {MAX_CONTENT_LENGTH} bytes"
            )));
        }
        Some(Ok(len)) => len,
    };
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(Some(serde_json::from_slice(&buf)?))
}

/// Frame a message: header, blank line, JSON payload.
pub fn encode<T: Serialize>(message: &T) -> io::Result<Vec<u8>> {
    let payload = serde_json::to_vec(message)?;
    let mut frame = format!("Content-Length: {}\r\n\r\n", payload.len()).into_bytes();
    frame.extend_from_slice(&payload);
    Ok(frame)
}
