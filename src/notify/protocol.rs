use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, Read};

/// Sent whenever the interactive target changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeMessage {
    pub scope: String,
}

impl ScopeMessage {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
        }
    }
}

/// `Content-Length: {len}\r\n\r\n{json}` framing.
pub fn encode_framed(message: &ScopeMessage) -> serde_json::Result<String> {
    let json = serde_json::to_string(message)?;
    Ok(format!("Content-Length: {}\r\n\r\n{}", json.len(), json))
}

/// Read one framed message. `Ok(None)` at end of input.
pub fn read_message(reader: &mut impl BufRead) -> io::Result<Option<ScopeMessage>> {
    let mut content_length: Option<usize> = None;
    let mut saw_header = false;

    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            if saw_header {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "message headers ended early",
                ));
            }
            return Ok(None);
        }

        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            if saw_header {
                break;
            }
            continue;
        }
        saw_header = true;

        if let Some(value) = line.strip_prefix("Content-Length:") {
            let len = value.trim().parse().map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidData, "bad Content-Length header")
            })?;
            content_length = Some(len);
        }
    }

    let len = content_length.ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, "missing Content-Length header")
    })?;
    let mut buffer = vec![0u8; len];
    reader.read_exact(&mut buffer)?;
    serde_json::from_slice(&buffer)
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
