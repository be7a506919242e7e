//! Frames exchanged over the live TTS WebSocket.
//!
//! Every message is one MessagePack map tagged by its `event` field.

use std::io::Cursor;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::schemas::TtsRequest;

/// Why the server ended the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishReason {
    Stop,
    Error,
}

/// One application-level message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum Frame {
    /// Opens the stream with the full synthesis request.
    Start { request: TtsRequest },
    /// One text fragment.
    Text { text: String },
    /// No more text will follow.
    Stop,
    /// One chunk of synthesized audio.
    Audio {
        #[serde(with = "serde_bytes")]
        audio: Vec<u8>,
    },
    /// End of the inbound stream.
    Finish { reason: FinishReason },
}

impl Frame {
    /// Returns the wire tag of this frame.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Start { .. } => "start",
            Frame::Text { .. } => "text",
            Frame::Stop => "stop",
            Frame::Audio { .. } => "audio",
            Frame::Finish { .. } => "finish",
        }
    }

    /// Encodes the frame as a named-field MessagePack map.
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    /// Decodes exactly one frame. Trailing bytes are rejected.
    pub fn decode(bytes: &[u8]) -> Result<Frame, Error> {
        let mut cursor = Cursor::new(bytes);
        let frame: Frame =
            rmp_serde::from_read(&mut cursor).map_err(|e| Error::Protocol(e.to_string()))?;
        let consumed = cursor.position() as usize;
        if consumed != bytes.len() {
            return Err(Error::Protocol(format!(
                "{} trailing bytes after {} frame",
                bytes.len() - consumed,
                frame.kind()
            )));
        }
        Ok(frame)
    }
}
