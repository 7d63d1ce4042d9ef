//! Framing for exec output streamed by the node runtime.
//!
//! Each frame is `[type: u8][len: u32 big-endian][payload: len bytes]`.
//! Frames may arrive split across, or packed within, transport chunks.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::RuntimeError;

/// Frame types for the exec stream protocol.
pub mod frame_type {
    pub const STDOUT: u8 = 0x02;
    pub const STDERR: u8 = 0x03;
    pub const EXIT: u8 = 0x11;
}

const HEADER_LEN: usize = 5;

/// Largest payload accepted in a single frame.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Exit status sent as the final frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitMessage {
    pub exit_code: i32,
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Stdout(Bytes),
    Stderr(Bytes),
    Exit(ExitMessage),
}

impl Frame {
    /// Encode into wire format.
    pub fn encode(&self) -> Result<Bytes, RuntimeError> {
        let (kind, payload) = match self {
            Frame::Stdout(data) => (frame_type::STDOUT, data.clone()),
            Frame::Stderr(data) => (frame_type::STDERR, data.clone()),
            Frame::Exit(exit) => (frame_type::EXIT, Bytes::from(serde_json::to_vec(exit)?)),
        };

        let len = u32::try_from(payload.len())
            .ok()
            .filter(|len| *len as usize <= MAX_FRAME_LEN)
            .ok_or_else(|| RuntimeError::Protocol("frame too large".to_string()))?;

        let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
        buf.put_u8(kind);
        buf.put_u32(len);
        buf.extend_from_slice(&payload);
        Ok(buf.freeze())
    }
}

/// Incremental frame decoder.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Bytes received but not yet decoded.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Decode the next complete frame, if one is buffered.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, RuntimeError> {
        if self.buf.len() < HEADER_LEN {
            return Ok(None);
        }

        let kind = self.buf[0];
        let len = u32::from_be_bytes([self.buf[1], self.buf[2], self.buf[3], self.buf[4]]) as usize;
        if len > MAX_FRAME_LEN {
            return Err(RuntimeError::Protocol(format!(
                "frame of {len} bytes exceeds limit of {MAX_FRAME_LEN}"
            )));
        }
        if self.buf.len() < HEADER_LEN + len {
            return Ok(None);
        }

        self.buf.advance(HEADER_LEN);
        let payload = self.buf.split_to(len).freeze();

        let frame = match kind {
            frame_type::STDOUT => Frame::Stdout(payload),
            frame_type::STDERR => Frame::Stderr(payload),
            frame_type::EXIT => Frame::Exit(serde_json::from_slice(&payload)?),
            other => {
                return Err(RuntimeError::Protocol(format!(
                    "unknown frame type 0x{other:02x}"
                )))
            }
        };
        Ok(Some(frame))
    }
}
