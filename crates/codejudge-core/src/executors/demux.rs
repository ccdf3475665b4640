//! Decoder for the framed stdout/stderr multiplexing protocol.
//!
//! When a container runs without a TTY its output arrives as a sequence of
//! frames, each an 8-byte header followed by a payload:
//!
//! ```text
//! [stream: u8][0][0][0][length: u32 big-endian][payload: length bytes]
//! ```
//!
//! `stream` is 0 (stdin), 1 (stdout), 2 (stderr) or 3 (a daemon-side error).
//! Decoding is independent of any transport: feed bytes in, get frames out.
//!
//! The bollard client already splits the logs endpoint into `LogOutput` values,
//! so the Docker backend maps those straight to [`LogFrame`]s and only
//! [`CapturedOutput`] sits on its path. [`FrameDecoder`] handles the same
//! protocol when the raw byte stream is read directly.

use bytes::Bytes;
use thiserror::Error;

pub const HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdin,
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFrame {
    pub stream: StreamKind,
    pub payload: Bytes,
}

impl LogFrame {
    pub fn new(stream: StreamKind, payload: impl Into<Bytes>) -> Self {
        Self {
            stream,
            payload: payload.into(),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DemuxError {
    #[error("invalid stream tag {tag} in frame header at byte {offset}")]
    InvalidStreamTag { offset: usize, tag: u8 },
    #[error("malformed frame header at byte {offset}")]
    MalformedHeader { offset: usize },
    #[error("stream ended inside a frame at byte {offset}: {missing} more bytes expected")]
    Truncated { offset: usize, missing: usize },
    #[error("daemon reported an error: {0}")]
    Daemon(String),
}

/// Incremental frame decoder. Chunks may split headers and payloads anywhere.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    pending: Vec<u8>,
    consumed: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return every frame it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<LogFrame>, DemuxError> {
        self.pending.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut cursor = 0;
        while self.pending.len() - cursor >= HEADER_LEN {
            let header = &self.pending[cursor..cursor + HEADER_LEN];
            let offset = self.consumed + cursor;

            if header[1..4] != [0, 0, 0] {
                return Err(DemuxError::MalformedHeader { offset });
            }
            let stream = match header[0] {
                0 => Some(StreamKind::Stdin),
                1 => Some(StreamKind::Stdout),
                2 => Some(StreamKind::Stderr),
                3 => None,
                tag => return Err(DemuxError::InvalidStreamTag { offset, tag }),
            };
            let length =
                u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;

            let start = cursor + HEADER_LEN;
            if self.pending.len() - start < length {
                break;
            }
            let payload = &self.pending[start..start + length];
            match stream {
                Some(stream) => frames.push(LogFrame::new(stream, payload.to_vec())),
                None => {
                    return Err(DemuxError::Daemon(
                        String::from_utf8_lossy(payload).into_owned(),
                    ))
                }
            }
            cursor = start + length;
        }

        self.pending.drain(..cursor);
        self.consumed += cursor;
        Ok(frames)
    }

    /// Check that the input ended on a frame boundary.
    pub fn finish(self) -> Result<(), DemuxError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let missing = if self.pending.len() < HEADER_LEN {
            HEADER_LEN - self.pending.len()
        } else {
            let header = &self.pending[..HEADER_LEN];
            let length =
                u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
            HEADER_LEN + length - self.pending.len()
        };
        Err(DemuxError::Truncated {
            offset: self.consumed + self.pending.len(),
            missing,
        })
    }
}

/// Decode a complete framed byte stream.
pub fn decode_frames(bytes: &[u8]) -> Result<Vec<LogFrame>, DemuxError> {
    let mut decoder = FrameDecoder::new();
    let frames = decoder.push(bytes)?;
    decoder.finish()?;
    Ok(frames)
}

/// Stdout and stderr reassembled from frames, kept as raw bytes until the end
/// so multi-byte characters split across frames survive.
///
/// The combined size of both streams never exceeds `limit`. Bytes past it are
/// dropped and `truncated` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub truncated: bool,
    limit: usize,
}

impl Default for CapturedOutput {
    fn default() -> Self {
        Self::with_limit(usize::MAX)
    }
}

impl CapturedOutput {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            stdout: Vec::new(),
            stderr: Vec::new(),
            truncated: false,
            limit,
        }
    }

    pub fn push(&mut self, frame: &LogFrame) {
        let remaining = self.limit - self.len();
        let take = frame.payload.len().min(remaining);
        if take < frame.payload.len() {
            self.truncated = true;
        }
        let payload = &frame.payload[..take];
        match frame.stream {
            // stdin echoes are attributed to stdout
            StreamKind::Stdin | StreamKind::Stdout => self.stdout.extend_from_slice(payload),
            StreamKind::Stderr => self.stderr.extend_from_slice(payload),
        }
    }

    /// Bytes held across both streams.
    pub fn len(&self) -> usize {
        self.stdout.len() + self.stderr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once further frames would only be discarded.
    pub fn is_full(&self) -> bool {
        self.truncated || self.len() >= self.limit
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

impl<'a> FromIterator<&'a LogFrame> for CapturedOutput {
    fn from_iter<I: IntoIterator<Item = &'a LogFrame>>(iter: I) -> Self {
        let mut output = CapturedOutput::default();
        for frame in iter {
            output.push(frame);
        }
        output
    }
}

/// Split a complete framed byte stream into stdout and stderr.
pub fn demux(bytes: &[u8]) -> Result<CapturedOutput, DemuxError> {
    Ok(decode_frames(bytes)?.iter().collect())
}
