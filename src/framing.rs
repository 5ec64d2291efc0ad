//! Line-oriented boundary framing for the continuous multi-file stream.
//!
//! Grammar, in stream order, before every non-initial file segment:
//!
//! ```text
//! --FILE_BOUNDARY--\n
//! Filename: <relative path>\n
//! Size: <full declared size, decimal>\n
//! --FILE_CONTENT--\n
//! ```
//!
//! followed by the segment's content bytes. The writer and parser here are
//! the single definition of that grammar for both sides of the protocol.
//! Content is counted, not scanned: the parser consumes exactly as many
//! content bytes as the segment declares, so file bytes that happen to
//! contain marker text are never misread as framing.

use bytes::Bytes;

use crate::error::{Error, Result};

/// Literal delimiter line that opens a boundary marker.
pub const FILE_BOUNDARY: &str = "--FILE_BOUNDARY--";
/// Literal delimiter line that ends a marker and starts content.
pub const CONTENT_START: &str = "--FILE_CONTENT--";

/// Upper bound on a single marker line; filenames are relative paths and
/// sizes are decimal integers, so anything longer is garbage.
const MAX_LINE_LEN: usize = 4096;

/// Header written before each non-initial file segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentHeader {
    /// Relative path of the file the segment belongs to.
    pub path: String,
    /// Full declared size of the file, not the remaining byte count.
    pub size: u64,
}

impl SegmentHeader {
    /// Serializes the marker block that precedes this segment's content.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        Bytes::from(format!(
            "{FILE_BOUNDARY}\nFilename: {}\nSize: {}\n{CONTENT_START}\n",
            self.path, self.size
        ))
    }
}

/// How a continuous stream begins, known to the consumer from the resolved
/// start point: a stream starting at offset zero of a file opens directly
/// with that file's bytes, while a stream resuming mid-file opens with a
/// boundary marker whose declared size is the file's full size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStart {
    /// The stream opens with `remaining` content bytes of a known file,
    /// with no leading marker.
    Content {
        /// Content bytes before the first boundary marker.
        remaining: u64,
    },
    /// The stream opens with a boundary marker; its segment resumes at
    /// `offset` bytes into the file the marker names.
    Resumed {
        /// Byte offset already present locally for the first segment.
        offset: u64,
    },
}

/// Event produced by feeding stream bytes through [`FrameParser`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// A boundary marker completed; following content belongs to this file.
    Segment(SegmentHeader),
    /// Content bytes of the current file.
    Data(Bytes),
}

/// Incremental parser for the boundary grammar. Feed it chunks as they
/// arrive; it yields [`FrameEvent`]s and tolerates markers split across
/// arbitrary chunk boundaries.
#[derive(Debug)]
pub struct FrameParser {
    /// Content bytes still expected for the current segment; `None` while
    /// reading marker lines.
    remaining: Option<u64>,
    /// Which marker line comes next (0 = boundary, 1 = filename, 2 = size,
    /// 3 = content-start).
    marker_line: usize,
    pending_path: Option<String>,
    pending_size: Option<u64>,
    line_buf: Vec<u8>,
    /// Offset subtracted from the first marker-led segment's size, for
    /// streams that resume mid-file.
    first_offset: u64,
}

impl FrameParser {
    /// Creates a parser for a stream beginning as described by `start`.
    #[must_use]
    pub fn new(start: StreamStart) -> Self {
        let (remaining, first_offset) = match start {
            StreamStart::Content { remaining } => (Some(remaining), 0),
            StreamStart::Resumed { offset } => (None, offset),
        };
        Self {
            remaining,
            marker_line: 0,
            pending_path: None,
            pending_size: None,
            line_buf: Vec::new(),
            first_offset,
        }
    }

    /// Feeds one chunk, returning the events it completes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] on any deviation from the grammar.
    #[allow(clippy::cast_possible_truncation)]
    pub fn feed(&mut self, mut input: &[u8]) -> Result<Vec<FrameEvent>> {
        let mut events = Vec::new();
        loop {
            if let Some(remaining) = self.remaining {
                if remaining == 0 {
                    self.remaining = None;
                    self.marker_line = 0;
                    continue;
                }
                if input.is_empty() {
                    break;
                }
                let take = if (input.len() as u64) < remaining {
                    input.len()
                } else {
                    remaining as usize
                };
                self.remaining = Some(remaining - take as u64);
                events.push(FrameEvent::Data(Bytes::copy_from_slice(&input[..take])));
                input = &input[take..];
            } else {
                if input.is_empty() {
                    break;
                }
                let Some(pos) = input.iter().position(|&b| b == b'\n') else {
                    self.line_buf.extend_from_slice(input);
                    if self.line_buf.len() > MAX_LINE_LEN {
                        return Err(Error::Protocol("marker line too long".to_string()));
                    }
                    break;
                };
                self.line_buf.extend_from_slice(&input[..pos]);
                input = &input[pos + 1..];
                if self.line_buf.len() > MAX_LINE_LEN {
                    return Err(Error::Protocol("marker line too long".to_string()));
                }
                let line = std::mem::take(&mut self.line_buf);
                if let Some(event) = self.accept_marker_line(&line)? {
                    events.push(event);
                }
            }
        }
        Ok(events)
    }

    fn accept_marker_line(&mut self, raw: &[u8]) -> Result<Option<FrameEvent>> {
        let line = std::str::from_utf8(raw)
            .map_err(|_| Error::Protocol("marker line is not UTF-8".to_string()))?;
        match self.marker_line {
            0 => {
                if line != FILE_BOUNDARY {
                    return Err(Error::Protocol(format!(
                        "expected boundary delimiter, got {line:?}"
                    )));
                }
                self.marker_line = 1;
                Ok(None)
            }
            1 => {
                let path = line.strip_prefix("Filename: ").ok_or_else(|| {
                    Error::Protocol(format!("expected Filename line, got {line:?}"))
                })?;
                self.pending_path = Some(path.to_string());
                self.marker_line = 2;
                Ok(None)
            }
            2 => {
                let size = line
                    .strip_prefix("Size: ")
                    .and_then(|v| v.parse::<u64>().ok())
                    .ok_or_else(|| {
                        Error::Protocol(format!("expected Size line, got {line:?}"))
                    })?;
                self.pending_size = Some(size);
                self.marker_line = 3;
                Ok(None)
            }
            _ => {
                if line != CONTENT_START {
                    return Err(Error::Protocol(format!(
                        "expected content delimiter, got {line:?}"
                    )));
                }
                let header = SegmentHeader {
                    path: self
                        .pending_path
                        .take()
                        .ok_or_else(|| Error::Protocol("marker missing filename".to_string()))?,
                    size: self
                        .pending_size
                        .take()
                        .ok_or_else(|| Error::Protocol("marker missing size".to_string()))?,
                };
                self.remaining = Some(header.size.saturating_sub(self.first_offset));
                self.first_offset = 0;
                self.marker_line = 0;
                Ok(Some(FrameEvent::Segment(header)))
            }
        }
    }

    /// Confirms the stream ended on a frame boundary, not mid-content or
    /// mid-marker.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if content bytes or marker lines were
    /// still expected.
    pub fn finish(&self) -> Result<()> {
        match self.remaining {
            Some(0) => Ok(()),
            Some(n) => Err(Error::Protocol(format!(
                "stream truncated with {n} content bytes missing"
            ))),
            None => {
                if self.marker_line == 0 && self.line_buf.is_empty() {
                    Ok(())
                } else {
                    Err(Error::Protocol(
                        "stream truncated inside a boundary marker".to_string(),
                    ))
                }
            }
        }
    }
}
