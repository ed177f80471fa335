//! Frame Protocol
//!
//! Wire format for the assistant event stream: UTF-8 text records separated
//! by a blank line, each carrying its payload on a `data: ` line.
//!
//! # Frame Format
//!
//! ```text
//! data: {"type":"thinking"}\n
//! \n
//! data: {"type":"message_chunk","content":"Hi","is_final":false}\n
//! \n
//! ```
//!
//! Line endings may be `\n`, `\r\n` or a bare `\r`; all are normalised to
//! `\n` before records are split.
//!
//! # Chunking
//!
//! The transport hands us arbitrary byte slices. A multi-byte character or
//! the two-byte delimiter may straddle any two chunks, so the decoder keeps
//! just enough state (held-back UTF-8 bytes, a pending carriage return, a
//! scan position) that the record sequence never depends on where the
//! splits fall.
//!
//! # Security
//!
//! - Maximum record size is enforced so a stream without delimiters cannot
//!   grow the buffer without bound
//! - Oversized records are dropped whole, and decoding resumes at the next
//!   delimiter

/// Maximum record size (1 MiB)
pub const MAX_RECORD_SIZE: usize = 1024 * 1024;

/// Minimum buffer capacity for decoder
const MIN_BUFFER_CAPACITY: usize = 4096;

/// Marker prefix of a payload line
const DATA_MARKER: &str = "data:";

const DELIMITER: &[u8] = b"\n\n";

/// One delimited unit of the wire protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    raw: String,
}

impl Record {
    /// Wrap raw record text (without the trailing delimiter)
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    /// Raw record text
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Payload carried by the record's `data:` lines
    ///
    /// One optional space after the marker is stripped. Several data lines
    /// are joined with `\n`. Returns `None` when the record has no data line
    /// (comments, keep-alives, unknown fields).
    #[must_use]
    pub fn data(&self) -> Option<String> {
        let mut lines = self
            .raw
            .lines()
            .filter_map(|line| line.strip_prefix(DATA_MARKER))
            .map(|rest| rest.strip_prefix(' ').unwrap_or(rest));

        let first = lines.next()?;
        let mut payload = first.to_string();
        for line in lines {
            payload.push('\n');
            payload.push_str(line);
        }
        Some(payload)
    }
}

/// Decoder state machine for streaming record parsing
///
/// Buffers incoming bytes and yields complete records.
#[derive(Debug)]
pub struct FrameDecoder {
    /// Normalised text of the record being assembled
    buffer: String,
    /// Trailing bytes of an incomplete UTF-8 sequence
    pending: Vec<u8>,
    /// Byte offset where the next delimiter search starts
    scan_pos: usize,
    /// Previous chunk ended in `\r`; a leading `\n` belongs to it
    last_was_cr: bool,
    /// Skipping the rest of an oversized record
    discarding: bool,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create a new decoder with default buffer capacity
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: String::with_capacity(MIN_BUFFER_CAPACITY),
            pending: Vec::with_capacity(4),
            scan_pos: 0,
            last_was_cr: false,
            discarding: false,
        }
    }

    /// Feed one chunk and collect every record it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Record> {
        let text = self.decode_utf8(chunk);
        self.append_normalized(&text);
        self.drain_records()
    }

    /// Signal end of stream
    ///
    /// Flushes held-back bytes and returns whatever is left as a final
    /// record, if it has any content. The decoder is reset afterwards.
    pub fn finish(&mut self) -> Option<Record> {
        if !self.pending.is_empty() {
            self.pending.clear();
            self.append_normalized("\u{FFFD}");
        }

        let discarding = self.discarding;
        let rest = std::mem::take(&mut self.buffer);
        self.clear();

        let tail = rest.trim_end_matches('\n');
        if discarding || tail.trim().is_empty() {
            return None;
        }
        if tail.len() > MAX_RECORD_SIZE {
            tracing::warn!(size = tail.len(), max = MAX_RECORD_SIZE, "Dropping oversized trailing record");
            return None;
        }
        Some(Record::new(tail))
    }

    /// Number of buffered bytes not yet emitted
    #[must_use]
    pub fn available(&self) -> usize {
        self.buffer.len() + self.pending.len()
    }

    /// Clear all state
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.pending.clear();
        self.scan_pos = 0;
        self.last_was_cr = false;
        self.discarding = false;
    }

    /// Incremental UTF-8 decode
    ///
    /// A sequence cut off at the end of the chunk is held back. Invalid
    /// sequences become U+FFFD, one per maximal invalid prefix.
    fn decode_utf8(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let mut out = String::with_capacity(bytes.len());
        let mut rest = bytes.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    // from_utf8 guarantees `valid` is well formed
                    out.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        Some(len) => {
                            out.push('\u{FFFD}');
                            rest = &after[len..];
                        }
                        None => {
                            self.pending.extend_from_slice(after);
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    fn append_normalized(&mut self, text: &str) {
        for c in text.chars() {
            if self.last_was_cr {
                self.last_was_cr = false;
                if c == '\n' {
                    continue;
                }
            }
            if c == '\r' {
                self.buffer.push('\n');
                self.last_was_cr = true;
            } else {
                self.buffer.push(c);
            }
        }
    }

    fn drain_records(&mut self) -> Vec<Record> {
        let mut records = Vec::new();

        while let Some(idx) = self.find_delimiter() {
            let raw: String = self.buffer[..idx].to_string();
            self.buffer.drain(..idx + DELIMITER.len());
            self.scan_pos = 0;

            if self.discarding {
                self.discarding = false;
                continue;
            }
            if raw.len() > MAX_RECORD_SIZE {
                tracing::warn!(size = raw.len(), max = MAX_RECORD_SIZE, "Dropping oversized record");
                continue;
            }
            if raw.trim().is_empty() {
                continue;
            }
            records.push(Record::new(raw));
        }

        // A trailing '\n' may pair with the first byte of the next chunk
        self.scan_pos = self.buffer.len().saturating_sub(1);

        if self.buffer.len() > MAX_RECORD_SIZE || self.discarding {
            if !self.discarding {
                tracing::warn!(
                    buffered = self.buffer.len(),
                    max = MAX_RECORD_SIZE,
                    "Record exceeds size limit, discarding until next delimiter"
                );
                self.discarding = true;
            }
            let ends_with_newline = self.buffer.ends_with('\n');
            self.buffer.clear();
            if ends_with_newline {
                self.buffer.push('\n');
            }
            self.scan_pos = 0;
        }

        records
    }

    fn find_delimiter(&self) -> Option<usize> {
        let bytes = self.buffer.as_bytes();
        if self.scan_pos >= bytes.len() {
            return None;
        }
        bytes[self.scan_pos..]
            .windows(DELIMITER.len())
            .position(|w| w == DELIMITER)
            .map(|offset| self.scan_pos + offset)
    }
}
