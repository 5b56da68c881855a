//! Streaming boundary scanner
//!
//! Splits a backup stream into top-level JSON object fragments without
//! materializing the whole document. Only brace depth (and whether we are
//! inside a string literal) is tracked; each fragment is handed out as raw
//! text and parsed by the caller.
//!
//! The scanner works on bytes. UTF-8 continuation bytes never collide with
//! `{`, `}`, `"` or `\`, so a fragment is always the exact byte range of the
//! source object.

mod cancel;

pub use cancel::CancellationToken;

use crate::error::ScanError;
use std::collections::VecDeque;
use std::io::{BufReader, Bytes, Read};

/// One balanced top-level object, exactly as it appeared in the stream
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    /// Byte offset of the opening brace
    pub offset: u64,
    pub text: String,
}

/// Items produced by [`BoundaryScanner`]
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    Fragment(Fragment),
    Progress { position: u64, total: u64 },
}

/// Lazy, non-restartable iterator over the fragments of a stream.
///
/// Progress ticks are interleaved every `interval` bytes, and one final tick
/// with `position == total` is always emitted last, including after a read
/// error or a cancellation.
pub struct BoundaryScanner<R: Read> {
    bytes: Bytes<BufReader<R>>,
    cancel: CancellationToken,
    total: u64,
    interval: u64,

    consumed: u64,
    depth: u32,
    open: bool,
    in_string: bool,
    escaped: bool,
    start: u64,
    buffer: Vec<u8>,

    pending: VecDeque<Result<ScanEvent, ScanError>>,
    cancelled: bool,
    finished: bool,
}

impl<R: Read> BoundaryScanner<R> {
    /// `total` is the expected stream length in bytes (the file size).
    pub fn new(reader: R, total: u64, interval: u64, cancel: CancellationToken) -> Self {
        BoundaryScanner {
            bytes: BufReader::new(reader).bytes(),
            cancel,
            total,
            interval: interval.max(1),
            consumed: 0,
            depth: 0,
            open: false,
            in_string: false,
            escaped: false,
            start: 0,
            buffer: Vec::new(),
            pending: VecDeque::new(),
            cancelled: false,
            finished: false,
        }
    }

    /// Whether scanning stopped because cancellation was observed
    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Bytes consumed so far
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    fn step(&mut self, byte: u8) -> Option<Result<ScanEvent, ScanError>> {
        if !self.open {
            // Outside a fragment everything but an opening brace is dropped,
            // including stray closing braces.
            if byte == b'{' {
                if self.cancel.is_cancelled() {
                    self.cancelled = true;
                    return None;
                }
                self.open = true;
                self.depth = 1;
                self.start = self.consumed - 1;
                self.buffer.clear();
                self.buffer.push(byte);
            }
            return None;
        }

        self.buffer.push(byte);

        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if byte == b'\\' {
                self.escaped = true;
            } else if byte == b'"' {
                self.in_string = false;
            }
            return None;
        }

        match byte {
            b'"' => self.in_string = true,
            b'{' => self.depth += 1,
            b'}' => {
                self.depth -= 1;
                if self.depth == 0 {
                    self.open = false;
                    return Some(self.take_fragment());
                }
            }
            _ => {}
        }
        None
    }

    fn take_fragment(&mut self) -> Result<ScanEvent, ScanError> {
        let offset = self.start;
        String::from_utf8(std::mem::take(&mut self.buffer))
            .map(|text| ScanEvent::Fragment(Fragment { offset, text }))
            .map_err(|_| ScanError::InvalidUtf8 { offset })
    }

    fn progress(&self, position: u64) -> Result<ScanEvent, ScanError> {
        Ok(ScanEvent::Progress {
            position: position.min(self.total),
            total: self.total,
        })
    }

    fn finish(&mut self) {
        if self.open && !self.cancelled {
            self.pending
                .push_back(Err(ScanError::Unterminated { offset: self.start }));
        }
        self.open = false;
        self.buffer = Vec::new();
        let last = self.progress(self.total);
        self.pending.push_back(last);
        self.finished = true;
    }
}

impl<R: Read> Iterator for BoundaryScanner<R> {
    type Item = Result<ScanEvent, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            if self.finished {
                return None;
            }

            match self.bytes.next() {
                None => self.finish(),
                Some(Err(e)) => {
                    self.pending.push_back(Err(ScanError::Io(e)));
                    self.open = false;
                    self.finish();
                }
                Some(Ok(byte)) => {
                    self.consumed += 1;
                    if let Some(event) = self.step(byte) {
                        self.pending.push_back(event);
                    }
                    if self.cancelled {
                        self.finish();
                    } else if self.consumed % self.interval == 0 {
                        let tick = self.progress(self.consumed);
                        self.pending.push_back(tick);
                    }
                }
            }
        }
    }
}
