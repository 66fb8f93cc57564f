//! CRLF line framing over an arbitrarily chunked byte stream.

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
    #[error("line too long (max {max} bytes)")]
    LineTooLong { max: usize },
}

/// Accumulates raw bytes and hands out complete lines, terminator stripped.
///
/// Partial data stays buffered until its CRLF arrives. A pending line that
/// grows past `max_line_length` is reported as [`FrameError::LineTooLong`]
/// instead of being buffered forever.
pub struct LineFramer {
    buf: BytesMut,
    // bytes of `buf` already known not to contain a CRLF
    scanned: usize,
    max_line_length: usize,
}

impl LineFramer {
    pub fn new(max_line_length: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            scanned: 0,
            max_line_length,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Takes the next complete line out of the buffer, if there is one.
    pub fn next_line(&mut self) -> Result<Option<Bytes>, FrameError> {
        // a CR at the end of the scanned region may be completed by the next byte
        let from = self.scanned.saturating_sub(1);
        match find_crlf(&self.buf[from..]) {
            Some(offset) => {
                let end = from + offset;
                if end > self.max_line_length {
                    return Err(FrameError::LineTooLong {
                        max: self.max_line_length,
                    });
                }
                let line = self.buf.split_to(end).freeze();
                self.buf.advance(2);
                self.scanned = 0;
                Ok(Some(line))
            }
            None => {
                self.scanned = self.buf.len();
                // allow room for the CR of a line that is exactly at the limit
                if self.buf.len() > self.max_line_length + 1 {
                    return Err(FrameError::LineTooLong {
                        max: self.max_line_length,
                    });
                }
                Ok(None)
            }
        }
    }

    /// Drops everything buffered and returns how many bytes were dropped.
    pub fn discard(&mut self) -> usize {
        let dropped = self.buf.len();
        self.buf.clear();
        self.scanned = 0;
        dropped
    }

    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

fn find_crlf(haystack: &[u8]) -> Option<usize> {
    haystack.windows(2).position(|w| w == b"\r\n")
}
