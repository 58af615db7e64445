//! Buffer management for send and receive queues
//!
//! The receive queue turns an arbitrary chunked byte stream into complete
//! lines. The send queue holds lines produced by the handshake state machine
//! until the connection writes them out.

use std::collections::VecDeque;

/// Send queue - ordered outgoing lines, without terminators
#[derive(Debug, Default)]
pub struct SendQueue {
    buffer: VecDeque<String>,
}

impl SendQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a line to the back of the queue
    pub fn push(&mut self, line: String) {
        self.buffer.push_back(line);
    }

    /// Remove and return the next line from the queue
    pub fn pop(&mut self) -> Option<String> {
        self.buffer.pop_front()
    }

    /// Take every queued line, oldest first
    pub fn drain(&mut self) -> Vec<String> {
        self.buffer.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Receive queue - incoming bytes not yet split into lines
#[derive(Debug)]
pub struct RecvQueue {
    /// Bytes after the last line terminator seen
    buffer: Vec<u8>,
    /// Maximum size of an unterminated line in bytes
    max_size: usize,
    /// Number of bytes dropped because a partial line grew too large
    dropped_bytes: u64,
}

impl RecvQueue {
    /// Create a new receive queue with specified maximum partial line size
    pub fn new(max_size: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_size,
            dropped_bytes: 0,
        }
    }

    /// Append data and return every line it completed.
    ///
    /// Lines are split on LF with a trailing CR stripped, and decoded
    /// lossily so a stray invalid byte cannot take down the connection.
    /// Whatever follows the last LF stays buffered for the next call.
    pub fn push(&mut self, data: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(data);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            let mut line = &self.buffer[start..end];
            if let Some(stripped) = line.strip_suffix(b"\r") {
                line = stripped;
            }
            lines.push(String::from_utf8_lossy(line).into_owned());
            start = end + 1;
        }
        self.buffer.drain(..start);

        if self.buffer.len() > self.max_size {
            self.dropped_bytes += self.buffer.len() as u64;
            tracing::warn!(
                "RecvQueue partial line exceeded {} bytes, dropping {} bytes",
                self.max_size,
                self.buffer.len()
            );
            self.buffer.clear();
        }

        lines
    }

    /// Bytes currently waiting for a terminator
    pub fn current_size(&self) -> usize {
        self.buffer.len()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn dropped_bytes(&self) -> u64 {
        self.dropped_bytes
    }
}
