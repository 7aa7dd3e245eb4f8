//! Accumulation buffer between the socket reader and the packet parser

use crate::{
    constants::BUF_CHUNK,
    error::{AmiError, AmiResult},
};
use tracing::trace;

/// Growable byte buffer with a read cursor.
///
/// Consumed bytes stay in place until [`compact`](Self::compact) drops them,
/// so extraction never shifts memory on its own.
#[derive(Debug)]
pub(crate) struct AmiBuffer {
    data: Vec<u8>,
    position: usize,
    max_size: usize,
}

impl AmiBuffer {
    pub(crate) fn new(max_size: usize) -> Self {
        Self {
            data: Vec::with_capacity(BUF_CHUNK.min(max_size)),
            position: 0,
            max_size,
        }
    }

    pub(crate) fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.data
            .extend_from_slice(bytes);
    }

    /// Unconsumed bytes.
    pub(crate) fn pending(&self) -> &[u8] {
        &self.data[self.position..]
    }

    pub(crate) fn len(&self) -> usize {
        self.data
            .len()
            - self.position
    }

    /// Fails once more than `max_size` bytes are waiting without a packet boundary.
    pub(crate) fn check_size_limits(&self) -> AmiResult<()> {
        if self.len() > self.max_size {
            return Err(AmiError::protocol_error(format!(
                "{} bytes buffered without a packet terminator (limit {})",
                self.len(),
                self.max_size
            )));
        }
        Ok(())
    }

    /// Take everything before the first occurrence of `pattern` and consume the pattern.
    pub(crate) fn extract_until_pattern(&mut self, pattern: &[u8]) -> Option<Vec<u8>> {
        let offset = find(self.pending(), pattern)?;
        let start = self.position;
        let chunk = self.data[start..start + offset].to_vec();
        self.position = start + offset + pattern.len();
        trace!(
            "extracted {} bytes, {} left in buffer",
            chunk.len(),
            self.len()
        );
        Some(chunk)
    }

    /// Drop consumed bytes from the front of the buffer.
    pub(crate) fn compact(&mut self) {
        if self.position == 0 {
            return;
        }
        self.data
            .drain(..self.position);
        self.position = 0;
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|w| w == needle)
}
