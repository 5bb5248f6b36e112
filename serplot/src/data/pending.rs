//! Internal buffer holding the bytes of a line that has not been completed yet.

/// Buffer used by the decoder to accumulate stream bytes until a delimiter
/// (or the pending limit) allows a line to be cut.
pub struct PendingBuf {
    /// Valid data (possibly none) is `buf[start..]`.
    buf: Vec<u8>,
    /// Start offset of valid data in `buf`.
    start: usize,
}

impl PendingBuf {
    pub fn new() -> PendingBuf {
        PendingBuf {
            buf: Vec::new(),
            start: 0,
        }
    }

    pub fn empty(&self) -> bool {
        self.start == self.buf.len()
    }

    /// Returns the amount of data contained in this buffer, in bytes.
    pub fn size(&self) -> usize {
        self.buf.len() - self.start
    }

    pub fn data(&self) -> &[u8] {
        &self.buf[self.start..]
    }

    /// Removes `len` bytes off the front and returns them.
    /// `len` is clamped to `size()`.
    pub fn take(&mut self, len: usize) -> Vec<u8> {
        let len = len.min(self.size());
        let out = self.buf[self.start..self.start + len].to_vec();
        self.consume(len);
        out
    }

    /// Discards `len` bytes off the front. `len` is clamped to `size()`.
    pub fn consume(&mut self, len: usize) {
        self.start += len.min(self.size());
        if self.empty() {
            self.flush();
        }
    }

    /// Discards the entire content of the buffer, returning how many bytes were dropped.
    pub fn flush(&mut self) -> usize {
        let dropped = self.size();
        self.buf.clear();
        self.start = 0;
        dropped
    }

    /// Moves the data internally to the start of the buffer.
    fn compact(&mut self) {
        if self.start != 0 {
            self.buf.drain(..self.start);
            self.start = 0;
        }
    }

    pub fn add_data(&mut self, data: &[u8]) {
        if self.start > 0 && self.start >= self.size() {
            self.compact();
        }
        self.buf.extend_from_slice(data);
    }
}

impl Default for PendingBuf {
    fn default() -> Self {
        PendingBuf::new()
    }
}
