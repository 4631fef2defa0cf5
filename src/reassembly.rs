//! Growable reassembly buffer
//!
//! Keeps the allocated length (what the buffer can hold without growing) separate
//! from the logical write offset (how many payload bytes have been written).
//! Growth is copy-extend: previously written bytes are preserved and the buffer
//! never shrinks while a transfer is in flight.

/// Outcome of a bounded write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The packet was copied in
    Written,
    /// The packet would have crossed the buffer's fixed length
    Overflow,
}

/// Byte buffer with a logical write offset
#[derive(Debug, Clone, Default)]
pub struct ReassemblyBuffer {
    data: Vec<u8>,
    offset: usize,
}

impl ReassemblyBuffer {
    /// Create a zero-filled buffer of `len` bytes with the offset at 0
    pub fn with_len(len: usize) -> Self {
        Self {
            data: vec![0; len],
            offset: 0,
        }
    }

    /// Allocated length
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Logical write offset
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes that can still be written without growing
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    /// Whether the offset has reached the allocated length
    pub fn is_full(&self) -> bool {
        self.offset == self.data.len()
    }

    /// Copy `bytes` in at the offset, failing if they do not fit
    ///
    /// Used for transfers whose total length is declared up front.
    pub fn write_bounded(&mut self, bytes: &[u8]) -> WriteOutcome {
        if bytes.len() > self.remaining() {
            return WriteOutcome::Overflow;
        }
        self.data[self.offset..self.offset + bytes.len()].copy_from_slice(bytes);
        self.offset += bytes.len();
        WriteOutcome::Written
    }

    /// Copy `bytes` in at the offset, growing to exactly fit if needed
    ///
    /// Returns `true` if the buffer had to grow.
    pub fn write_growing(&mut self, bytes: &[u8]) -> bool {
        let needed = self.offset + bytes.len();
        let grew = needed > self.data.len();
        if grew {
            self.data.resize(needed, 0);
        }
        self.data[self.offset..needed].copy_from_slice(bytes);
        self.offset = needed;
        grew
    }

    /// Bytes written so far
    pub fn written(&self) -> &[u8] {
        &self.data[..self.offset]
    }

    /// Consume the buffer, keeping only the bytes written so far
    pub fn into_written(mut self) -> Vec<u8> {
        self.data.truncate(self.offset);
        self.data
    }
}
