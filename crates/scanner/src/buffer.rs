//! Shared working buffer
//!
//! One fixed-capacity arena is reused by every transfer: it holds the payload
//! being written or the data just read. It is allocated once per session so
//! no transfer allocates.

use protocol::WORKING_BUFFER_SIZE;

pub struct WorkingBuffer {
    data: Box<[u8]>,
}

impl WorkingBuffer {
    pub fn new() -> Self {
        Self {
            data: vec![0u8; WORKING_BUFFER_SIZE].into_boxed_slice(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// First `len` bytes, read-only
    pub fn prefix(&self, len: usize) -> &[u8] {
        &self.data[..len]
    }

    /// First `len` bytes, writable
    pub fn prefix_mut(&mut self, len: usize) -> &mut [u8] {
        &mut self.data[..len]
    }

    /// Bytes `offset..offset + len`
    pub fn slice(&self, offset: usize, len: usize) -> &[u8] {
        &self.data[offset..offset + len]
    }

    /// Zero the first `len` bytes
    pub fn zero(&mut self, len: usize) -> &mut [u8] {
        let region = &mut self.data[..len];
        region.fill(0);
        region
    }

    /// Zero the first `len` bytes and copy `payload` over their start
    pub fn load(&mut self, payload: &[u8], len: usize) -> &mut [u8] {
        let region = self.zero(len.max(payload.len()));
        region[..payload.len()].copy_from_slice(payload);
        region
    }
}

impl Default for WorkingBuffer {
    fn default() -> Self {
        Self::new()
    }
}
