//! Fixed-capacity tensor buffer

use crate::{ClassifierError, Result, FLOAT_BYTES};

/// Pre-allocated byte region holding f32 elements in native byte order.
///
/// The capacity is fixed at construction; writes go through a cursor that
/// `rewind` moves back to the start. The storage is reused across calls.
#[derive(Debug)]
pub struct TensorBuffer {
    /// Pre-allocated storage
    storage: Box<[u8]>,
    /// Write position
    position: usize,
}

impl TensorBuffer {
    /// Allocate a zeroed buffer of `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: vec![0u8; capacity].into_boxed_slice(),
            position: 0,
        }
    }

    /// Buffer capacity in bytes
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Current write position
    pub fn position(&self) -> usize {
        self.position
    }

    /// Bytes left between the cursor and the end of the buffer
    pub fn remaining(&self) -> usize {
        self.capacity() - self.position
    }

    /// Move the cursor back to the start
    pub fn rewind(&mut self) {
        self.position = 0;
    }

    /// Copy `src` in at the cursor.
    ///
    /// Fails without writing anything if `src` does not fit in the remaining space.
    pub fn put(&mut self, src: &[u8]) -> Result<usize> {
        if src.len() > self.remaining() {
            return Err(ClassifierError::BufferOverflow {
                capacity: self.capacity(),
                attempted: self.position + src.len(),
            });
        }
        let end = self.position + src.len();
        self.storage[self.position..end].copy_from_slice(src);
        self.position = end;
        Ok(src.len())
    }

    /// Zero everything from the cursor to the end; the cursor moves to the end
    pub fn zero_remaining(&mut self) {
        self.storage[self.position..].fill(0);
        self.position = self.capacity();
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.storage
    }

    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.storage
    }

    /// Decode the whole buffer as native-order f32 values
    pub fn read_f32s(&self) -> Vec<f32> {
        bytes_to_f32s(&self.storage)
    }
}

/// Encode f32 values as native-order bytes
pub(crate) fn f32s_to_bytes(values: &[f32], out: &mut [u8]) {
    for (chunk, value) in out.chunks_exact_mut(FLOAT_BYTES).zip(values) {
        chunk.copy_from_slice(&value.to_ne_bytes());
    }
}

/// Decode native-order bytes into f32 values
pub(crate) fn bytes_to_f32s(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(FLOAT_BYTES)
        .map(|chunk| f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
