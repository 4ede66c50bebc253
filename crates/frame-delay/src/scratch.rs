//! Reusable byte buffers
//!
//! Every frame passes through at least one temporary byte buffer (packed
//! pixels for the encoder, packed pixels out of the decoder, a private copy
//! of compressed bytes for the glitch transform). Allocating those per frame
//! churns the allocator at video rate, so each use site owns a
//! [`ScratchBuffer`] that only ever grows.

/// A byte buffer that grows on demand and never shrinks
#[derive(Debug, Default)]
pub struct ScratchBuffer {
    buf: Vec<u8>,
}

impl ScratchBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer with `capacity` bytes reserved up front
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Make sure at least `bytes` can be held without reallocating
    ///
    /// Returns true when the buffer had to grow.
    pub fn ensure_capacity(&mut self, bytes: usize) -> bool {
        if bytes <= self.buf.capacity() {
            return false;
        }
        let additional = bytes - self.buf.len();
        self.buf.reserve(additional);
        log::debug!("scratch buffer grown to {} bytes", self.buf.capacity());
        true
    }

    /// Empty vector view for writers that append (capacity is kept)
    pub fn as_vec_mut(&mut self) -> &mut Vec<u8> {
        self.buf.clear();
        &mut self.buf
    }

    /// Replace the contents with a copy of `bytes`
    pub fn fill_from(&mut self, bytes: &[u8]) -> &mut [u8] {
        self.ensure_capacity(bytes.len());
        self.buf.clear();
        self.buf.extend_from_slice(bytes);
        &mut self.buf
    }

    /// Bytes written by the last writer
    pub fn contents(&self) -> &[u8] {
        &self.buf
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Drop the allocation entirely
    pub fn release(&mut self) {
        self.buf = Vec::new();
    }
}

/// Owner-thread scratch memory
///
/// - `decode`: packed pixels produced by the codec before deinterleaving
/// - `glitch`: private copy of compressed bytes the glitch transform mutates
///
/// The encode-side buffers belong to the compression worker, which runs the
/// encoder on its own thread.
#[derive(Debug, Default)]
pub struct ScratchArena {
    pub decode: ScratchBuffer,
    pub glitch: ScratchBuffer,
}

impl ScratchArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total reserved bytes across both buffers
    pub fn memory_usage(&self) -> usize {
        self.decode.capacity() + self.glitch.capacity()
    }

    pub fn release(&mut self) {
        self.decode.release();
        self.glitch.release();
    }
}
