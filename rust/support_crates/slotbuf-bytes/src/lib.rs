//! Byte buffers for the slotbuf encoder and readers: a back-filled arena for
//! building, and shared immutable buffers for finished output, with built-in
//! support for proper alignment.

use std::ops::RangeBounds;

use buffer::Buffer;

pub mod align;
pub mod back_vec;
pub mod buffer;

pub use back_vec::BackVec;

/// A contiguous, immutable memory region that can be shared with other buffers and across
/// thread boundaries.
///
/// `Bytes` can be sliced and cloned without copying the underlying data.
///
/// The backing buffer is guaranteed to have at least 64-byte alignment when created by
/// copying a slice.
#[derive(Debug, Clone)]
pub struct Bytes(Buffer);

impl Bytes {
    pub const PREFERRED_ALIGNMENT: usize = 64;

    /// Creates a new empty `Bytes`.
    #[inline]
    pub fn new() -> Self {
        Bytes(Buffer::new())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Creates a new `Bytes` by copying data from a slice.
    pub fn copy_from_slice(data: &[u8]) -> Bytes {
        Bytes(Buffer::copy_from_slice(data))
    }

    /// Creates a new `Bytes` by slicing the current `Bytes` within the given range.
    ///
    /// This operation is zero-copy; it does not allocate new memory.
    ///
    /// # Panics
    ///
    /// Panics if the range is out of bounds.
    pub fn slice(&self, range: impl RangeBounds<usize>) -> Bytes {
        Bytes(self.0.slice(range))
    }

    /// Checks if the `Bytes` instance is aligned to the specified alignment.
    pub fn is_aligned(&self, alignment: usize) -> bool {
        self.0.is_aligned(alignment)
    }

    /// Aligns the buffer to the specified alignment. If the buffer is already aligned,
    /// it returns a cloned reference to the buffer. Otherwise, it creates a new buffer
    /// with a copy of the data.
    pub fn align(&self, alignment: usize) -> Bytes {
        Bytes(self.0.align(alignment))
    }
}

impl std::ops::Deref for Bytes {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.0.as_slice()
    }
}

impl AsRef<[u8]> for Bytes {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl Default for Bytes {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Buffer> for Bytes {
    fn from(buf: Buffer) -> Self {
        Bytes(buf)
    }
}

impl From<BackVec> for Bytes {
    fn from(v: BackVec) -> Self {
        v.into_bytes()
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(vec: Vec<u8>) -> Self {
        Bytes::copy_from_slice(&vec)
    }
}

impl From<&[u8]> for Bytes {
    fn from(s: &[u8]) -> Self {
        Self::copy_from_slice(s)
    }
}

impl PartialEq for Bytes {
    fn eq(&self, other: &Self) -> bool {
        self[..] == other[..]
    }
}

impl Eq for Bytes {}
