use std::{
    ops::{Bound, Range, RangeBounds},
    sync::Arc,
};

use crate::align::{align_up, is_aligned};

/// A byte vector that maintains memory alignment guarantees for its underlying storage.
///
/// The first byte of the vector is aligned to the alignment requested at creation
/// (64 bytes by default), which lets readers hand out zero-copy typed slices over
/// naturally aligned payloads.
pub struct AlignedByteVec {
    /// The underlying byte vector, may include padding at start
    inner: Vec<u8>,
    /// Offset from start of inner vec to maintain alignment
    start: u32,
    /// Required alignment, specified during vector creation.
    alignment: u32,
}

impl AlignedByteVec {
    pub const ALIGNMENT: usize = 64;

    pub const BLOCK_SIZE: usize = 64;

    /// Creates a new empty vector with no capacity allocation.
    pub fn new() -> AlignedByteVec {
        AlignedByteVec {
            inner: Vec::new(),
            start: 0,
            alignment: Self::ALIGNMENT as u32,
        }
    }

    /// Creates a new vector with the specified capacity, ensuring alignment requirements are met.
    pub fn with_capacity(capacity: usize) -> AlignedByteVec {
        Self::with_capacity_and_alignment(capacity, Self::ALIGNMENT)
    }

    /// Creates a new vector with the specified capacity and alignment.
    pub fn with_capacity_and_alignment(capacity: usize, alignment: usize) -> AlignedByteVec {
        Self::make(capacity, alignment)
    }

    /// Creates a new vector of specified length, filled with zeros.
    pub fn zeroed(len: usize) -> AlignedByteVec {
        let mut v = AlignedByteVec::with_capacity(len);
        v.resize(len, 0);
        v
    }

    /// Creates a new vector containing a copy of the provided slice.
    pub fn copy_from_slice(data: &[u8]) -> AlignedByteVec {
        let mut vec = AlignedByteVec::with_capacity(data.len());
        vec.extend_from_slice(data);
        vec
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len() - self.start_offset()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of bytes the vector can hold without reallocating.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.capacity() - self.start_offset()
    }

    #[inline]
    pub fn alignment(&self) -> usize {
        self.alignment as usize
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.inner[self.start_offset()..]
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        let start = self.start_offset();
        &mut self.inner[start..]
    }

    /// Reserves capacity for at least `additional` more bytes.
    pub fn reserve(&mut self, additional: usize) {
        if self.capacity() - self.len() >= additional {
            return;
        }
        self.grow(additional);
    }

    pub fn extend_from_slice(&mut self, s: &[u8]) {
        self.reserve(s.len());
        self.inner.extend_from_slice(s);
    }

    /// Resizes the vector to `new_len`, filling any new bytes with `value`.
    pub fn resize(&mut self, new_len: usize, value: u8) {
        if new_len > self.len() {
            self.reserve(new_len - self.len());
        }
        let start = self.start_offset();
        self.inner.resize(start + new_len, value);
    }

    pub fn truncate(&mut self, new_len: usize) {
        let start = self.start_offset();
        self.inner.truncate(start + new_len);
    }

    pub fn clear(&mut self) {
        self.truncate(0);
    }
}

impl AlignedByteVec {
    fn make(capacity: usize, alignment: usize) -> AlignedByteVec {
        let alignment = alignment.max(1);
        assert!(alignment.is_power_of_two());

        if capacity == 0 {
            return AlignedByteVec {
                inner: Vec::new(),
                start: 0,
                alignment: alignment as u32,
            };
        }

        let vec_capacity = align_up(capacity, Self::BLOCK_SIZE)
            .checked_add(alignment)
            .expect("add");

        let mut vec = Vec::<u8>::with_capacity(vec_capacity);

        let p = vec.as_ptr() as usize;
        let start = align_up(p, alignment) - p;
        vec.resize(start, 0);

        let res = AlignedByteVec {
            inner: vec,
            start: start as u32,
            alignment: alignment as u32,
        };
        assert!(res.capacity() >= capacity);
        res
    }

    fn grow(&mut self, additional: usize) {
        let required = self.len().checked_add(additional).expect("add");
        let new_capacity = required.max(self.capacity() * 2);
        let mut grown = AlignedByteVec::make(new_capacity, self.alignment());
        grown.inner.extend_from_slice(self.as_slice());
        *self = grown;
    }

    #[inline]
    fn start_offset(&self) -> usize {
        self.start as usize
    }
}

impl std::ops::Deref for AlignedByteVec {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl std::ops::DerefMut for AlignedByteVec {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.as_mut_slice()
    }
}

impl Clone for AlignedByteVec {
    fn clone(&self) -> AlignedByteVec {
        let mut vec = AlignedByteVec::with_capacity_and_alignment(self.len(), self.alignment());
        vec.extend_from_slice(self.as_slice());
        vec
    }
}

impl std::fmt::Debug for AlignedByteVec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedByteVec")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("alignment", &self.alignment)
            .finish()
    }
}

impl Default for AlignedByteVec {
    fn default() -> Self {
        AlignedByteVec::new()
    }
}

/// An immutable, reference-counted window into an [`AlignedByteVec`].
///
/// Cloning and slicing a `Buffer` never copies the underlying bytes.
#[derive(Clone)]
pub struct Buffer {
    owner: Arc<AlignedByteVec>,
    range: Range<usize>,
}

impl Buffer {
    /// Creates a new empty buffer.
    pub fn new() -> Buffer {
        Buffer::from_byte_vec(AlignedByteVec::new())
    }

    /// Takes ownership of the vector without copying its contents.
    pub fn from_byte_vec(vec: AlignedByteVec) -> Buffer {
        let len = vec.len();
        Buffer {
            owner: Arc::new(vec),
            range: 0..len,
        }
    }

    pub fn copy_from_slice(data: &[u8]) -> Buffer {
        Buffer::from_byte_vec(AlignedByteVec::copy_from_slice(data))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.range.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.owner.as_slice()[self.range.clone()]
    }

    /// Creates a zero-copy sub-buffer.
    ///
    /// # Panics
    ///
    /// Panics if the range is out of bounds or inverted.
    pub fn slice(&self, range: impl RangeBounds<usize>) -> Buffer {
        let range = self.verify_range(range);
        Buffer {
            owner: self.owner.clone(),
            range: self.range.start + range.start..self.range.start + range.end,
        }
    }

    /// Checks whether the first byte of the buffer is aligned to `alignment` in memory.
    pub fn is_aligned(&self, alignment: usize) -> bool {
        is_aligned_ptr(self.as_slice().as_ptr(), alignment)
    }

    /// Returns a buffer with the same contents whose start is aligned to `alignment`,
    /// copying only when the current start is misaligned.
    pub fn align(&self, alignment: usize) -> Buffer {
        if self.is_aligned(alignment) {
            return self.clone();
        }
        let mut vec = AlignedByteVec::with_capacity_and_alignment(self.len(), alignment);
        vec.extend_from_slice(self.as_slice());
        Buffer::from_byte_vec(vec)
    }
}

impl Buffer {
    fn verify_range(&self, range: impl RangeBounds<usize>) -> Range<usize> {
        let start = match range.start_bound() {
            Bound::Included(&s) => s,
            Bound::Excluded(&s) => s.checked_add(1).expect("range start"),
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&e) => e.checked_add(1).expect("range end"),
            Bound::Excluded(&e) => e,
            Bound::Unbounded => self.len(),
        };
        assert!(start <= end, "slice start {start} is past end {end}");
        assert!(
            end <= self.len(),
            "slice end {end} is out of bounds for length {}",
            self.len()
        );
        start..end
    }
}

impl std::ops::Deref for Buffer {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("len", &self.len())
            .field("range", &self.range)
            .finish()
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Buffer::new()
    }
}

impl From<AlignedByteVec> for Buffer {
    fn from(vec: AlignedByteVec) -> Buffer {
        Buffer::from_byte_vec(vec)
    }
}

#[inline]
fn is_aligned_ptr(ptr: *const u8, alignment: usize) -> bool {
    is_aligned(ptr as usize, alignment)
}
