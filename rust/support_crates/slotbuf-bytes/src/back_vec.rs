//! A byte arena that grows from the back.
//!
//! Serializers that emit children before their parents (and only learn sizes once
//! a child is complete) write high-to-low: every new item is placed directly in
//! front of the previously written bytes. [`BackVec`] keeps the written bytes at
//! the end of one contiguous, 64-byte aligned allocation and tracks a single
//! `head` cursor. When the headroom runs out the allocation is doubled and the
//! existing bytes are moved to the end of the new one.

use crate::{
    Bytes,
    buffer::{AlignedByteVec, Buffer},
};

pub struct BackVec {
    /// Zero-initialized storage; `storage.len()` is the full capacity.
    storage: AlignedByteVec,
    /// Index of the first written byte within `storage`.
    head: usize,
}

impl BackVec {
    pub const MIN_CAPACITY: usize = 64;

    pub fn new() -> BackVec {
        BackVec::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> BackVec {
        let capacity = if capacity == 0 {
            0
        } else {
            let capacity = capacity.max(Self::MIN_CAPACITY);
            capacity.checked_next_power_of_two().unwrap_or(capacity)
        };
        BackVec {
            storage: AlignedByteVec::zeroed(capacity),
            head: capacity,
        }
    }

    /// Number of bytes written so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.storage.len() - self.head
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Number of bytes that can be prepended without growing.
    #[inline]
    pub fn headroom(&self) -> usize {
        self.head
    }

    /// Makes sure at least `additional` bytes can be prepended without growing.
    pub fn reserve(&mut self, additional: usize) {
        if self.head < additional {
            self.grow(additional);
        }
    }

    /// Prepends `n` bytes and returns them for the caller to fill.
    ///
    /// The returned bytes are not cleared: they may hold whatever a previous
    /// use of the arena left there.
    pub fn make_space(&mut self, n: usize) -> &mut [u8] {
        self.reserve(n);
        self.head -= n;
        let head = self.head;
        &mut self.storage[head..head + n]
    }

    pub fn push_front(&mut self, bytes: &[u8]) {
        self.make_space(bytes.len()).copy_from_slice(bytes);
    }

    pub fn push_zeros(&mut self, n: usize) {
        self.make_space(n).fill(0);
    }

    /// The written bytes, front to back.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.storage[self.head..]
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        let head = self.head;
        &mut self.storage[head..]
    }

    /// Forgets all written bytes and keeps the allocation.
    pub fn clear(&mut self) {
        self.head = self.storage.len();
    }

    /// Hands the written bytes over as an immutable shared buffer without copying.
    pub fn into_bytes(self) -> Bytes {
        let head = self.head;
        Bytes::from(Buffer::from_byte_vec(self.storage).slice(head..))
    }

    fn grow(&mut self, additional: usize) {
        let used = self.len();
        let required = used.checked_add(additional).expect("back vec size overflow");
        let new_capacity = required
            .max(self.capacity() * 2)
            .max(Self::MIN_CAPACITY)
            .next_power_of_two();
        let mut storage = AlignedByteVec::zeroed(new_capacity);
        let new_head = new_capacity - used;
        storage[new_head..].copy_from_slice(self.as_slice());
        self.storage = storage;
        self.head = new_head;
    }
}

impl Default for BackVec {
    fn default() -> Self {
        BackVec::new()
    }
}

impl std::fmt::Debug for BackVec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackVec")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
