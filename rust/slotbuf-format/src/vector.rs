use std::marker::PhantomData;

use slotbuf_common::{Result, error::Error, try_or_ret_some_err};

use crate::{
    follow::{Follow, Inline},
    primitives::{UOFFSET_SIZE, read_scalar, slice_at},
};

/// A zero-copy view of a length-prefixed vector.
///
/// Construction reads the element count and checks that the whole payload lies
/// inside the buffer; elements are decoded only when accessed. For vectors of
/// [`Indirect`](crate::follow::Indirect) elements each slot holds an offset
/// relative to the slot itself.
pub struct Vector<'a, T> {
    buf: &'a [u8],
    /// Position of the first element (just past the length prefix).
    start: usize,
    len: usize,
    _p: PhantomData<T>,
}

impl<'a, T: Inline<'a>> Vector<'a, T> {
    /// Binds the vector whose length prefix is at `pos`.
    pub fn init(buf: &'a [u8], pos: usize) -> Result<Vector<'a, T>> {
        let len = read_scalar::<u32>(buf, pos, "vector length")? as usize;
        let start = pos + UOFFSET_SIZE;
        let byte_len = len
            .checked_mul(T::SIZE)
            .ok_or_else(|| Error::out_of_bounds("vector", start, usize::MAX, buf.len()))?;
        slice_at(buf, start, byte_len, "vector")?;
        Ok(Vector {
            buf,
            start,
            len,
            _p: PhantomData,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Absolute position of the first element.
    #[inline]
    pub fn position(&self) -> usize {
        self.start
    }

    /// Decodes the element at `index`.
    pub fn get(&self, index: usize) -> Result<T::Inner> {
        if index >= self.len {
            return Err(Error::invalid_arg(
                "index",
                format!("index {index} is out of range for vector of length {}", self.len),
            ));
        }
        T::follow(self.buf, self.start + index * T::SIZE)
    }

    pub fn iter(&self) -> VectorIter<'a, T> {
        VectorIter {
            buf: self.buf,
            pos: self.start,
            remaining: self.len,
            _p: PhantomData,
        }
    }

    /// The raw element bytes, without the length prefix.
    #[inline]
    pub fn bytes(&self) -> &'a [u8] {
        &self.buf[self.start..self.start + self.len * T::SIZE]
    }

    /// Decodes all elements, failing on the first malformed one.
    pub fn to_vec(&self) -> Result<Vec<T::Inner>> {
        self.iter().collect()
    }
}

impl<'a, T> Vector<'a, T>
where
    T: Inline<'a> + bytemuck::Pod,
{
    /// Reinterprets the payload as a slice of `T` without copying.
    ///
    /// Returns `None` when the payload is not aligned for `T` in memory, or on
    /// big-endian targets where the wire representation differs from the native
    /// one; [`Vector::to_vec`] works in either case.
    pub fn as_slice(&self) -> Option<&'a [T]> {
        if cfg!(target_endian = "big") {
            return None;
        }
        bytemuck::try_cast_slice(self.bytes()).ok()
    }
}

impl<T> Clone for Vector<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Vector<'_, T> {}

impl<T> std::fmt::Debug for Vector<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vector")
            .field("start", &self.start)
            .field("len", &self.len)
            .finish()
    }
}

impl<'a, T: Inline<'a>> Follow<'a> for Vector<'a, T> {
    type Inner = Vector<'a, T>;

    #[inline]
    fn follow(buf: &'a [u8], pos: usize) -> Result<Vector<'a, T>> {
        Vector::init(buf, pos)
    }
}

impl<'a, T: Inline<'a>> IntoIterator for Vector<'a, T> {
    type Item = Result<T::Inner>;
    type IntoIter = VectorIter<'a, T>;

    fn into_iter(self) -> VectorIter<'a, T> {
        self.iter()
    }
}

/// Iterates over the decoded elements of a [`Vector`].
///
/// Each item is a `Result`: a malformed element (for instance a table offset
/// pointing outside the buffer) is reported in place and iteration continues.
pub struct VectorIter<'a, T> {
    buf: &'a [u8],
    pos: usize,
    remaining: usize,
    _p: PhantomData<T>,
}

impl<'a, T: Inline<'a>> Iterator for VectorIter<'a, T> {
    type Item = Result<T::Inner>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let pos = self.pos;
        self.pos += T::SIZE;
        self.remaining -= 1;
        let value = try_or_ret_some_err!(T::follow(self.buf, pos));
        Some(Ok(value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, T: Inline<'a>> ExactSizeIterator for VectorIter<'a, T> {}
