use std::marker::PhantomData;

/// A typed reference to an item already written by a [`Builder`](crate::builder::Builder).
///
/// The value is measured from the *end* of the buffer under construction (the
/// number of bytes written when the item was completed), which stays stable while
/// the buffer keeps growing at the front. It is turned into a self-relative
/// [`UOffset`](crate::primitives::UOffset) only when it is stored into a slot.
///
/// The type parameter records what the offset points at: `str` for strings,
/// `[E]` for vectors of `E`, [`TableFinished`] or a schema-specific marker for
/// tables.
pub struct WIPOffset<T: ?Sized> {
    value: u32,
    _p: PhantomData<T>,
}

/// Marker for a table whose concrete schema type is not tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFinished {}

impl<T: ?Sized> WIPOffset<T> {
    #[inline]
    pub fn new(value: u32) -> WIPOffset<T> {
        WIPOffset {
            value,
            _p: PhantomData,
        }
    }

    #[inline]
    pub fn value(&self) -> u32 {
        self.value
    }

    /// Reinterprets the offset as pointing to a different type.
    #[inline]
    pub fn cast<U: ?Sized>(self) -> WIPOffset<U> {
        WIPOffset::new(self.value)
    }

    /// Erases the target type, e.g. to store a table of any type in a union slot.
    #[inline]
    pub fn as_untyped(self) -> WIPOffset<TableFinished> {
        self.cast()
    }
}

impl<T: ?Sized> Clone for WIPOffset<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for WIPOffset<T> {}

impl<T: ?Sized> PartialEq for WIPOffset<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T: ?Sized> Eq for WIPOffset<T> {}

impl<T: ?Sized> std::fmt::Debug for WIPOffset<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WIPOffset({})", self.value)
    }
}
