//! Zero-copy decoding of values at a known position.
//!
//! [`Follow`] turns `(buffer, position)` into a typed value without copying:
//! scalars are read in place, strings borrow the buffer, and tables and vectors
//! become lightweight views. [`Indirect`] adds one level of self-relative offset
//! resolution in front of any other `Follow` type, which is how table slots and
//! vector slots reference strings, vectors and sub-tables.

use std::marker::PhantomData;

use slotbuf_common::{
    Result,
    error::{Error, ErrorKind},
};

use crate::primitives::{Scalar, UOFFSET_SIZE, UOffset, read_scalar, slice_at};

/// Decodes a value located at an absolute buffer position.
pub trait Follow<'a> {
    type Inner;

    fn follow(buf: &'a [u8], pos: usize) -> Result<Self::Inner>;
}

/// A [`Follow`] type with a fixed inline footprint, usable as a table field
/// stored in place or as a vector element.
pub trait Inline<'a>: Follow<'a> {
    const SIZE: usize;
    const ALIGN: usize;
}

/// Resolves the self-relative offset stored at `slot`.
///
/// The result is `slot + value`; it must point inside the buffer.
#[inline]
pub fn resolve_uoffset(buf: &[u8], slot: usize) -> Result<usize> {
    let value = read_scalar::<UOffset>(buf, slot, "uoffset")? as usize;
    match slot.checked_add(value) {
        Some(target) if target < buf.len() => Ok(target),
        _ => Err(Error::out_of_bounds(
            "uoffset target",
            slot.saturating_add(value),
            1,
            buf.len(),
        )),
    }
}

/// Marker for a slot holding a [`UOffset`] to a value of type `T`.
pub struct Indirect<T>(PhantomData<T>);

impl<'a, T: Follow<'a>> Follow<'a> for Indirect<T> {
    type Inner = T::Inner;

    #[inline]
    fn follow(buf: &'a [u8], pos: usize) -> Result<Self::Inner> {
        T::follow(buf, resolve_uoffset(buf, pos)?)
    }
}

impl<'a, T: Follow<'a>> Inline<'a> for Indirect<T> {
    const SIZE: usize = UOFFSET_SIZE;
    const ALIGN: usize = UOFFSET_SIZE;
}

macro_rules! impl_follow_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl<'a> Follow<'a> for $ty {
                type Inner = $ty;

                #[inline]
                fn follow(buf: &'a [u8], pos: usize) -> Result<$ty> {
                    read_scalar::<$ty>(buf, pos, stringify!($ty))
                }
            }

            impl<'a> Inline<'a> for $ty {
                const SIZE: usize = <$ty as Scalar>::SIZE;
                const ALIGN: usize = <$ty as Scalar>::SIZE;
            }
        )*
    };
}

impl_follow_scalar!(bool, u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

/// Raw bytes of a string: the length-prefixed payload, without the terminator.
pub(crate) fn follow_string_bytes(buf: &[u8], pos: usize) -> Result<&[u8]> {
    let len = read_scalar::<u32>(buf, pos, "string length")? as usize;
    slice_at(buf, pos + UOFFSET_SIZE, len, "string")
}

impl<'a> Follow<'a> for &'a str {
    type Inner = &'a str;

    fn follow(buf: &'a [u8], pos: usize) -> Result<&'a str> {
        let bytes = follow_string_bytes(buf, pos)?;
        std::str::from_utf8(bytes).map_err(|source| {
            ErrorKind::InvalidUtf8 {
                position: pos,
                source,
            }
            .into()
        })
    }
}
