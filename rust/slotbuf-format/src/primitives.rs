//! Wire-level constants, the scalar types a table field or vector element can
//! hold, and bounds-checked little-endian reads.

use slotbuf_common::{Result, error::Error};

/// Unsigned self-relative offset: `target = slot_position + value`.
pub type UOffset = u32;

/// Signed offset from a table to its vtable: `vtable = table - value`.
pub type SOffset = i32;

/// Byte offset of a field within its table, as stored in a vtable entry.
/// Zero means the field is absent.
pub type VOffset = u16;

/// Zero-based ordinal of a field within its table's schema definition.
pub type FieldIndex = u16;

pub const UOFFSET_SIZE: usize = std::mem::size_of::<UOffset>();
pub const SOFFSET_SIZE: usize = std::mem::size_of::<SOffset>();
pub const VOFFSET_SIZE: usize = std::mem::size_of::<VOffset>();

/// Length of the optional leading size prefix.
pub const SIZE_PREFIX_LENGTH: usize = 4;

/// Length of the optional file identifier that follows the root offset.
pub const FILE_IDENTIFIER_LENGTH: usize = 4;

/// Size of the vtable header: vtable byte length and table inline size.
pub const VTABLE_METADATA_SIZE: usize = 2 * VOFFSET_SIZE;

/// Largest buffer the format can address with signed 32-bit offsets.
pub const MAX_BUFFER_SIZE: usize = i32::MAX as usize;

/// Largest natural alignment of any scalar.
pub const MAX_SCALAR_ALIGNMENT: usize = 8;

/// Largest number of fields a single table can declare: the vtable byte length
/// must fit in a [`VOffset`].
pub const MAX_TABLE_FIELDS: usize = (VOffset::MAX as usize - VTABLE_METADATA_SIZE) / VOFFSET_SIZE;

/// Position of a field's entry within its vtable, in bytes.
#[inline]
pub const fn field_index_to_voffset(field: FieldIndex) -> usize {
    VTABLE_METADATA_SIZE + field as usize * VOFFSET_SIZE
}

/// A fixed-width little-endian value stored inline in a table or a vector.
///
/// The alignment of every scalar equals its size.
pub trait Scalar: Copy + PartialEq + std::fmt::Debug + 'static {
    const SIZE: usize;

    /// Decodes a value from exactly `SIZE` little-endian bytes.
    fn from_le_slice(bytes: &[u8]) -> Self;

    /// Encodes the value into exactly `SIZE` bytes.
    fn write_le(self, dst: &mut [u8]);
}

macro_rules! impl_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Scalar for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                #[inline]
                fn from_le_slice(bytes: &[u8]) -> Self {
                    <$ty>::from_le_bytes(bytes.try_into().expect("scalar width"))
                }

                #[inline]
                fn write_le(self, dst: &mut [u8]) {
                    dst.copy_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_scalar!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl Scalar for bool {
    const SIZE: usize = 1;

    #[inline]
    fn from_le_slice(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }

    #[inline]
    fn write_le(self, dst: &mut [u8]) {
        dst[0] = self as u8;
    }
}

/// Returns `len` bytes of `buf` starting at `pos`, or an out-of-bounds error
/// naming `element`.
#[inline]
pub fn slice_at<'a>(buf: &'a [u8], pos: usize, len: usize, element: &str) -> Result<&'a [u8]> {
    match pos.checked_add(len) {
        Some(end) if end <= buf.len() => Ok(&buf[pos..end]),
        _ => Err(Error::out_of_bounds(element, pos, len, buf.len())),
    }
}

/// Reads a scalar at an absolute position, checking it against the buffer end.
#[inline]
pub fn read_scalar<T: Scalar>(buf: &[u8], pos: usize, element: &str) -> Result<T> {
    slice_at(buf, pos, T::SIZE, element).map(T::from_le_slice)
}
