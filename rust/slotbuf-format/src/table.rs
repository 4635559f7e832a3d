use slotbuf_common::{Result, error::Error};

use crate::{
    follow::{Follow, Indirect, Inline, resolve_uoffset},
    primitives::{FieldIndex, SOffset, Scalar, read_scalar, slice_at},
    vector::Vector,
    vtable::VTable,
};

/// A zero-copy view of one table: the buffer it lives in and the table's
/// absolute position.
///
/// Creating a `Table` copies and validates nothing. Every accessor resolves the
/// vtable and the requested field on demand and checks each dereference against
/// the buffer bounds: an absent field yields `Ok(None)` (or the default), while a
/// malformed buffer yields an error for the accessed field only.
#[derive(Clone, Copy)]
pub struct Table<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Table<'a> {
    #[inline]
    pub fn new(buf: &'a [u8], pos: usize) -> Table<'a> {
        Table { buf, pos }
    }

    #[inline]
    pub fn buf(&self) -> &'a [u8] {
        self.buf
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Resolves this table's vtable through the leading soffset.
    pub fn vtable(&self) -> Result<VTable<'a>> {
        let soffset = read_scalar::<SOffset>(self.buf, self.pos, "table soffset")? as i64;
        let vtable_pos = self.pos as i64 - soffset;
        if vtable_pos < 0 || vtable_pos >= self.buf.len() as i64 {
            return Err(Error::out_of_bounds(
                "vtable",
                vtable_pos.max(0) as usize,
                1,
                self.buf.len(),
            ));
        }
        VTable::init(self.buf, vtable_pos as usize)
    }

    /// Offset of `field` from the table start, `0` when absent.
    pub fn field_offset(&self, field: FieldIndex) -> Result<u16> {
        self.vtable()?.get(field)
    }

    /// Absolute position of the field's inline value, if present.
    pub fn field_position(&self, field: FieldIndex) -> Result<Option<usize>> {
        Ok(match self.field_offset(field)? {
            0 => None,
            offset => Some(self.pos + offset as usize),
        })
    }

    /// Returns `true` if the field was never written (or was elided as default).
    pub fn is_absent(&self, field: FieldIndex) -> Result<bool> {
        Ok(self.field_offset(field)? == 0)
    }

    /// Reads a scalar field, falling back to `default` when the field is absent.
    pub fn get<T: Scalar>(&self, field: FieldIndex, default: T) -> Result<T> {
        Ok(self.get_optional(field)?.unwrap_or(default))
    }

    /// Reads a scalar field, `None` when absent.
    pub fn get_optional<T: Scalar>(&self, field: FieldIndex) -> Result<Option<T>> {
        match self.field_position(field)? {
            Some(pos) => Ok(Some(read_scalar::<T>(self.buf, pos, "table field")?)),
            None => Ok(None),
        }
    }

    /// Decodes a value stored in place within the table (scalars and structs).
    pub fn get_inline<T: Inline<'a>>(&self, field: FieldIndex) -> Result<Option<T::Inner>> {
        match self.field_position(field)? {
            Some(pos) => Ok(Some(T::follow(self.buf, pos)?)),
            None => Ok(None),
        }
    }

    /// Decodes a value referenced from the field's slot by a uoffset.
    pub fn get_indirect<T: Follow<'a>>(&self, field: FieldIndex) -> Result<Option<T::Inner>> {
        match self.field_position(field)? {
            Some(pos) => Ok(Some(Indirect::<T>::follow(self.buf, pos)?)),
            None => Ok(None),
        }
    }

    pub fn get_str(&self, field: FieldIndex) -> Result<Option<&'a str>> {
        self.get_indirect::<&'a str>(field)
    }

    /// Reads a `[ubyte]` vector field as a byte slice.
    pub fn get_bytes(&self, field: FieldIndex) -> Result<Option<&'a [u8]>> {
        Ok(self.get_vector::<u8>(field)?.map(|v| v.bytes()))
    }

    pub fn get_vector<T: Inline<'a>>(&self, field: FieldIndex) -> Result<Option<Vector<'a, T>>> {
        self.get_indirect::<Vector<'a, T>>(field)
    }

    pub fn get_table(&self, field: FieldIndex) -> Result<Option<Table<'a>>> {
        self.get_indirect::<Table<'a>>(field)
    }

    /// Returns the `size` raw bytes of a struct stored in place.
    pub fn get_struct_bytes(&self, field: FieldIndex, size: usize) -> Result<Option<&'a [u8]>> {
        match self.field_position(field)? {
            Some(pos) => Ok(Some(slice_at(self.buf, pos, size, "struct field")?)),
            None => Ok(None),
        }
    }

    /// Number of elements of a vector field; `0` when the field is absent.
    pub fn vector_len(&self, field: FieldIndex) -> Result<usize> {
        match self.field_position(field)? {
            Some(pos) => {
                let start = self.indirect(pos)?;
                Ok(read_scalar::<u32>(self.buf, start, "vector length")? as usize)
            }
            None => Ok(0),
        }
    }

    /// Resolves the self-relative uoffset stored at absolute position `slot`.
    #[inline]
    pub fn indirect(&self, slot: usize) -> Result<usize> {
        resolve_uoffset(self.buf, slot)
    }

    /// Returns the union member stored as a table at `field` if the discriminant
    /// in `type_field` equals `expected`.
    pub fn get_union(
        &self,
        type_field: FieldIndex,
        field: FieldIndex,
        expected: u8,
    ) -> Result<Option<Table<'a>>> {
        if self.get::<u8>(type_field, 0)? != expected {
            return Ok(None);
        }
        self.get_table(field)
    }
}

impl<'a> Follow<'a> for Table<'a> {
    type Inner = Table<'a>;

    #[inline]
    fn follow(buf: &'a [u8], pos: usize) -> Result<Table<'a>> {
        Ok(Table::new(buf, pos))
    }
}

impl std::fmt::Debug for Table<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("pos", &self.pos)
            .field("buf_len", &self.buf.len())
            .finish()
    }
}
