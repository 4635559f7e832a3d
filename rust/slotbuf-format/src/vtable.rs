//! The per-table field offset map.
//!
//! Layout, every entry a little-endian [`VOffset`]:
//!
//! ```text
//! [vtable_byte_len][table_inline_size][field 0][field 1]...[field n-1]
//! ```
//!
//! A field entry is the distance from the table start to the field's inline
//! value; zero (or an entry beyond `vtable_byte_len`) marks the field absent.

use slotbuf_common::{Result, error::Error, verify_data};

use crate::primitives::{
    FieldIndex, SOFFSET_SIZE, VOFFSET_SIZE, VOffset, VTABLE_METADATA_SIZE, field_index_to_voffset,
    read_scalar, slice_at,
};

#[derive(Clone, Copy)]
pub struct VTable<'a> {
    buf: &'a [u8],
    pos: usize,
    byte_len: usize,
    table_size: usize,
}

impl<'a> VTable<'a> {
    /// Binds the vtable at `pos`, checking that its header is consistent and
    /// that the whole vtable lies inside the buffer.
    pub fn init(buf: &'a [u8], pos: usize) -> Result<VTable<'a>> {
        let byte_len = read_scalar::<VOffset>(buf, pos, "vtable length")? as usize;
        let table_size = read_scalar::<VOffset>(buf, pos + VOFFSET_SIZE, "vtable table size")? as usize;
        verify_data!(vtable_length, byte_len >= VTABLE_METADATA_SIZE);
        verify_data!(vtable_length, byte_len % VOFFSET_SIZE == 0);
        verify_data!(table_size, table_size >= SOFFSET_SIZE);
        slice_at(buf, pos, byte_len, "vtable")?;
        Ok(VTable {
            buf,
            pos,
            byte_len,
            table_size,
        })
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Size of the vtable itself, in bytes.
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    /// Size of the table's inline data, including its leading soffset.
    #[inline]
    pub fn table_size(&self) -> usize {
        self.table_size
    }

    /// Number of field entries physically present in this vtable.
    #[inline]
    pub fn num_fields(&self) -> usize {
        (self.byte_len - VTABLE_METADATA_SIZE) / VOFFSET_SIZE
    }

    /// Offset of `field` within its table, `0` when the field is absent.
    ///
    /// Fails if the entry points outside the table's inline data.
    pub fn get(&self, field: FieldIndex) -> Result<VOffset> {
        let slot = field_index_to_voffset(field);
        if slot + VOFFSET_SIZE > self.byte_len {
            return Ok(0);
        }
        let offset = read_scalar::<VOffset>(self.buf, self.pos + slot, "vtable entry")?;
        if offset != 0 && ((offset as usize) < SOFFSET_SIZE || offset as usize >= self.table_size) {
            return Err(Error::invalid_format(
                "vtable entry",
                format!(
                    "field {field} offset {offset} is outside table of {} bytes",
                    self.table_size
                ),
            ));
        }
        Ok(offset)
    }

    /// The raw vtable bytes.
    pub fn as_bytes(&self) -> &'a [u8] {
        &self.buf[self.pos..self.pos + self.byte_len]
    }
}

impl std::fmt::Debug for VTable<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VTable")
            .field("pos", &self.pos)
            .field("byte_len", &self.byte_len)
            .field("table_size", &self.table_size)
            .finish()
    }
}

/// Serializes a vtable for a table of `table_size` inline bytes whose fields live
/// at the given offsets (zero for absent fields) into `out`, replacing its contents.
///
/// Trailing absent fields are expected to be trimmed by the caller.
pub(crate) fn encode_vtable(field_offsets: &[VOffset], table_size: VOffset, out: &mut Vec<u8>) {
    out.clear();
    let byte_len = (VTABLE_METADATA_SIZE + field_offsets.len() * VOFFSET_SIZE) as VOffset;
    out.extend_from_slice(&byte_len.to_le_bytes());
    out.extend_from_slice(&table_size.to_le_bytes());
    for offset in field_offsets {
        out.extend_from_slice(&offset.to_le_bytes());
    }
}
