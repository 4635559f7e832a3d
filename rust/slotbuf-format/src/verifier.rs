//! Structural verification of untrusted buffers.
//!
//! The accessors in [`table`](crate::table) and [`vector`](crate::vector) are
//! already bounds-checked on every read, so verification is optional. It walks
//! everything reachable from the root once, up front, using the type
//! information generated code provides through [`Verifiable`], and enforces
//! limits on nesting depth, table count and total apparent size.

use log::debug;
use serde::{Deserialize, Serialize};
use slotbuf_common::{
    Result,
    error::{Error, ErrorKind},
};

use crate::{
    follow::{Indirect, Inline, resolve_uoffset},
    primitives::{
        FieldIndex, MAX_BUFFER_SIZE, SOFFSET_SIZE, Scalar, UOFFSET_SIZE, VOFFSET_SIZE,
        read_scalar, slice_at,
    },
    table::Table,
    vector::Vector,
    vtable::VTable,
};

/// Limits applied while verifying a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierOptions {
    /// Maximum nesting of tables.
    pub max_depth: usize,
    /// Maximum number of tables visited.
    pub max_tables: usize,
    /// Maximum number of bytes visited, counting shared data once per reference.
    pub max_apparent_size: usize,
    /// Require naturally aligned positions for scalars, offsets and vtables.
    pub check_alignment: bool,
    /// Require the NUL byte after every string.
    pub require_string_terminator: bool,
}

impl Default for VerifierOptions {
    fn default() -> Self {
        VerifierOptions {
            max_depth: 64,
            max_tables: 1_000_000,
            max_apparent_size: MAX_BUFFER_SIZE,
            check_alignment: true,
            require_string_terminator: true,
        }
    }
}

/// A type whose encoded form can be checked by a [`Verifier`].
pub trait Verifiable {
    /// Whether vector elements of this type must be visited one by one. Plain
    /// scalars are fully covered by the range check of the vector itself.
    const DEEP: bool = true;

    /// Checks the value encoded at absolute position `pos`.
    fn run_verifier(v: &mut Verifier<'_, '_>, pos: usize) -> Result<()>;
}

/// Walks a buffer and accumulates the verification limits.
pub struct Verifier<'a, 'o> {
    buf: &'a [u8],
    options: &'o VerifierOptions,
    depth: usize,
    num_tables: usize,
    apparent_size: usize,
}

impl<'a, 'o> Verifier<'a, 'o> {
    pub fn new(buf: &'a [u8], options: &'o VerifierOptions) -> Verifier<'a, 'o> {
        Verifier {
            buf,
            options,
            depth: 0,
            num_tables: 0,
            apparent_size: 0,
        }
    }

    pub fn buf(&self) -> &'a [u8] {
        self.buf
    }

    pub fn num_tables(&self) -> usize {
        self.num_tables
    }

    pub fn apparent_size(&self) -> usize {
        self.apparent_size
    }

    /// Verifies the value referenced by the root offset stored at `slot`.
    pub fn verify_root<T: Verifiable>(&mut self, slot: usize) -> Result<()> {
        let result = self.verify_root_inner::<T>(slot);
        if let Err(e) = &result {
            debug!("buffer verification failed: {e}");
        }
        result
    }

    fn verify_root_inner<T: Verifiable>(&mut self, slot: usize) -> Result<()> {
        if self.buf.len() > MAX_BUFFER_SIZE {
            return Err(Error::capacity_exceeded(
                "buffer",
                MAX_BUFFER_SIZE,
                self.buf.len(),
            ));
        }
        self.check_range("root offset", slot, UOFFSET_SIZE)?;
        self.count(UOFFSET_SIZE)?;
        Indirect::<T>::run_verifier(self, slot)
    }

    /// Checks that `len` bytes at `pos` lie inside the buffer.
    pub fn check_range(&self, element: &str, pos: usize, len: usize) -> Result<()> {
        slice_at(self.buf, pos, len, element).map(|_| ())
    }

    /// Checks the natural alignment of `pos`, relative to the buffer start.
    pub fn check_alignment(&self, element: &str, pos: usize, alignment: usize) -> Result<()> {
        if self.options.check_alignment && pos % alignment != 0 {
            return Err(Error::unaligned(element, pos, alignment));
        }
        Ok(())
    }

    /// Adds `len` visited bytes to the apparent size.
    fn count(&mut self, len: usize) -> Result<()> {
        self.apparent_size = self.apparent_size.saturating_add(len);
        if self.apparent_size > self.options.max_apparent_size {
            return Err(Error::capacity_exceeded(
                "apparent size",
                self.options.max_apparent_size,
                self.apparent_size,
            ));
        }
        Ok(())
    }

    /// Resolves the uoffset at `pos` after checking its alignment.
    pub fn deref_uoffset(&self, pos: usize) -> Result<usize> {
        self.check_alignment("uoffset", pos, UOFFSET_SIZE)?;
        resolve_uoffset(self.buf, pos)
    }

    /// Enters the table at `pos`: checks its vtable and inline data and returns
    /// a [`TableVerifier`] for its fields.
    pub fn visit_table<'v>(&'v mut self, pos: usize) -> Result<TableVerifier<'v, 'a, 'o>> {
        self.depth += 1;
        if self.depth > self.options.max_depth {
            return Err(Error::capacity_exceeded(
                "table depth",
                self.options.max_depth,
                self.depth,
            ));
        }
        self.num_tables += 1;
        if self.num_tables > self.options.max_tables {
            return Err(Error::capacity_exceeded(
                "table count",
                self.options.max_tables,
                self.num_tables,
            ));
        }

        self.check_alignment("table", pos, SOFFSET_SIZE)?;
        let table = Table::new(self.buf, pos);
        let vtable = table.vtable()?;
        self.check_alignment("vtable", vtable.position(), VOFFSET_SIZE)?;
        self.count(vtable.byte_len())?;
        self.check_range("table", pos, vtable.table_size())?;
        self.count(vtable.table_size())?;
        Ok(TableVerifier {
            verifier: self,
            pos,
            vtable,
        })
    }

    /// Checks a length-prefixed string, its terminator and its encoding.
    pub fn verify_string(&mut self, pos: usize) -> Result<()> {
        self.check_alignment("string", pos, UOFFSET_SIZE)?;
        let len = read_scalar::<u32>(self.buf, pos, "string length")? as usize;
        let start = pos + UOFFSET_SIZE;
        let bytes = slice_at(self.buf, start, len, "string")?;
        if self.options.require_string_terminator {
            match self.buf.get(start + len) {
                Some(0) => {}
                Some(_) => {
                    return Err(Error::invalid_format(
                        "string",
                        format!("string at {pos} is not NUL-terminated"),
                    ));
                }
                None => {
                    return Err(Error::out_of_bounds(
                        "string terminator",
                        start + len,
                        1,
                        self.buf.len(),
                    ));
                }
            }
        }
        self.count(UOFFSET_SIZE + len + 1)?;
        std::str::from_utf8(bytes).map_err(|source| {
            Error::from(ErrorKind::InvalidUtf8 {
                position: pos,
                source,
            })
        })?;
        Ok(())
    }

    /// Checks a vector's length prefix and payload range, and visits every
    /// element when the element type requires it.
    pub fn verify_vector<T: Verifiable>(
        &mut self,
        pos: usize,
        elem_size: usize,
        elem_align: usize,
    ) -> Result<()> {
        self.check_alignment("vector", pos, UOFFSET_SIZE)?;
        let len = read_scalar::<u32>(self.buf, pos, "vector length")? as usize;
        let start = pos + UOFFSET_SIZE;
        let byte_len = len
            .checked_mul(elem_size)
            .ok_or_else(|| Error::out_of_bounds("vector", start, usize::MAX, self.buf.len()))?;
        self.check_alignment("vector elements", start, elem_align)?;
        self.check_range("vector", start, byte_len)?;
        self.count(UOFFSET_SIZE + byte_len)?;
        if T::DEEP {
            for i in 0..len {
                T::run_verifier(self, start + i * elem_size)?;
            }
        }
        Ok(())
    }
}

/// Verifies the fields of one table. Obtained from [`Verifier::visit_table`]
/// and consumed by [`TableVerifier::finish`].
pub struct TableVerifier<'v, 'a, 'o> {
    verifier: &'v mut Verifier<'a, 'o>,
    pos: usize,
    vtable: VTable<'a>,
}

impl<'v, 'a, 'o> TableVerifier<'v, 'a, 'o> {
    /// Verifies a field stored in place (a scalar or a struct).
    pub fn visit_field<T: Verifiable>(
        self,
        name: &str,
        field: FieldIndex,
        required: bool,
    ) -> Result<Self> {
        let offset = self.vtable.get(field)?;
        if offset == 0 {
            if required {
                return Err(Error::invalid_format(name, "required field is missing"));
            }
            return Ok(self);
        }
        T::run_verifier(self.verifier, self.pos + offset as usize)?;
        Ok(self)
    }

    /// Verifies a field holding an offset to a string, vector or table.
    pub fn visit_indirect<T: Verifiable>(
        self,
        name: &str,
        field: FieldIndex,
        required: bool,
    ) -> Result<Self> {
        self.visit_field::<Indirect<T>>(name, field, required)
    }

    /// Verifies a union: `T` is checked only when the discriminant stored in
    /// `type_field` equals `expected`.
    pub fn visit_union<T: Verifiable>(
        self,
        name: &str,
        type_field: FieldIndex,
        field: FieldIndex,
        expected: u8,
    ) -> Result<Self> {
        let tag = Table::new(self.verifier.buf, self.pos).get::<u8>(type_field, 0)?;
        if tag != expected {
            return Ok(self);
        }
        self.visit_indirect::<T>(name, field, true)
    }

    /// Leaves the table.
    pub fn finish(self) -> Result<()> {
        self.verifier.depth -= 1;
        Ok(())
    }
}

macro_rules! impl_verifiable_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Verifiable for $ty {
                const DEEP: bool = false;

                #[inline]
                fn run_verifier(v: &mut Verifier<'_, '_>, pos: usize) -> Result<()> {
                    let size = <$ty as Scalar>::SIZE;
                    v.check_alignment(stringify!($ty), pos, size)?;
                    v.check_range(stringify!($ty), pos, size)
                }
            }
        )*
    };
}

impl_verifiable_scalar!(bool, u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl Verifiable for &str {
    fn run_verifier(v: &mut Verifier<'_, '_>, pos: usize) -> Result<()> {
        v.verify_string(pos)
    }
}

impl<T: Verifiable> Verifiable for Indirect<T> {
    fn run_verifier(v: &mut Verifier<'_, '_>, pos: usize) -> Result<()> {
        let target = v.deref_uoffset(pos)?;
        T::run_verifier(v, target)
    }
}

impl<'x, T: Inline<'x> + Verifiable> Verifiable for Vector<'x, T> {
    fn run_verifier(v: &mut Verifier<'_, '_>, pos: usize) -> Result<()> {
        v.verify_vector::<T>(pos, T::SIZE, T::ALIGN)
    }
}

/// An opaque table: only its vtable and inline extent are checked.
impl Verifiable for Table<'_> {
    fn run_verifier(v: &mut Verifier<'_, '_>, pos: usize) -> Result<()> {
        v.visit_table(pos)?.finish()
    }
}
