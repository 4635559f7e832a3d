//! Back-to-front serializer for tables, vectors and strings.
//!
//! Children are always written before their parents: a string or a sub-table is
//! completed first and yields a [`WIPOffset`], which the parent then stores into
//! one of its slots. The buffer therefore grows towards lower addresses, and all
//! builder-side positions are measured from the end of the buffer.

use ahash::AHashMap;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use slotbuf_bytes::{BackVec, Bytes, align::back_padding};
use slotbuf_common::{Result, error::Error, verify_arg};
use xxhash_rust::xxh3::xxh3_64;

use crate::{
    offset::{TableFinished, WIPOffset},
    primitives::{
        FILE_IDENTIFIER_LENGTH, FieldIndex, MAX_BUFFER_SIZE, MAX_TABLE_FIELDS, SOFFSET_SIZE,
        SOffset, Scalar, UOFFSET_SIZE, VOFFSET_SIZE, VOffset,
    },
    root::OwnedRoot,
    table::Table,
    vtable::encode_vtable,
};

/// Builder configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderOptions {
    /// Bytes to allocate up front.
    pub initial_capacity: usize,
    /// Largest buffer the builder may produce; clamped to `i32::MAX`.
    pub max_buffer_size: usize,
    /// Write scalar fields even when they equal their schema default.
    pub force_defaults: bool,
    /// Route [`Builder::create_string`] through the shared string pool.
    pub dedup_strings: bool,
    /// Share identical vtables between tables.
    pub dedup_vtables: bool,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        BuilderOptions {
            initial_capacity: 1024,
            max_buffer_size: MAX_BUFFER_SIZE,
            force_defaults: false,
            dedup_strings: false,
            dedup_vtables: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    InObject {
        num_fields: usize,
        /// Builder offset at `start_object`.
        start: usize,
    },
    InVector {
        elem_size: usize,
        num_elems: usize,
        /// Builder offset at `start_vector`, after alignment.
        start: usize,
    },
    Finished {
        size_prefixed: bool,
    },
    Poisoned,
}

#[derive(Debug, Clone, Copy)]
struct FieldLoc {
    field: FieldIndex,
    /// Builder offset of the field's inline value.
    offset: usize,
}

/// Serializes one buffer at a time.
///
/// All mutating calls take `&mut self`; the finished bytes are handed out by
/// [`Builder::finished_data`] or [`Builder::into_bytes`]. A protocol violation
/// or an exceeded size limit poisons the builder: every later call fails with
/// an invalid operation error until [`Builder::reset`].
pub struct Builder {
    buf: BackVec,
    options: BuilderOptions,
    min_align: usize,
    state: State,
    field_locs: Vec<FieldLoc>,
    /// vtable content hash -> builder offsets of vtables with that hash.
    vtables: AHashMap<u64, Vec<u32>>,
    num_vtables: usize,
    /// string content hash -> builder offsets of shared strings.
    strings: AHashMap<u64, Vec<u32>>,
    vtable_fields: Vec<VOffset>,
    vtable_bytes: Vec<u8>,
}

impl Builder {
    pub fn new() -> Builder {
        Builder::with_options(BuilderOptions::default())
    }

    pub fn with_capacity(capacity: usize) -> Builder {
        Builder::with_options(BuilderOptions {
            initial_capacity: capacity,
            ..Default::default()
        })
    }

    /// Creates a builder configured by `options`. The initial allocation never
    /// exceeds the configured buffer size limit.
    pub fn with_options(options: BuilderOptions) -> Builder {
        let capacity = options
            .initial_capacity
            .min(options.max_buffer_size.min(MAX_BUFFER_SIZE));
        Builder {
            buf: BackVec::with_capacity(capacity),
            options,
            min_align: 1,
            state: State::Idle,
            field_locs: Vec::new(),
            vtables: AHashMap::new(),
            num_vtables: 0,
            strings: AHashMap::new(),
            vtable_fields: Vec::new(),
            vtable_bytes: Vec::new(),
        }
    }

    pub fn options(&self) -> &BuilderOptions {
        &self.options
    }

    /// Discards everything written so far, including the vtable and string
    /// caches and a poisoned state. The allocation is kept.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.min_align = 1;
        self.state = State::Idle;
        self.field_locs.clear();
        self.vtables.clear();
        self.num_vtables = 0;
        self.strings.clear();
    }

    /// Number of bytes written so far; the builder offset of the most recently
    /// written item.
    #[inline]
    pub fn offset(&self) -> usize {
        self.buf.len()
    }

    /// Number of distinct vtables written into the current buffer.
    pub fn num_vtables(&self) -> usize {
        self.num_vtables
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, State::Finished { .. })
    }

    pub fn is_poisoned(&self) -> bool {
        self.state == State::Poisoned
    }

    /// Starts a table with room for `num_fields` fields.
    pub fn start_object(&mut self, num_fields: usize) -> Result<()> {
        self.expect_idle("start_object")?;
        if num_fields > MAX_TABLE_FIELDS {
            return Err(Error::invalid_arg(
                "num_fields",
                format!("{num_fields} exceeds the limit of {MAX_TABLE_FIELDS} fields"),
            ));
        }
        self.field_locs.clear();
        self.state = State::InObject {
            num_fields,
            start: self.offset(),
        };
        Ok(())
    }

    /// Writes a scalar field unless it equals `default` (and defaults are not
    /// forced).
    pub fn push_slot<T: Scalar>(&mut self, field: FieldIndex, value: T, default: T) -> Result<()> {
        self.expect_field(field, "push_slot")?;
        if value == default && !self.options.force_defaults {
            return Ok(());
        }
        self.push_slot_always(field, value)
    }

    /// Writes a scalar field regardless of its value.
    pub fn push_slot_always<T: Scalar>(&mut self, field: FieldIndex, value: T) -> Result<()> {
        self.expect_field(field, "push_slot_always")?;
        self.push(value)?;
        self.track_field(field, self.offset());
        Ok(())
    }

    /// Stores a reference to a previously written string, vector or table.
    pub fn push_slot_offset<T: ?Sized>(
        &mut self,
        field: FieldIndex,
        target: WIPOffset<T>,
    ) -> Result<()> {
        self.expect_field(field, "push_slot_offset")?;
        self.push_offset(target)?;
        self.track_field(field, self.offset());
        Ok(())
    }

    /// Records a struct written in place (with [`Builder::prep`] and
    /// [`Builder::push`]) as the value of `field`. The struct must be the most
    /// recently written item.
    pub fn push_slot_struct<T: ?Sized>(
        &mut self,
        field: FieldIndex,
        target: WIPOffset<T>,
    ) -> Result<()> {
        self.expect_field(field, "push_slot_struct")?;
        if target.value() as usize != self.offset() {
            return Err(self.poison(Error::invalid_operation(
                "push_slot_struct: struct must be written immediately before its slot is recorded",
            )));
        }
        self.track_field(field, self.offset());
        Ok(())
    }

    /// Completes the open table and writes (or reuses) its vtable.
    pub fn end_object(&mut self) -> Result<WIPOffset<TableFinished>> {
        let State::InObject { num_fields, start } = self.state else {
            return Err(self.protocol_error("end_object: no object is open"));
        };

        // soffset placeholder, patched once the vtable position is known
        self.push::<SOffset>(0)?;
        let object_offset = self.offset();
        let table_size = object_offset - start;
        if table_size > VOffset::MAX as usize {
            return Err(self.poison(Error::capacity_exceeded(
                "table inline size",
                VOffset::MAX as usize,
                table_size,
            )));
        }

        let mut fields = std::mem::take(&mut self.vtable_fields);
        fields.clear();
        fields.resize(num_fields, 0);
        for loc in &self.field_locs {
            fields[loc.field as usize] = (object_offset - loc.offset) as VOffset;
        }
        while fields.last() == Some(&0) {
            fields.pop();
        }
        let mut vtable = std::mem::take(&mut self.vtable_bytes);
        encode_vtable(&fields, table_size as VOffset, &mut vtable);
        self.vtable_fields = fields;

        let result = self.place_vtable(&vtable);
        self.vtable_bytes = vtable;
        let vtable_offset = result?;

        let soffset = vtable_offset as i64 - object_offset as i64;
        let table_pos = self.buf.len() - object_offset;
        self.buf.as_mut_slice()[table_pos..table_pos + SOFFSET_SIZE]
            .copy_from_slice(&(soffset as SOffset).to_le_bytes());

        self.field_locs.clear();
        self.state = State::Idle;
        Ok(WIPOffset::new(object_offset as u32))
    }

    /// Returns the builder offset of a vtable with exactly these bytes, writing
    /// it first if no identical vtable exists yet.
    fn place_vtable(&mut self, vtable: &[u8]) -> Result<usize> {
        let hash = xxh3_64(vtable);
        if self.options.dedup_vtables {
            if let Some(offset) = self.find_cached(&self.vtables, hash, vtable) {
                trace!("reusing vtable at offset {offset} ({} bytes)", vtable.len());
                return Ok(offset);
            }
        }
        self.prep(VOFFSET_SIZE, vtable.len())?;
        self.reserve(vtable.len())?;
        self.buf.push_front(vtable);
        let offset = self.offset();
        self.num_vtables += 1;
        if self.options.dedup_vtables {
            self.vtables.entry(hash).or_default().push(offset as u32);
        }
        Ok(offset)
    }

    /// Looks up a candidate in one of the dedup caches, confirming the hit by
    /// comparing against the bytes already in the buffer.
    fn find_cached(
        &self,
        cache: &AHashMap<u64, Vec<u32>>,
        hash: u64,
        content: &[u8],
    ) -> Option<usize> {
        let data = self.buf.as_slice();
        cache.get(&hash)?.iter().find_map(|&offset| {
            let pos = data.len() - offset as usize;
            (data.get(pos..pos + content.len()) == Some(content)).then_some(offset as usize)
        })
    }

    /// Checks that a just-completed table has `field` set.
    pub fn required<T: ?Sized>(
        &self,
        table: WIPOffset<T>,
        field: FieldIndex,
        field_name: &str,
    ) -> Result<()> {
        let data = self.buf.as_slice();
        let pos = data
            .len()
            .checked_sub(table.value() as usize)
            .ok_or_else(|| Error::invalid_arg("table", format!("{table:?} was not written")))?;
        if Table::new(data, pos).field_offset(field)? == 0 {
            return Err(Error::invalid_format(
                field_name,
                "required field is missing",
            ));
        }
        Ok(())
    }

    /// Starts a vector of `num_elems` elements of `elem_size` bytes each.
    ///
    /// Elements are then pushed in reverse order, and [`Builder::end_vector`]
    /// writes the length.
    pub fn start_vector(&mut self, elem_size: usize, num_elems: usize, alignment: usize) -> Result<()> {
        self.expect_idle("start_vector")?;
        verify_arg!(alignment, alignment.is_power_of_two());
        let byte_len = elem_size
            .checked_mul(num_elems)
            .ok_or_else(|| self.capacity_error("vector", usize::MAX))?;
        let byte_len = self.check_size(byte_len)?;
        self.prep(UOFFSET_SIZE, byte_len)?;
        self.prep(alignment, byte_len)?;
        self.state = State::InVector {
            elem_size,
            num_elems,
            start: self.offset(),
        };
        Ok(())
    }

    /// Completes the open vector, checking that exactly `num_elems` elements
    /// were written.
    pub fn end_vector<T: ?Sized>(&mut self, num_elems: usize) -> Result<WIPOffset<T>> {
        let State::InVector {
            elem_size,
            num_elems: expected,
            start,
        } = self.state
        else {
            return Err(self.protocol_error("end_vector: no vector is open"));
        };
        let written = self.offset() - start;
        if num_elems != expected || written != elem_size * num_elems {
            return Err(self.poison(Error::invalid_operation(format!(
                "end_vector: expected {expected} elements of {elem_size} bytes, \
                 got {num_elems} elements and {written} bytes"
            ))));
        }
        self.push(num_elems as u32)?;
        self.state = State::Idle;
        Ok(WIPOffset::new(self.offset() as u32))
    }

    pub fn create_vector<T: Scalar>(&mut self, items: &[T]) -> Result<WIPOffset<[T]>> {
        self.start_vector(T::SIZE, items.len(), T::SIZE)?;
        let dst = self.space(items.len() * T::SIZE)?;
        for (item, chunk) in items.iter().zip(dst.chunks_exact_mut(T::SIZE)) {
            item.write_le(chunk);
        }
        self.end_vector(items.len())
    }

    pub fn create_byte_vector(&mut self, bytes: &[u8]) -> Result<WIPOffset<[u8]>> {
        self.start_vector(1, bytes.len(), 1)?;
        self.space(bytes.len())?.copy_from_slice(bytes);
        self.end_vector(bytes.len())
    }

    /// Writes a vector of references to previously written items.
    pub fn create_vector_of_offsets<T: ?Sized>(
        &mut self,
        items: &[WIPOffset<T>],
    ) -> Result<WIPOffset<[WIPOffset<T>]>> {
        self.start_vector(UOFFSET_SIZE, items.len(), UOFFSET_SIZE)?;
        for item in items.iter().rev() {
            self.push_offset(*item)?;
        }
        self.end_vector(items.len())
    }

    pub fn create_vector_of_strings(&mut self, items: &[&str]) -> Result<WIPOffset<[WIPOffset<str>]>> {
        let offsets = items
            .iter()
            .map(|s| self.create_string(s))
            .collect::<Result<Vec<_>>>()?;
        self.create_vector_of_offsets(&offsets)
    }

    /// Writes a length-prefixed, NUL-terminated UTF-8 string.
    pub fn create_string(&mut self, s: &str) -> Result<WIPOffset<str>> {
        if self.options.dedup_strings {
            return self.create_shared_string(s);
        }
        self.write_string(s)
    }

    /// Writes a string, or returns the offset of an identical string previously
    /// written with this method.
    pub fn create_shared_string(&mut self, s: &str) -> Result<WIPOffset<str>> {
        self.expect_idle("create_shared_string")?;
        let hash = xxh3_64(s.as_bytes());
        let mut content = Vec::with_capacity(UOFFSET_SIZE + s.len() + 1);
        content.extend_from_slice(&(s.len() as u32).to_le_bytes());
        content.extend_from_slice(s.as_bytes());
        content.push(0);
        if let Some(offset) = self.find_cached(&self.strings, hash, &content) {
            trace!("reusing shared string at offset {offset} ({} bytes)", s.len());
            return Ok(WIPOffset::new(offset as u32));
        }
        let offset = self.write_string(s)?;
        self.strings.entry(hash).or_default().push(offset.value());
        Ok(offset)
    }

    fn write_string(&mut self, s: &str) -> Result<WIPOffset<str>> {
        self.expect_idle("create_string")?;
        let len = self.check_size(s.len())?;
        self.prep(UOFFSET_SIZE, len + 1)?;
        let dst = self.space(len + 1)?;
        dst[..len].copy_from_slice(s.as_bytes());
        dst[len] = 0;
        self.push(len as u32)?;
        Ok(WIPOffset::new(self.offset() as u32))
    }

    /// Pads so that, after `additional` more bytes are written, the next value
    /// of `size` bytes is naturally aligned. Also raises the buffer alignment.
    pub fn prep(&mut self, size: usize, additional: usize) -> Result<()> {
        self.expect_writable("prep")?;
        if !size.is_power_of_two() {
            return Err(Error::invalid_arg(
                "size",
                format!("alignment {size} is not a power of two"),
            ));
        }
        self.min_align = self.min_align.max(size);
        let padding = back_padding(self.buf.len(), additional, size);
        self.reserve(padding.saturating_add(additional))?;
        self.buf.push_zeros(padding);
        Ok(())
    }

    /// Writes `n` zero bytes.
    pub fn pad(&mut self, n: usize) -> Result<()> {
        self.expect_writable("pad")?;
        self.reserve(n)?;
        self.buf.push_zeros(n);
        Ok(())
    }

    /// Writes one naturally aligned scalar.
    pub fn push<T: Scalar>(&mut self, value: T) -> Result<()> {
        self.prep(T::SIZE, 0)?;
        value.write_le(self.space(T::SIZE)?);
        Ok(())
    }

    /// Writes a uoffset to `target`, relative to the position it is written at.
    pub fn push_offset<T: ?Sized>(&mut self, target: WIPOffset<T>) -> Result<()> {
        self.expect_writable("push_offset")?;
        let target = self.check_target(target)?;
        self.prep(UOFFSET_SIZE, 0)?;
        let relative = (self.offset() - target + UOFFSET_SIZE) as u32;
        relative.write_le(self.space(UOFFSET_SIZE)?);
        Ok(())
    }

    /// Checks that `target` refers to an item already written to the buffer.
    fn check_target<T: ?Sized>(&self, target: WIPOffset<T>) -> Result<usize> {
        let target = target.value() as usize;
        if target == 0 || target > self.offset() {
            return Err(Error::invalid_arg(
                "target",
                format!("offset {target} does not refer to a written item"),
            ));
        }
        Ok(target)
    }

    /// Completes the buffer with `root` as its root table.
    pub fn finish<T: ?Sized>(&mut self, root: WIPOffset<T>, file_identifier: Option<&str>) -> Result<()> {
        self.finish_with(root, file_identifier, false)
    }

    /// Like [`Builder::finish`], with a leading `u32` holding the size of the rest
    /// of the buffer.
    pub fn finish_size_prefixed<T: ?Sized>(
        &mut self,
        root: WIPOffset<T>,
        file_identifier: Option<&str>,
    ) -> Result<()> {
        self.finish_with(root, file_identifier, true)
    }

    /// Completes the buffer without identifier or size prefix.
    pub fn finish_minimal<T: ?Sized>(&mut self, root: WIPOffset<T>) -> Result<()> {
        self.finish_with(root, None, false)
    }

    fn finish_with<T: ?Sized>(
        &mut self,
        root: WIPOffset<T>,
        file_identifier: Option<&str>,
        size_prefixed: bool,
    ) -> Result<()> {
        self.expect_idle("finish")?;
        let identifier = match file_identifier {
            Some(id) if id.len() != FILE_IDENTIFIER_LENGTH => {
                return Err(Error::invalid_arg(
                    "file_identifier",
                    format!("'{id}' must be exactly {FILE_IDENTIFIER_LENGTH} bytes"),
                ));
            }
            Some(id) => Some(id.as_bytes()),
            None => None,
        };
        // nothing is written until the arguments are known to be valid
        self.check_target(root)?;
        let mut trailer = UOFFSET_SIZE;
        if identifier.is_some() {
            trailer += FILE_IDENTIFIER_LENGTH;
        }
        if size_prefixed {
            trailer += UOFFSET_SIZE;
        }
        self.prep(self.min_align, trailer)?;
        if let Some(id) = identifier {
            self.prep(UOFFSET_SIZE, FILE_IDENTIFIER_LENGTH)?;
            self.space(FILE_IDENTIFIER_LENGTH)?.copy_from_slice(id);
        }
        self.push_offset(root)?;
        if size_prefixed {
            let size = self.offset();
            self.push(size as u32)?;
        }
        self.state = State::Finished { size_prefixed };
        debug!(
            "finished buffer: {} bytes, min_align {}, {} vtables",
            self.buf.len(),
            self.min_align,
            self.num_vtables
        );
        Ok(())
    }

    /// The finished buffer.
    pub fn finished_data(&self) -> Result<&[u8]> {
        match self.state {
            State::Finished { .. } => Ok(self.buf.as_slice()),
            State::Poisoned => Err(Error::invalid_operation(
                "finished_data: builder is poisoned",
            )),
            _ => Err(Error::invalid_operation(
                "finished_data: buffer is not finished",
            )),
        }
    }

    /// Hands the finished buffer over without copying.
    pub fn into_bytes(self) -> Result<Bytes> {
        self.finished_data()?;
        Ok(self.buf.into_bytes())
    }

    /// Hands the finished buffer over as a shareable root.
    pub fn into_owned_root(self) -> Result<OwnedRoot> {
        let State::Finished { size_prefixed } = self.state else {
            return Err(Error::invalid_operation(
                "into_owned_root: buffer is not finished",
            ));
        };
        let bytes = self.buf.into_bytes();
        if size_prefixed {
            OwnedRoot::size_prefixed(bytes)
        } else {
            OwnedRoot::new(bytes)
        }
    }

    fn track_field(&mut self, field: FieldIndex, offset: usize) {
        self.field_locs.push(FieldLoc { field, offset });
    }

    fn expect_writable(&mut self, op: &str) -> Result<()> {
        match self.state {
            State::Finished { .. } | State::Poisoned => Err(self.protocol_error(op)),
            _ => Ok(()),
        }
    }

    fn expect_idle(&mut self, op: &str) -> Result<()> {
        match self.state {
            State::Idle => Ok(()),
            State::InObject { .. } => Err(self.protocol_error(&format!("{op}: an object is open"))),
            State::InVector { .. } => Err(self.protocol_error(&format!("{op}: a vector is open"))),
            _ => Err(self.protocol_error(op)),
        }
    }

    fn expect_object(&mut self, op: &str) -> Result<()> {
        match self.state {
            State::InObject { .. } => Ok(()),
            _ => Err(self.protocol_error(&format!("{op}: no object is open"))),
        }
    }

    fn expect_field(&mut self, field: FieldIndex, op: &str) -> Result<()> {
        self.expect_object(op)?;
        if let State::InObject { num_fields, .. } = self.state {
            if field as usize >= num_fields {
                return Err(Error::invalid_arg(
                    "field",
                    format!("field {field} is out of range for a table of {num_fields} fields"),
                ));
            }
        }
        Ok(())
    }

    /// Builds the error for a call made in the wrong state. Calls on a finished
    /// builder leave the finished buffer intact; any other violation poisons.
    fn protocol_error(&mut self, op: &str) -> Error {
        match self.state {
            State::Finished { .. } => {
                Error::invalid_operation(format!("{op}: buffer is already finished"))
            }
            State::Poisoned => Error::invalid_operation(format!("{op}: builder is poisoned")),
            _ => self.poison(Error::invalid_operation(op)),
        }
    }

    fn poison(&mut self, err: Error) -> Error {
        debug!("builder poisoned: {err}");
        self.state = State::Poisoned;
        err
    }

    fn max_size(&self) -> usize {
        self.options.max_buffer_size.min(MAX_BUFFER_SIZE)
    }

    fn capacity_error(&mut self, name: &str, requested: usize) -> Error {
        let limit = self.max_size();
        self.poison(Error::capacity_exceeded(name, limit, requested))
    }

    /// Checks a single item size against the buffer limit.
    fn check_size(&mut self, size: usize) -> Result<usize> {
        if size > self.max_size() {
            return Err(self.capacity_error("item", size));
        }
        Ok(size)
    }

    /// Checks that `additional` more bytes fit and makes room for them.
    fn reserve(&mut self, additional: usize) -> Result<()> {
        let requested = self.buf.len().saturating_add(additional);
        if requested > self.max_size() {
            return Err(self.capacity_error("buffer", requested));
        }
        self.buf.reserve(additional);
        Ok(())
    }

    fn space(&mut self, n: usize) -> Result<&mut [u8]> {
        self.reserve(n)?;
        Ok(self.buf.make_space(n))
    }
}

impl Default for Builder {
    fn default() -> Self {
        Builder::new()
    }
}

impl std::fmt::Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("len", &self.buf.len())
            .field("min_align", &self.min_align)
            .field("state", &self.state)
            .field("num_vtables", &self.num_vtables)
            .finish()
    }
}
