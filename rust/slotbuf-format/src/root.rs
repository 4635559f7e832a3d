//! Locating the root table of a finished buffer, and probing the optional
//! size prefix and file identifier in front of it.

use slotbuf_bytes::Bytes;
use slotbuf_common::{Result, error::Error};

use crate::{
    follow::{Follow, Indirect, resolve_uoffset},
    primitives::{
        FILE_IDENTIFIER_LENGTH, MAX_SCALAR_ALIGNMENT, SIZE_PREFIX_LENGTH, UOFFSET_SIZE, read_scalar,
    },
    table::Table,
    verifier::{Verifiable, Verifier, VerifierOptions},
};

/// Follows the root offset at the start of `buf`.
pub fn root<'a, T: Follow<'a>>(buf: &'a [u8]) -> Result<T::Inner> {
    root_at::<T>(buf, 0)
}

/// Follows a root offset stored at `offset`, for buffers embedded after a
/// header of their own.
pub fn root_at<'a, T: Follow<'a>>(buf: &'a [u8], offset: usize) -> Result<T::Inner> {
    Indirect::<T>::follow(buf, offset)
}

/// Reads the leading size prefix: the number of bytes that follow it.
pub fn size_prefix(buf: &[u8]) -> Result<u32> {
    read_scalar::<u32>(buf, 0, "size prefix")
}

/// Returns the part of a size-prefixed buffer covered by its prefix
/// (including the prefix itself), so that positions stay unchanged.
fn size_prefixed_extent(buf: &[u8]) -> Result<&[u8]> {
    let size = size_prefix(buf)? as usize;
    let available = buf.len() - SIZE_PREFIX_LENGTH;
    if size > available {
        return Err(Error::invalid_format(
            "size prefix",
            format!("prefix announces {size} bytes, buffer holds {available}"),
        ));
    }
    Ok(&buf[..SIZE_PREFIX_LENGTH + size])
}

/// Follows the root offset of a buffer written with
/// [`Builder::finish_size_prefixed`](crate::builder::Builder::finish_size_prefixed).
pub fn size_prefixed_root<'a, T: Follow<'a>>(buf: &'a [u8]) -> Result<T::Inner> {
    root_at::<T>(size_prefixed_extent(buf)?, SIZE_PREFIX_LENGTH)
}

/// The four identifier bytes following the root offset at `offset`, if the
/// buffer is long enough to hold them.
pub fn buffer_identifier(
    buf: &[u8],
    offset: usize,
    size_prefixed: bool,
) -> Option<[u8; FILE_IDENTIFIER_LENGTH]> {
    let mut pos = offset.checked_add(UOFFSET_SIZE)?;
    if size_prefixed {
        pos = pos.checked_add(SIZE_PREFIX_LENGTH)?;
    }
    buf.get(pos..pos.checked_add(FILE_IDENTIFIER_LENGTH)?)?
        .try_into()
        .ok()
}

/// Returns `true` if the buffer carries exactly `identifier`. Never fails:
/// a truncated buffer or an identifier of the wrong length yields `false`.
pub fn buffer_has_identifier(
    buf: &[u8],
    offset: usize,
    identifier: &[u8],
    size_prefixed: bool,
) -> bool {
    buffer_identifier(buf, offset, size_prefixed).is_some_and(|id| id[..] == *identifier)
}

/// Verifies the buffer structure reachable from the root, then follows the root.
pub fn root_verified<'a, T>(buf: &'a [u8], options: &VerifierOptions) -> Result<T::Inner>
where
    T: Follow<'a> + Verifiable,
{
    Verifier::new(buf, options).verify_root::<T>(0)?;
    root::<T>(buf)
}

pub fn size_prefixed_root_verified<'a, T>(
    buf: &'a [u8],
    options: &VerifierOptions,
) -> Result<T::Inner>
where
    T: Follow<'a> + Verifiable,
{
    let buf = size_prefixed_extent(buf)?;
    Verifier::new(buf, options).verify_root::<T>(SIZE_PREFIX_LENGTH)?;
    root_at::<T>(buf, SIZE_PREFIX_LENGTH)
}

/// A finished buffer together with the position of its root table.
///
/// The bytes are reference counted, so an `OwnedRoot` is cheap to clone and can
/// be handed to any number of reader threads. The bytes are kept aligned for
/// every scalar type, so that [`Vector::as_slice`](crate::vector::Vector::as_slice)
/// succeeds on scalar vectors.
#[derive(Clone)]
pub struct OwnedRoot {
    bytes: Bytes,
    root: usize,
    size_prefixed: bool,
}

impl OwnedRoot {
    pub fn new(bytes: Bytes) -> Result<OwnedRoot> {
        let bytes = bytes.align(MAX_SCALAR_ALIGNMENT);
        let root = resolve_uoffset(&bytes, 0)?;
        Ok(OwnedRoot {
            bytes,
            root,
            size_prefixed: false,
        })
    }

    /// Wraps a buffer that starts with a size prefix. Bytes beyond the extent
    /// announced by the prefix are dropped.
    pub fn size_prefixed(bytes: Bytes) -> Result<OwnedRoot> {
        let len = size_prefixed_extent(&bytes)?.len();
        let bytes = bytes.slice(..len).align(MAX_SCALAR_ALIGNMENT);
        let root = resolve_uoffset(&bytes, SIZE_PREFIX_LENGTH)?;
        Ok(OwnedRoot {
            bytes,
            root,
            size_prefixed: true,
        })
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Absolute position of the root table.
    pub fn root_position(&self) -> usize {
        self.root
    }

    pub fn is_size_prefixed(&self) -> bool {
        self.size_prefixed
    }

    /// An untyped view of the root table.
    pub fn table(&self) -> Table<'_> {
        Table::new(&self.bytes, self.root)
    }

    /// A typed view of the root, borrowing from `self`.
    pub fn get<'a, T: Follow<'a>>(&'a self) -> Result<T::Inner> {
        T::follow(&self.bytes, self.root)
    }

    /// Runs the structural verifier over everything reachable from the root.
    pub fn verify<T: Verifiable>(&self, options: &VerifierOptions) -> Result<()> {
        let slot = if self.size_prefixed {
            SIZE_PREFIX_LENGTH
        } else {
            0
        };
        Verifier::new(&self.bytes, options).verify_root::<T>(slot)
    }

    pub fn identifier(&self) -> Option<[u8; FILE_IDENTIFIER_LENGTH]> {
        buffer_identifier(&self.bytes, 0, self.size_prefixed)
    }

    pub fn has_identifier(&self, identifier: &[u8]) -> bool {
        buffer_has_identifier(&self.bytes, 0, identifier, self.size_prefixed)
    }
}

impl std::fmt::Debug for OwnedRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnedRoot")
            .field("len", &self.bytes.len())
            .field("root", &self.root)
            .field("size_prefixed", &self.size_prefixed)
            .finish()
    }
}
