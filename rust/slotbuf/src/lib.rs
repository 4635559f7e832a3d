//! # Slotbuf
//!
//! A schema-driven binary serialization runtime. Structured records are
//! encoded into a single contiguous little-endian buffer that can be read in
//! place, without a parsing or unpacking step: field accessors resolve offsets
//! directly against the bytes.
//!
//! ## Module Organization
//!
//! * [`common`] - Error type and result helpers shared by all components
//! * [`format`] - The builder, the table and vector readers, root and
//!   identifier helpers and the structural verifier
//!
//! ### Support Modules
//!
//! * [`support::bytes`] - Aligned, shareable byte buffers and the back-growing
//!   arena used by the builder
//!
//! ## Getting Started
//!
//! Generated code (or hand-written accessors) wraps [`format::Builder`] to
//! write a buffer and [`format::Table`] to read it:
//!
//! ```
//! use slotbuf::format::{Builder, Table, root};
//!
//! let mut b = Builder::new();
//! let name = b.create_string("alpha").unwrap();
//! b.start_object(2).unwrap();
//! b.push_slot_offset(0, name).unwrap();
//! b.push_slot::<i64>(1, 7, 0).unwrap();
//! let t = b.end_object().unwrap();
//! b.finish(t, Some("ODTC")).unwrap();
//!
//! let buf = b.finished_data().unwrap();
//! let t = root::<Table>(buf).unwrap();
//! assert_eq!(t.get_str(0).unwrap(), Some("alpha"));
//! assert_eq!(t.get::<i64>(1, 0).unwrap(), 7);
//! ```

pub use slotbuf_common as common;
pub use slotbuf_format as format;

pub mod support {
    pub use slotbuf_bytes as bytes;
}
