//! Core definitions (errors, result type and verification macros), relied upon by all
//! slotbuf-* crates.

pub mod error;
pub mod macros;
pub mod result;

pub use result::Result;
