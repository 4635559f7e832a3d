//! Wire format runtime: a back-to-front [`builder::Builder`] that lays out
//! tables, vectors and strings with deduplicated vtables, and lazy,
//! bounds-checked zero-copy readers over the finished bytes.

pub mod builder;
pub mod follow;
pub mod offset;
pub mod primitives;
pub mod root;
pub mod table;
pub mod vector;
pub mod verifier;
pub mod vtable;
#[cfg(test)]
mod tests;

pub use builder::{Builder, BuilderOptions};
pub use follow::{Follow, Indirect, Inline};
pub use offset::{TableFinished, WIPOffset};
pub use root::{
    OwnedRoot, buffer_has_identifier, buffer_identifier, root, root_at, root_verified,
    size_prefix, size_prefixed_root, size_prefixed_root_verified,
};
pub use table::Table;
pub use vector::Vector;
pub use verifier::{TableVerifier, Verifiable, Verifier, VerifierOptions};
