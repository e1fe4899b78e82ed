//! PDF writing module.
//!
//! Serializes documents back to bytes in two modes:
//!
//! ```text
//! Document / object set
//!     ↓
//! [DocumentWriter]      full rewrite: prune, renumber, fresh xref
//! [IncrementalUpdate]   append-only revision with /Prev chain
//!     ↓
//! [ObjectSerializer]    objects → PDF syntax
//!     ↓
//! PDF bytes
//! ```
//!
//! A full rewrite flattens incremental history and drops unreachable
//! objects; an incremental update preserves the original bytes exactly,
//! which signing requires.

mod document_writer;
mod incremental;
mod object_serializer;

pub use document_writer::DocumentWriter;
pub use incremental::IncrementalUpdate;
pub use object_serializer::ObjectSerializer;
