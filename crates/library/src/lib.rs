//! Browsable library for hoard.
//!
//! The cache stores files under opaque remote paths. The library makes them
//! findable again: one directory per post holding links named after the files,
//! plus per-creator indexes by post title and by the time the post was added.
//! See [`Library::link`] for the layout.

mod entry;
pub mod error;
mod link;
mod segment;

pub use crate::entry::{Entry, render_added};
pub use crate::link::{Library, LinkOutcome, Linked, symlink};
pub use crate::segment::{MAX_SEGMENT_BYTES, encode_segment};
