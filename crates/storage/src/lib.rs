//! Filesystem storage for hoard.
//!
//! Two pieces live here: [`Root`], which confines relative paths to a base
//! directory, and [`Cache`], the path-keyed content store built on top of it.
//! The library linker reuses [`Root`] for its own tree.

mod cache;
pub mod error;
mod path;

pub use crate::cache::{Cache, cache_key};
pub use crate::path::Root;
pub use crate::path::validate as validate_path;
