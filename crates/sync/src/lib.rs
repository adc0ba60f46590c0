//! The hoard sync pipeline.
//!
//! Posts from a [`Remote`](hoard_api::Remote) are broken into files
//! ([`model`]). Files missing from the cache are downloaded by a bounded pool
//! of workers ([`Fetcher`]); the [`Pipeline`] drives both and links whatever
//! ends up cached into the library.

pub mod error;
mod fetch;
pub mod model;
mod pipeline;

pub use crate::fetch::{FetchHandle, FetchRequest, Fetcher};
pub use crate::model::{FetchableFile, Post, Role};
pub use crate::pipeline::{Options, Pipeline, Summary};
