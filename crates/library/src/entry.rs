//! What the library needs to know about a file.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use time::PrimitiveDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

const ADDED_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
const ADDED_FORMAT_PRECISE: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:6]");

/// One downloadable file together with the metadata of the post it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Remote path, which doubles as the cache key.
    pub path: String,
    /// Display name of the file.
    pub name: String,
    pub service: String,
    pub user: String,
    /// Post ID.
    pub id: String,
    /// Post title, may be empty.
    pub title: String,
    /// When the post was added.
    pub added: PrimitiveDateTime,
}

/// Renders a timestamp the way it appears in the `added` view.
///
/// Sub-second precision is only shown when there is some.
///
/// ```
/// use hoard_library::render_added;
/// use time::macros::datetime;
///
/// assert_eq!(render_added(datetime!(2023-01-01 00:00:00)).unwrap(), "2023-01-01 00:00:00");
/// assert_eq!(render_added(datetime!(2023-01-01 00:00:00.5)).unwrap(), "2023-01-01 00:00:00.500000");
/// ```
pub fn render_added(added: PrimitiveDateTime) -> Result<String> {
    let format = match added.nanosecond() {
        0 => ADDED_FORMAT,
        _ => ADDED_FORMAT_PRECISE,
    };
    added.format(format).or_raise(|| ErrorKind::Timestamp)
}
