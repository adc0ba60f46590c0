//! Turning metadata into single path segments.
//!
//! Titles, names and IDs come straight from remote data. Each one must end up
//! as exactly one directory entry, so anything the filesystem would read as a
//! separator (or as `.`/`..`) is escaped. `%` is escaped first, so `AC/DC`
//! becomes `AC%2FDC` and a literal `%2F` becomes `%252F`.
//!
//! Segments that would exceed [`MAX_SEGMENT_BYTES`] are cut short and tagged
//! with `~` and the CRC32 of the full encoding, so long values that only differ
//! near the end still get distinct names.

use std::borrow::Cow;

/// Longest file name most filesystems accept, in bytes.
pub const MAX_SEGMENT_BYTES: usize = 255;

/// Encodes `value` into something safe to use as one path component.
///
/// Returns `None` for the empty string, which has no valid encoding.
///
/// ```
/// use hoard_library::encode_segment;
///
/// assert_eq!(encode_segment("My Post").as_deref(), Some("My Post"));
/// assert_eq!(encode_segment("AC/DC").as_deref(), Some("AC%2FDC"));
/// assert_eq!(encode_segment("..").as_deref(), Some("%2E%2E"));
/// assert_eq!(encode_segment(""), None);
/// ```
pub fn encode_segment(value: &str) -> Option<Cow<'_, str>> {
    let encoded = match value {
        "" => return None,
        "." => Cow::Borrowed("%2E"),
        ".." => Cow::Borrowed("%2E%2E"),
        _ if !value.contains(['%', '/', '\\', '\0']) => Cow::Borrowed(value),
        _ => {
            let mut encoded = String::with_capacity(value.len() + 8);
            for c in value.chars() {
                match c {
                    '%' => encoded.push_str("%25"),
                    '/' => encoded.push_str("%2F"),
                    '\\' => encoded.push_str("%5C"),
                    '\0' => encoded.push_str("%00"),
                    c => encoded.push(c),
                }
            }
            Cow::Owned(encoded)
        },
    };
    Some(truncate(encoded))
}

fn truncate(segment: Cow<'_, str>) -> Cow<'_, str> {
    if segment.len() <= MAX_SEGMENT_BYTES {
        return segment;
    }
    let tag = format!("~{:08x}", crc32fast::hash(segment.as_bytes()));
    let mut cut = segment.floor_char_boundary(MAX_SEGMENT_BYTES - tag.len());
    // Never leave half of a `%XX` escape behind.
    if let Some(percent) = segment[..cut].rfind('%')
        && percent + 3 > cut
    {
        cut = percent;
    }
    let mut shortened = String::with_capacity(cut + tag.len());
    shortened.push_str(&segment[..cut]);
    shortened.push_str(&tag);
    Cow::Owned(shortened)
}
