//! Wire models returned by the content API.
//!
//! These mirror the JSON the API serves and are read-only to the rest of the
//! workspace: produced once per sync run, consumed by the post/file model.

use serde::{Deserialize, Deserializer};
use std::fmt;
use time::PrimitiveDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

/// Timestamps are served without an offset, with an optional fractional part
/// of up to six digits (e.g. `2023-01-01T00:00:00.123456`).
const ADDED_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]");

/// A creator on a given site: the unit the API lists posts for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Creator {
    /// Host serving both the API and the data files, e.g. `kemono.su`.
    pub domain: String,
    pub service: String,
    pub user: String,
}
impl Creator {
    pub fn new(domain: impl Into<String>, service: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            user: user.into(),
        }
    }
}
impl fmt::Display for Creator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.domain, self.service, self.user)
    }
}

/// A reference to downloadable content: display name plus the remote path
/// that uniquely identifies it.
///
/// Posts without a primary file are sometimes served with `"file": {}`, so
/// both fields default to empty strings. An empty `path` means there is
/// nothing to fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RemoteFile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path: String,
}
impl RemoteFile {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// A single post and the files attached to it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Post {
    pub id: String,
    pub service: String,
    pub user: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(deserialize_with = "deserialize_added")]
    pub added: PrimitiveDateTime,
    /// The primary file, if the post has one.
    #[serde(default)]
    pub file: Option<RemoteFile>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub attachments: Vec<RemoteFile>,
}

/// Parses an API timestamp such as `2023-01-01T00:00:00` or
/// `2023-01-01T00:00:00.123456`.
pub fn parse_added(value: &str) -> Result<PrimitiveDateTime, time::error::Parse> {
    PrimitiveDateTime::parse(value, ADDED_FORMAT)
}

fn deserialize_added<'de, D: Deserializer<'de>>(deserializer: D) -> Result<PrimitiveDateTime, D::Error> {
    let value = String::deserialize(deserializer)?;
    parse_added(&value).map_err(serde::de::Error::custom)
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
