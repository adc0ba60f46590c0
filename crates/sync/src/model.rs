//! Posts as sequences of files.
//!
//! A post from the API carries its primary file and its attachments
//! separately. The rest of the pipeline only cares about individual files, each
//! one carrying enough of its post to be fetched and linked on its own.

use crate::error::{ErrorKind, Result};
use derive_more::{Deref, Display};
use exn::ResultExt;
use hoard_api::RemoteFile;
use hoard_library::Entry;
use hoard_storage::cache_key;
use std::path::Path;

/// Where a file sits inside its post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Role {
    #[display("file")]
    Primary,
    /// Zero-based index into the post's attachments.
    #[display("attachment #{_0}")]
    Attachment(usize),
}

/// A single file, denormalized with the metadata of its post.
#[derive(Debug, Clone, PartialEq, Eq, Deref)]
pub struct FetchableFile {
    pub domain: String,
    #[deref]
    pub entry: Entry,
}
impl FetchableFile {
    /// Files without a remote path are listed by the API but cannot be
    /// downloaded; they are skipped.
    pub fn is_fetchable(&self) -> bool {
        !self.entry.path.is_empty()
    }

    pub fn cache_key(&self) -> &Path {
        cache_key(&self.entry.path)
    }
}

/// A post, together with the domain it was retrieved from.
#[derive(Debug, Clone)]
pub struct Post {
    pub domain: String,
    pub post: hoard_api::Post,
}
impl Post {
    pub fn new(domain: impl Into<String>, post: hoard_api::Post) -> Self {
        Self {
            domain: domain.into(),
            post,
        }
    }

    fn fetchable(&self, file: &RemoteFile) -> FetchableFile {
        FetchableFile {
            domain: self.domain.clone(),
            entry: Entry {
                path: file.path.clone(),
                name: file.name.clone(),
                service: self.post.service.clone(),
                user: self.post.user.clone(),
                id: self.post.id.clone(),
                title: self.post.title.clone(),
                added: self.post.added,
            },
        }
    }

    /// The primary file (if any), then each attachment in order.
    pub fn files(&self) -> impl Iterator<Item = (Role, FetchableFile)> + '_ {
        let primary = self.post.file.iter().map(|file| (Role::Primary, self.fetchable(file)));
        let attachments =
            self.post.attachments.iter().enumerate().map(|(index, file)| (Role::Attachment(index), self.fetchable(file)));
        primary.chain(attachments)
    }

    /// Feeds every file of the post to `visit`, in [`files`](Self::files)
    /// order.
    ///
    /// Stops at the first failing file; the error is wrapped in
    /// [`ErrorKind::File`] naming that file's [`Role`]. Files visited before the
    /// failure stay visited.
    pub async fn each_file<F>(&self, mut visit: F) -> Result<()>
    where
        F: AsyncFnMut(FetchableFile) -> Result<()>,
    {
        for (role, file) in self.files() {
            visit(file).await.or_raise(|| ErrorKind::File(role))?;
        }
        Ok(())
    }
}
