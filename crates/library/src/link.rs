//! Symlink views over the cache.
//!
//! For every file the library holds three ways in, all under
//! `<service>/<user>/`:
//!
//! ```text
//! id/<id>/<name>        -> <cache>/<path>    (absolute)
//! title/<title>         -> <library>/<service>/<user>/id/<id>
//! added/<added>         -> <library>/<service>/<user>/id/<id>
//! ```
//!
//! Links are only ever created, never replaced: whatever already sits at a
//! link location (a link from an earlier run, or something a user put there)
//! is left alone and reported as [`LinkOutcome::AlreadyPresent`].

use crate::entry::{Entry, render_added};
use crate::error::{ErrorKind, Result};
use crate::segment::encode_segment;
use exn::ResultExt;
use hoard_storage::{Cache, Root, cache_key};
use std::borrow::Cow;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::instrument;

/// What happened at a single link location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    Created,
    AlreadyPresent,
}

/// Per-view outcome of [`Library::link`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Linked {
    pub file: LinkOutcome,
    /// `None` when the post has no title to link by.
    pub title: Option<LinkOutcome>,
    pub added: LinkOutcome,
}
impl Linked {
    /// `true` if at least one link was created by this call.
    pub fn created_any(&self) -> bool {
        [Some(self.file), self.title, Some(self.added)].contains(&Some(LinkOutcome::Created))
    }
}

/// Creates `link` pointing at `target`, unless something already exists there.
///
/// The existing entry is not inspected. Whatever sits at `link`, dangling
/// symlinks included, counts as present.
pub async fn symlink(target: &Path, link: &Path) -> io::Result<LinkOutcome> {
    match fs::symlink_metadata(link).await {
        Ok(_) => return Ok(LinkOutcome::AlreadyPresent),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {},
        Err(e) => return Err(e),
    }
    match fs::symlink(target, link).await {
        Ok(()) => Ok(LinkOutcome::Created),
        // Lost the race against another writer.
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(LinkOutcome::AlreadyPresent),
        Err(e) => Err(e),
    }
}

fn segment<'a>(value: &'a str, field: &'static str) -> Result<Cow<'a, str>> {
    encode_segment(value).ok_or_else(|| exn::Exn::from(ErrorKind::MissingField(field)))
}

/// A tree of symlinks pointing into a [`Cache`].
#[derive(Debug, Clone)]
pub struct Library {
    root: Root,
    cache: Cache,
}
impl Library {
    pub fn new(base: impl Into<PathBuf>, cache: Cache) -> Self {
        Self {
            root: Root::new(base),
            cache,
        }
    }

    pub fn root(&self) -> &Root {
        &self.root
    }

    /// Makes `entry` reachable through all three views.
    ///
    /// Safe to call repeatedly, and concurrently for different files of the
    /// same post. The cache entry does not need to exist yet; the link will
    /// simply dangle until it does.
    #[instrument(skip_all, fields(service = %entry.service, user = %entry.user, id = %entry.id, name = %entry.name))]
    pub async fn link(&self, entry: &Entry) -> Result<Linked> {
        let creator = PathBuf::from(segment(&entry.service, "service")?.as_ref()).join(segment(&entry.user, "user")?.as_ref());
        let post = creator.join("id").join(segment(&entry.id, "id")?.as_ref());
        let name = segment(&entry.name, "name")?;

        let target = self
            .cache
            .abs(cache_key(&entry.path))
            .or_raise(|| ErrorKind::CacheLocation(entry.path.clone()))?;
        let post_dir = self.ensure_dir(&post).await?;
        let file = self.create(&target, &post.join(name.as_ref())).await?;

        let post_target = self.root.absolute(&post).or_raise(|| ErrorKind::Directory(post_dir.clone()))?;
        let title = match encode_segment(&entry.title) {
            Some(title) => Some(self.alias(&post_target, &creator.join("title"), &title).await?),
            None => {
                tracing::warn!("Post has no title, skipping title link");
                None
            },
        };
        let added = render_added(entry.added)?;
        let added = self.alias(&post_target, &creator.join("added"), &added).await?;

        let linked = Linked { file, title, added };
        if linked.created_any() {
            tracing::debug!(?linked, "Linked file");
        }
        Ok(linked)
    }

    async fn ensure_dir(&self, dir: &Path) -> Result<PathBuf> {
        let full = self.root.join(dir).or_raise(|| ErrorKind::Directory(dir.to_path_buf()))?;
        self.root.ensure_dir(dir).await.or_raise(|| ErrorKind::Directory(full))
    }

    async fn alias(&self, post: &Path, view: &Path, name: &str) -> Result<LinkOutcome> {
        self.ensure_dir(view).await?;
        self.create(post, &view.join(name)).await
    }

    async fn create(&self, target: &Path, link: &Path) -> Result<LinkOutcome> {
        let link = self.root.join(link).or_raise(|| ErrorKind::Symlink(link.to_path_buf()))?;
        symlink(target, &link).await.or_raise(|| ErrorKind::Symlink(link))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use time::macros::datetime;

    struct Fixture {
        _temp: TempDir,
        cache: PathBuf,
        library: PathBuf,
        linker: Library,
    }

    fn fixture() -> Fixture {
        let temp = tempfile::tempdir().unwrap();
        let cache = temp.path().join(".cache");
        let library = temp.path().join("library");
        let linker = Library::new(&library, Cache::new(&cache));
        Fixture {
            _temp: temp,
            cache,
            library,
            linker,
        }
    }

    fn entry() -> Entry {
        Entry {
            path: "/data/ab/cd/abcd1234".to_string(),
            name: "a.png".to_string(),
            service: "fanbox".to_string(),
            user: "42".to_string(),
            id: "123".to_string(),
            title: "My Post".to_string(),
            added: datetime!(2023-01-01 00:00:00),
        }
    }

    fn read_link(path: impl AsRef<Path>) -> PathBuf {
        std::fs::read_link(path).unwrap()
    }

    #[tokio::test]
    async fn test_link_creates_three_views() {
        let f = fixture();
        std::fs::create_dir_all(f.cache.join("data/ab/cd")).unwrap();
        std::fs::write(f.cache.join("data/ab/cd/abcd1234"), b"png").unwrap();

        let linked = f.linker.link(&entry()).await.unwrap();
        assert_eq!(
            linked,
            Linked {
                file: LinkOutcome::Created,
                title: Some(LinkOutcome::Created),
                added: LinkOutcome::Created,
            }
        );

        let creator = f.library.join("fanbox/42");
        let file_link = creator.join("id/123/a.png");
        assert_eq!(read_link(&file_link), f.cache.join("data/ab/cd/abcd1234"));
        assert!(read_link(&file_link).is_absolute());
        assert_eq!(std::fs::read(&file_link).unwrap(), b"png");

        assert_eq!(read_link(creator.join("title/My Post")), creator.join("id/123"));
        assert_eq!(read_link(creator.join("added/2023-01-01 00:00:00")), creator.join("id/123"));
        // The aliases resolve all the way through to the file.
        assert_eq!(std::fs::read(creator.join("title/My Post/a.png")).unwrap(), b"png");
        assert_eq!(std::fs::read(creator.join("added/2023-01-01 00:00:00/a.png")).unwrap(), b"png");
    }

    #[tokio::test]
    async fn test_link_is_idempotent() {
        let f = fixture();
        let creator = f.library.join("fanbox/42");
        let links = [
            creator.join("id/123/a.png"),
            creator.join("title/My Post"),
            creator.join("added/2023-01-01 00:00:00"),
        ];
        let snapshot = || links.iter().map(read_link).collect::<Vec<_>>();
        let listing = |dir: &str| {
            let mut names = std::fs::read_dir(creator.join(dir))
                .unwrap()
                .map(|e| e.unwrap().file_name())
                .collect::<Vec<_>>();
            names.sort();
            names
        };

        f.linker.link(&entry()).await.unwrap();
        let first = snapshot();
        let first_listing = (listing("id/123"), listing("title"), listing("added"));

        let linked = f.linker.link(&entry()).await.unwrap();
        assert_eq!(
            linked,
            Linked {
                file: LinkOutcome::AlreadyPresent,
                title: Some(LinkOutcome::AlreadyPresent),
                added: LinkOutcome::AlreadyPresent,
            }
        );
        assert!(!linked.created_any());
        assert_eq!(snapshot(), first);
        assert_eq!((listing("id/123"), listing("title"), listing("added")), first_listing);
    }

    #[tokio::test]
    async fn test_long_titles_get_distinct_aliases() {
        let f = fixture();
        let base = "t".repeat(260);
        let one = Entry {
            id: "1".to_string(),
            title: format!("{base} part one"),
            added: datetime!(2023-01-01 00:00:00),
            ..entry()
        };
        let two = Entry {
            id: "2".to_string(),
            title: format!("{base} part two"),
            added: datetime!(2023-01-02 00:00:00),
            ..entry()
        };
        assert_eq!(f.linker.link(&one).await.unwrap().title, Some(LinkOutcome::Created));
        assert_eq!(f.linker.link(&two).await.unwrap().title, Some(LinkOutcome::Created));

        let creator = f.library.join("fanbox/42");
        let mut targets = std::fs::read_dir(creator.join("title"))
            .unwrap()
            .map(|e| read_link(e.unwrap().path()))
            .collect::<Vec<_>>();
        targets.sort();
        assert_eq!(targets, vec![creator.join("id/1"), creator.join("id/2")]);
    }

    #[tokio::test]
    async fn test_long_file_names_get_distinct_links() {
        let f = fixture();
        let base = "n".repeat(260);
        let one = Entry {
            name: format!("{base}-1.png"),
            ..entry()
        };
        let two = Entry {
            path: "/data/ef/gh/efgh5678".to_string(),
            name: format!("{base}-2.png"),
            ..entry()
        };
        assert_eq!(f.linker.link(&one).await.unwrap().file, LinkOutcome::Created);
        assert_eq!(f.linker.link(&two).await.unwrap().file, LinkOutcome::Created);
        let entries = std::fs::read_dir(f.library.join("fanbox/42/id/123")).unwrap().count();
        assert_eq!(entries, 2);
    }

    #[tokio::test]
    async fn test_second_file_of_post_shares_aliases() {
        let f = fixture();
        f.linker.link(&entry()).await.unwrap();
        let second = Entry {
            path: "/data/ef/gh/efgh5678".to_string(),
            name: "b.png".to_string(),
            ..entry()
        };
        let linked = f.linker.link(&second).await.unwrap();
        assert_eq!(linked.file, LinkOutcome::Created);
        assert_eq!(linked.title, Some(LinkOutcome::AlreadyPresent));
        assert_eq!(linked.added, LinkOutcome::AlreadyPresent);
        assert!(linked.created_any());
        let entries = std::fs::read_dir(f.library.join("fanbox/42/id/123")).unwrap().count();
        assert_eq!(entries, 2);
    }

    #[tokio::test]
    async fn test_link_dangles_until_cached() {
        let f = fixture();
        f.linker.link(&entry()).await.unwrap();
        let file_link = f.library.join("fanbox/42/id/123/a.png");
        assert!(std::fs::symlink_metadata(&file_link).unwrap().file_type().is_symlink());
        assert!(!file_link.exists());
    }

    #[tokio::test]
    async fn test_title_with_separator_is_escaped() {
        let f = fixture();
        let entry = Entry {
            title: "AC/DC".to_string(),
            ..entry()
        };
        f.linker.link(&entry).await.unwrap();
        let creator = f.library.join("fanbox/42");
        assert_eq!(read_link(creator.join("title/AC%2FDC")), creator.join("id/123"));
        assert!(!creator.join("title/AC").exists());
    }

    #[tokio::test]
    async fn test_dot_title_stays_inside_view() {
        let f = fixture();
        let entry = Entry {
            title: "..".to_string(),
            ..entry()
        };
        let linked = f.linker.link(&entry).await.unwrap();
        assert_eq!(linked.title, Some(LinkOutcome::Created));
        let creator = f.library.join("fanbox/42");
        assert_eq!(read_link(creator.join("title/%2E%2E")), creator.join("id/123"));
    }

    #[tokio::test]
    async fn test_empty_title_skips_title_view() {
        let f = fixture();
        let entry = Entry {
            title: String::new(),
            ..entry()
        };
        let linked = f.linker.link(&entry).await.unwrap();
        assert_eq!(linked.title, None);
        assert_eq!(linked.file, LinkOutcome::Created);
        assert!(!f.library.join("fanbox/42/title").exists());
        assert!(std::fs::symlink_metadata(f.library.join("fanbox/42/added/2023-01-01 00:00:00")).is_ok());
    }

    #[tokio::test]
    async fn test_fractional_added_timestamp() {
        let f = fixture();
        let entry = Entry {
            added: datetime!(2021-07-14 09:30:15.5),
            ..entry()
        };
        f.linker.link(&entry).await.unwrap();
        let alias = f.library.join("fanbox/42/added/2021-07-14 09:30:15.500000");
        assert!(std::fs::symlink_metadata(alias).unwrap().file_type().is_symlink());
    }

    #[tokio::test]
    async fn test_existing_entry_is_left_alone() {
        let f = fixture();
        let title_dir = f.library.join("fanbox/42/title");
        std::fs::create_dir_all(&title_dir).unwrap();
        std::fs::write(title_dir.join("My Post"), b"user notes").unwrap();

        let linked = f.linker.link(&entry()).await.unwrap();
        assert_eq!(linked.title, Some(LinkOutcome::AlreadyPresent));
        assert_eq!(std::fs::read(title_dir.join("My Post")).unwrap(), b"user notes");
    }

    #[tokio::test]
    async fn test_missing_name_is_an_error() {
        let f = fixture();
        let entry = Entry {
            name: String::new(),
            ..entry()
        };
        let err = f.linker.link(&entry).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::MissingField("name")));
    }

    #[tokio::test]
    async fn test_unwritable_library_is_an_error() {
        let f = fixture();
        // A regular file where the service directory should be.
        std::fs::create_dir_all(&f.library).unwrap();
        std::fs::write(f.library.join("fanbox"), b"").unwrap();
        let err = f.linker.link(&entry()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Directory(_)));
    }

    #[tokio::test]
    async fn test_symlink_outcomes() {
        let temp = tempfile::tempdir().unwrap();
        let link = temp.path().join("link");
        assert_eq!(symlink(Path::new("/nowhere"), &link).await.unwrap(), LinkOutcome::Created);
        assert_eq!(symlink(Path::new("/elsewhere"), &link).await.unwrap(), LinkOutcome::AlreadyPresent);
        assert_eq!(read_link(&link), Path::new("/nowhere"));
        let err = symlink(Path::new("/nowhere"), &temp.path().join("missing/link")).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_concurrent_links_to_same_post() {
        let f = fixture();
        let linker = std::sync::Arc::new(f.linker.clone());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let linker = linker.clone();
                let entry = Entry {
                    path: format!("/data/{i:02}/file"),
                    name: format!("{i}.png"),
                    ..entry()
                };
                tokio::spawn(async move { linker.link(&entry).await })
            })
            .collect();
        let mut title_created = 0;
        for handle in handles {
            let linked = handle.await.unwrap().unwrap();
            assert_eq!(linked.file, LinkOutcome::Created);
            if linked.title == Some(LinkOutcome::Created) {
                title_created += 1;
            }
        }
        assert_eq!(title_created, 1);
    }
}
