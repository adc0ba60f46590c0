//! Mirroring creators into the cache and library.
//!
//! Discovery runs on the caller's task and is the only producer. Cache misses
//! go to the [`Fetcher`]; everything that ends up in the cache (already there,
//! or freshly downloaded) is queued for a single linking task, so the library
//! tree only ever has one writer.
//!
//! Download failures cost a single file and are logged. The first link failure
//! stops the run.

use crate::error::{ErrorKind, Result};
use crate::fetch::{FetchRequest, Fetcher};
use crate::model::{FetchableFile, Post};
use exn::ResultExt;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use hoard_api::{Creator, RemoteHandle};
use hoard_library::Library;
use hoard_storage::Cache;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::instrument;

/// Tuning knobs for a [`Pipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Number of concurrent downloads.
    pub workers: usize,
    /// Files waiting to be linked before discovery has to wait.
    pub link_queue: usize,
}
impl Default for Options {
    fn default() -> Self {
        Self {
            workers: 8,
            link_queue: 8,
        }
    }
}

/// What a sync run did, counted per file unless noted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    /// Files listed by the remote, including ones without a path.
    pub discovered: usize,
    /// Files already in the cache when they were discovered.
    pub cached: usize,
    /// Successful downloads (one per distinct path).
    pub fetched: usize,
    /// Failed downloads (one per distinct path).
    pub failed: usize,
    /// Files without a remote path.
    pub skipped: usize,
    /// Files that got at least one new link.
    pub linked: usize,
    /// Files whose links all existed already.
    pub already_linked: usize,
}

#[derive(Default)]
struct Counters {
    discovered: AtomicUsize,
    cached: AtomicUsize,
    fetched: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
    linked: AtomicUsize,
    already_linked: AtomicUsize,
}
impl Counters {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn summary(&self) -> Summary {
        Summary {
            discovered: self.discovered.load(Ordering::Relaxed),
            cached: self.cached.load(Ordering::Relaxed),
            fetched: self.fetched.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            linked: self.linked.load(Ordering::Relaxed),
            already_linked: self.already_linked.load(Ordering::Relaxed),
        }
    }
}

/// Outcome of a download, shared by every file with the same path.
type SharedFetch = Shared<BoxFuture<'static, bool>>;

/// Mirrors posts into a [`Cache`] and makes them browsable through a
/// [`Library`].
pub struct Pipeline {
    remote: RemoteHandle,
    cache: Cache,
    library: Library,
    options: Options,
}
impl Pipeline {
    pub fn new(remote: RemoteHandle, cache: Cache, library: Library, options: Options) -> Self {
        Self {
            remote,
            cache,
            library,
            options,
        }
    }

    /// Mirrors every post the creator has published.
    #[instrument(skip_all, fields(creator = %creator))]
    pub async fn sync_creator(&self, creator: &Creator) -> Result<Summary> {
        let posts = self.remote.creator_posts(creator).await.or_raise(|| ErrorKind::Remote)?;
        tracing::info!(posts = posts.len(), "Listed creator posts");
        self.sync(creator, posts).await
    }

    /// Mirrors a single post.
    #[instrument(skip_all, fields(creator = %creator, id = %id))]
    pub async fn sync_post(&self, creator: &Creator, id: &str) -> Result<Summary> {
        let post = self.remote.post(creator, id).await.or_raise(|| ErrorKind::Remote)?;
        self.sync(creator, vec![post]).await
    }

    async fn sync(&self, creator: &Creator, posts: Vec<hoard_api::Post>) -> Result<Summary> {
        let counters = Arc::new(Counters::default());
        let (link, queue) = mpsc::channel(self.options.link_queue.max(1));
        let linker = tokio::spawn(link_files(self.library.clone(), queue, Arc::clone(&counters)));

        let mut run = Run {
            cache: &self.cache,
            fetcher: Fetcher::start(Arc::clone(&self.remote), self.cache.clone(), self.options.workers),
            link,
            counters: Arc::clone(&counters),
            fetches: HashMap::new(),
            waiting: JoinSet::new(),
        };
        for post in posts {
            if run.link.is_closed() {
                break;
            }
            let post = Post::new(&creator.domain, post);
            if let Err(e) = post.each_file(async |file| run.dispatch(file).await).await {
                tracing::warn!(service = %post.post.service, user = %post.post.user, id = %post.post.id, error = ?e, "Skipping rest of post");
            }
        }

        let Run { fetcher, link, mut waiting, .. } = run;
        while let Some(joined) = waiting.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Task waiting on a fetch did not finish");
            }
        }
        fetcher.close().await;
        drop(link);

        match linker.await {
            Ok(Ok(())) => {},
            Ok(Err(e)) => return Err(e),
            Err(e) => {
                tracing::error!(error = %e, "Linking task did not finish");
                exn::bail!(ErrorKind::LinkerStopped);
            },
        }
        let summary = counters.summary();
        tracing::info!(?summary, "Sync complete");
        Ok(summary)
    }
}

/// State of one sync run, owned by the discovery loop.
struct Run<'a> {
    cache: &'a Cache,
    fetcher: Fetcher,
    link: mpsc::Sender<FetchableFile>,
    counters: Arc<Counters>,
    /// Every cache entry queued for download during this run.
    fetches: HashMap<PathBuf, SharedFetch>,
    waiting: JoinSet<()>,
}
impl Run<'_> {
    async fn dispatch(&mut self, file: FetchableFile) -> Result<()> {
        Counters::bump(&self.counters.discovered);
        if !file.is_fetchable() {
            tracing::debug!(service = %file.service, user = %file.user, id = %file.id, name = %file.name, "File has no remote path");
            Counters::bump(&self.counters.skipped);
            return Ok(());
        }
        // Some posts reference the same content more than once; it is only
        // downloaded once per run.
        if let Some(fetch) = self.fetches.get(file.cache_key()) {
            self.waiting.spawn(link_when_fetched(fetch.clone(), file, self.link.clone()));
            return Ok(());
        }
        if self.cache.has(file.cache_key()).await {
            Counters::bump(&self.counters.cached);
            return self.link.send(file).await.map_err(|_| exn::Exn::from(ErrorKind::LinkerStopped));
        }

        let handle = self.fetcher.fetch(FetchRequest::from(&file)).await?;
        let counters = Arc::clone(&self.counters);
        let (domain, path) = (file.domain.clone(), file.path.clone());
        let fetch = handle
            .map(move |outcome| match outcome {
                Ok(_) => {
                    Counters::bump(&counters.fetched);
                    true
                },
                Err(e) => {
                    tracing::warn!(%domain, %path, error = ?e, "Could not fetch file");
                    Counters::bump(&counters.failed);
                    false
                },
            })
            .boxed()
            .shared();
        self.fetches.insert(file.cache_key().to_path_buf(), fetch.clone());
        self.waiting.spawn(link_when_fetched(fetch, file, self.link.clone()));
        Ok(())
    }
}

async fn link_when_fetched(fetch: SharedFetch, file: FetchableFile, link: mpsc::Sender<FetchableFile>) {
    if fetch.await {
        // Fails only once linking has stopped, which ends the run anyway.
        let _ = link.send(file).await;
    }
}

async fn link_files(library: Library, mut queue: mpsc::Receiver<FetchableFile>, counters: Arc<Counters>) -> Result<()> {
    while let Some(file) = queue.recv().await {
        match library.link(&file).await {
            Ok(linked) if linked.created_any() => Counters::bump(&counters.linked),
            Ok(_) => Counters::bump(&counters.already_linked),
            Err(e) => {
                tracing::error!(service = %file.service, user = %file.user, id = %file.id, error = ?e, "Could not link file");
                return Err(e).or_raise(|| ErrorKind::Link);
            },
        }
    }
    Ok(())
}
