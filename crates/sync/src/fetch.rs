//! Bounded pool of download workers.
//!
//! A [`Fetcher`] owns a fixed number of worker tasks pulling jobs from one
//! bounded queue. Each job streams a remote file into the [`Cache`] and
//! resolves its [`FetchHandle`] exactly once with the outcome. Failures are
//! per-job: a worker that fails a job moves on to the next one.

use crate::error::{ErrorKind, Result};
use crate::model::FetchableFile;
use exn::ResultExt;
use hoard_api::{Remote, RemoteHandle};
use hoard_storage::{Cache, cache_key};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::instrument;

/// What to download: a remote path on a given domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub domain: String,
    pub path: String,
}
impl FetchRequest {
    pub fn new(domain: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            path: path.into(),
        }
    }
}
impl From<&FetchableFile> for FetchRequest {
    fn from(file: &FetchableFile) -> Self {
        Self::new(&file.domain, &file.path)
    }
}

/// Resolves once the job has finished, with the number of bytes stored.
///
/// If the job is dropped without being run to completion (the worker handling
/// it panicked, or the fetcher shut down underneath it) this resolves to
/// [`ErrorKind::Abandoned`] rather than waiting forever.
#[must_use = "dropping the handle does not cancel the fetch, but discards its outcome"]
#[derive(Debug)]
pub struct FetchHandle {
    done: oneshot::Receiver<Result<u64>>,
}
impl Future for FetchHandle {
    type Output = Result<u64>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.done)
            .poll(cx)
            .map(|outcome| outcome.unwrap_or_else(|_| Err(exn::Exn::from(ErrorKind::Abandoned))))
    }
}

/// Counts one job as in flight for as long as it is alive.
struct Ticket {
    counter: Arc<watch::Sender<usize>>,
}
impl Ticket {
    fn new(counter: &Arc<watch::Sender<usize>>) -> Self {
        counter.send_modify(|count| *count += 1);
        Self {
            counter: Arc::clone(counter),
        }
    }
}
impl Drop for Ticket {
    fn drop(&mut self) {
        self.counter.send_modify(|count| *count -= 1);
    }
}

struct Job {
    request: FetchRequest,
    done: oneshot::Sender<Result<u64>>,
    ticket: Ticket,
}

/// A bounded pool of download workers.
///
/// # Examples
///
/// ```
/// use hoard_api::{MockRemote, RemoteHandle};
/// use hoard_storage::Cache;
/// use hoard_sync::{FetchRequest, Fetcher};
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let temp = tempfile::tempdir().unwrap();
/// let remote: RemoteHandle = Arc::new(MockRemote::default().with_file("/data/ab/cd/abcd1234", b"png"));
/// let fetcher = Fetcher::start(remote, Cache::new(temp.path()), 4);
///
/// let bytes = fetcher.fetch_sync(FetchRequest::new("kemono.su", "/data/ab/cd/abcd1234")).await.unwrap();
/// assert_eq!(bytes, 3);
/// fetcher.close().await;
/// assert!(temp.path().join("data/ab/cd/abcd1234").is_file());
/// # }
/// ```
pub struct Fetcher {
    jobs: mpsc::Sender<Job>,
    in_flight: Arc<watch::Sender<usize>>,
    workers: Vec<JoinHandle<()>>,
}
impl Fetcher {
    /// Spawns `workers` worker tasks (at least one) on the current runtime.
    ///
    /// The queue holds as many waiting jobs as there are workers.
    ///
    /// # Panics
    /// When called outside of a tokio runtime.
    pub fn start(remote: RemoteHandle, cache: Cache, workers: usize) -> Self {
        let workers = workers.max(1);
        let (jobs, queue) = mpsc::channel(workers);
        let queue = Arc::new(Mutex::new(queue));
        let workers = (0..workers)
            .map(|worker| tokio::spawn(work(worker, Arc::clone(&remote), cache.clone(), Arc::clone(&queue))))
            .collect();
        Self {
            jobs,
            in_flight: Arc::new(watch::Sender::new(0)),
            workers,
        }
    }

    /// Queues `request`, waiting for room in the queue if it is full.
    ///
    /// The job counts as in flight from the moment this is called.
    pub async fn fetch(&self, request: FetchRequest) -> Result<FetchHandle> {
        let ticket = Ticket::new(&self.in_flight);
        let (done, receiver) = oneshot::channel();
        // A rejected job is dropped along with its ticket.
        self.jobs.send(Job { request, done, ticket }).await.map_err(|_| ErrorKind::Closed)?;
        Ok(FetchHandle { done: receiver })
    }

    /// Queues `request` and waits for it to finish.
    pub async fn fetch_sync(&self, request: FetchRequest) -> Result<u64> {
        self.fetch(request).await?.await
    }

    /// Jobs that have been queued but not yet resolved.
    pub fn in_flight(&self) -> usize {
        *self.in_flight.borrow()
    }

    /// Stops accepting jobs, waits for every queued and running job to
    /// resolve, then shuts the workers down.
    pub async fn close(self) {
        let Self { jobs, in_flight, workers } = self;
        drop(jobs);
        // Cannot fail: `in_flight` is the sender and stays alive until the end
        // of this function.
        let _ = in_flight.subscribe().wait_for(|count| *count == 0).await;
        for worker in workers {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "Fetch worker did not shut down cleanly");
            }
        }
    }
}

async fn work(worker: usize, remote: RemoteHandle, cache: Cache, queue: Arc<Mutex<mpsc::Receiver<Job>>>) {
    loop {
        let job = queue.lock().await.recv().await;
        let Some(Job { request, done, ticket }) = job else {
            break;
        };
        let outcome = fetch_one(remote.as_ref(), &cache, &request).await;
        if let Err(e) = &outcome {
            tracing::debug!(worker, domain = %request.domain, path = %request.path, error = ?e, "Fetch failed");
        }
        // Nobody waiting on the handle is fine.
        let _ = done.send(outcome);
        // Only released once the outcome has been delivered.
        drop(ticket);
    }
    tracing::trace!(worker, "Fetch worker finished");
}

#[instrument(skip_all, fields(domain = %request.domain, path = %request.path))]
async fn fetch_one(remote: &(dyn Remote + Send + Sync), cache: &Cache, request: &FetchRequest) -> Result<u64> {
    let stream = remote.file_stream(&request.domain, &request.path).await.or_raise(|| ErrorKind::Transport)?;
    let bytes = cache.put(cache_key(&request.path), stream).await.or_raise(|| ErrorKind::CacheWrite)?;
    tracing::debug!(bytes, "Fetched file");
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoard_api::MockRemote;
    use std::time::Duration;

    fn fetcher(remote: MockRemote, workers: usize) -> (tempfile::TempDir, Arc<MockRemote>, Fetcher) {
        let temp = tempfile::tempdir().unwrap();
        let remote = Arc::new(remote);
        let fetcher = Fetcher::start(remote.clone(), Cache::new(temp.path()), workers);
        (temp, remote, fetcher)
    }

    #[tokio::test]
    async fn test_fetch_sync_stores_file() {
        let (temp, remote, fetcher) = fetcher(MockRemote::default().with_file("/data/a", b"hello"), 2);
        assert_eq!(fetcher.fetch_sync(FetchRequest::new("d", "/data/a")).await.unwrap(), 5);
        assert_eq!(std::fs::read(temp.path().join("data/a")).unwrap(), b"hello");
        assert_eq!(remote.fetch_count("/data/a"), 1);
        fetcher.close().await;
    }

    #[tokio::test]
    async fn test_transport_error_writes_nothing() {
        let (temp, _remote, fetcher) = fetcher(MockRemote::default().with_unavailable_file("/data/a"), 1);
        let err = fetcher.fetch_sync(FetchRequest::new("d", "/data/a")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Transport));
        assert!(!temp.path().join("data/a").exists());
        fetcher.close().await;
    }

    #[tokio::test]
    async fn test_broken_stream_is_a_cache_write_error() {
        let (temp, _remote, fetcher) = fetcher(MockRemote::default().with_broken_file("/data/a", b"half"), 1);
        let err = fetcher.fetch_sync(FetchRequest::new("d", "/data/a")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::CacheWrite));
        assert!(!temp.path().join("data/a").exists());
        fetcher.close().await;
    }

    #[tokio::test]
    async fn test_worker_survives_failed_job() {
        let remote = MockRemote::default().with_unavailable_file("/bad").with_file("/good", b"ok");
        let (_temp, _remote, fetcher) = fetcher(remote, 1);
        assert!(fetcher.fetch_sync(FetchRequest::new("d", "/bad")).await.is_err());
        assert_eq!(fetcher.fetch_sync(FetchRequest::new("d", "/good")).await.unwrap(), 2);
        fetcher.close().await;
    }

    #[tokio::test]
    async fn test_dropped_job_resolves_as_abandoned() {
        let (done, receiver) = oneshot::channel::<Result<u64>>();
        drop(done);
        let err = FetchHandle { done: receiver }.await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Abandoned));
    }

    #[tokio::test]
    async fn test_ticket_tracks_in_flight() {
        let counter = Arc::new(watch::Sender::new(0usize));
        let first = Ticket::new(&counter);
        let second = Ticket::new(&counter);
        assert_eq!(*counter.borrow(), 2);
        drop(first);
        assert_eq!(*counter.borrow(), 1);
        drop(second);
        assert_eq!(*counter.borrow(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_close_waits_for_in_flight_jobs() {
        let remote = MockRemote::default().with_file("/slow", b"data").with_delay(Duration::from_millis(50));
        let (temp, _remote, fetcher) = fetcher(remote, 1);
        let handle = fetcher.fetch(FetchRequest::new("d", "/slow")).await.unwrap();
        assert_eq!(fetcher.in_flight(), 1);
        fetcher.close().await;
        // The job finished before close returned.
        assert!(temp.path().join("slow").is_file());
        assert_eq!(handle.await.unwrap(), 4);
    }
}
