//! Change notification plumbing behind the live queries.
//!
//! Every store backend owns a [`ChangeHub`]; after a committed write it
//! ticks the touched collection. A [`Subscription`] couples one of those
//! tick receivers with a re-runnable query: the first poll delivers the
//! current result set, each later tick re-runs the query and delivers the
//! result only when it differs from the last delivered one. Writes that do
//! not change the subscribed result set are therefore never observable.

use futures_util::future::BoxFuture;
use futures_util::Stream;
use metrics::increment_counter;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::repo::RepoResult;

const FEED_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Profiles,
    Students,
    Messages,
    Progress,
    Announcements,
    Events,
    Files,
    Notifications,
}

impl Collection {
    pub const ALL: [Collection; 8] = [
        Collection::Profiles,
        Collection::Students,
        Collection::Messages,
        Collection::Progress,
        Collection::Announcements,
        Collection::Events,
        Collection::Files,
        Collection::Notifications,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Collection::Profiles => "profiles",
            Collection::Students => "students",
            Collection::Messages => "messages",
            Collection::Progress => "progress_reports",
            Collection::Announcements => "announcements",
            Collection::Events => "events",
            Collection::Files => "files",
            Collection::Notifications => "notifications",
        }
    }

    fn index(self) -> usize {
        Collection::ALL.iter().position(|c| *c == self).unwrap_or(0)
    }
}

/// One broadcast channel per collection. Ticks carry no payload; observers
/// re-query, so a lagged receiver coalesces missed ticks into one refresh.
#[derive(Clone)]
pub struct ChangeHub {
    feeds: Arc<[broadcast::Sender<()>; 8]>,
}

impl ChangeHub {
    pub fn new() -> Self {
        let feeds = std::array::from_fn(|_| broadcast::channel(FEED_BUFFER).0);
        ChangeHub { feeds: Arc::new(feeds) }
    }

    /// Called by store backends after a write has been committed.
    pub fn notify(&self, collection: Collection) {
        increment_counter!("classlink_document_writes_total", "collection" => collection.name());
        // No receivers is fine; send only fails when nobody is listening.
        let _ = self.feeds[collection.index()].send(());
    }

    pub fn changed(&self, collection: Collection) -> broadcast::Receiver<()> {
        self.feeds[collection.index()].subscribe()
    }
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new()
    }
}

/// One delivered result set.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<T> {
    pub docs: Vec<T>,
}

type QueryFn<T> = Box<dyn Fn() -> BoxFuture<'static, RepoResult<Vec<T>>> + Send + Sync>;

/// A live query handle. Dropping it detaches from the hub; there is no
/// explicit unsubscribe call.
pub struct Subscription<T> {
    ticks: broadcast::Receiver<()>,
    query: QueryFn<T>,
    last: Option<Vec<T>>,
    primed: bool,
}

impl<T> Subscription<T>
where
    T: Clone + PartialEq + Send + 'static,
{
    pub fn new(ticks: broadcast::Receiver<()>, query: QueryFn<T>) -> Self {
        Subscription { ticks, query, last: None, primed: false }
    }

    /// Next snapshot, or None once the backing hub is gone.
    ///
    /// The first call resolves immediately with the current result set.
    /// A failed re-query is logged and skipped rather than ending the feed.
    pub async fn next(&mut self) -> Option<Snapshot<T>> {
        if !self.primed {
            self.primed = true;
            let docs = match (self.query)().await {
                Ok(docs) => docs,
                Err(e) => {
                    log::warn!("live query initial fetch failed: {e}");
                    Vec::new()
                }
            };
            self.last = Some(docs.clone());
            increment_counter!("classlink_snapshots_delivered_total");
            return Some(Snapshot { docs });
        }
        loop {
            match self.ticks.recv().await {
                // Lagged means ticks were dropped; one re-query covers them all.
                Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
                    match (self.query)().await {
                        Ok(docs) => {
                            if self.last.as_ref() == Some(&docs) {
                                continue;
                            }
                            self.last = Some(docs.clone());
                            increment_counter!("classlink_snapshots_delivered_total");
                            return Some(Snapshot { docs });
                        }
                        Err(e) => {
                            log::warn!("live query refresh failed: {e}");
                            continue;
                        }
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Adapt into a `Stream` for SSE responses.
    pub fn into_stream(self) -> impl Stream<Item = Snapshot<T>> + Send {
        futures_util::stream::unfold(self, |mut sub| async move {
            sub.next().await.map(|snap| (snap, sub))
        })
    }
}
