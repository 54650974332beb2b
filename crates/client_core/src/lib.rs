use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use shared::{
    domain::{AthleteId, Challenge},
    protocol::{ChallengeFilter, FeedUpdate, Paging},
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

mod debounce;
pub mod error;
mod store_directory;
mod view;

pub use error::ListError;
pub use store_directory::StoreDirectory;
pub use view::{ChallengeListFilter, ChallengeListView};

use debounce::Debounce;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
const FILTER_TEXT_DEBOUNCE: Duration = Duration::from_millis(300);
const FEED_RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

/// Upstream contract the list controller consumes: a paged fetch plus a push
/// feed of create/update/delete events. The feed is best-effort freshness,
/// at-least-once, in order per challenge id.
#[async_trait]
pub trait ChallengeDirectory: Send + Sync {
    async fn fetch_page(
        &self,
        viewer: AthleteId,
        filter: &ChallengeFilter,
        paging: Paging,
        cancel: CancellationToken,
    ) -> anyhow::Result<Vec<Challenge>>;

    fn subscribe_feed(&self) -> broadcast::Receiver<FeedUpdate>;
}

/// Fire-and-forget signal to the presentation layer, sent after every state
/// mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewEvent {
    Invalidated,
}

/// Live list controller: presents a filtered, sorted, paginated,
/// continuously-updated view of the remote challenge collection.
///
/// The view mutex serializes `set_filter`, `load_more`, and feed application,
/// so each mutation runs to completion before the next one starts and the
/// rendering layer never observes a torn `visible`.
pub struct ChallengeListController {
    directory: Arc<dyn ChallengeDirectory>,
    viewer: AthleteId,
    page_size: u32,
    view: Mutex<ChallengeListView>,
    events: broadcast::Sender<ViewEvent>,
    shutdown: CancellationToken,
    feed_task: Mutex<Option<JoinHandle<()>>>,
    debounce: Mutex<Debounce>,
}

impl ChallengeListController {
    pub fn new(
        directory: Arc<dyn ChallengeDirectory>,
        viewer: AthleteId,
        page_size: u32,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            directory,
            viewer,
            page_size,
            view: Mutex::new(ChallengeListView::new(viewer)),
            events,
            shutdown: CancellationToken::new(),
            feed_task: Mutex::new(None),
            debounce: Mutex::new(Debounce::new()),
        })
    }

    /// Start consuming the push feed. Safe to call once per controller;
    /// repeated calls are ignored.
    pub async fn start(self: &Arc<Self>) {
        let mut feed_task = self.feed_task.lock().await;
        if feed_task.is_some() {
            return;
        }
        let client = Arc::clone(self);
        *feed_task = Some(tokio::spawn(async move { client.run_feed().await }));
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ViewEvent> {
        self.events.subscribe()
    }

    pub async fn visible(&self) -> Vec<Challenge> {
        self.view.lock().await.visible().to_vec()
    }

    pub async fn has_more(&self) -> bool {
        self.view.lock().await.has_more()
    }

    pub async fn filter(&self) -> ChallengeListFilter {
        self.view.lock().await.filter().clone()
    }

    /// Replace the filter: clears the buffer, resets paging, and refetches
    /// page 0 under the new filter. Repeated calls serialize on the view
    /// lock, so the last call's filter wins.
    pub async fn set_filter(&self, filter: ChallengeListFilter) -> Result<(), ListError> {
        if self.shutdown.is_cancelled() {
            return Ok(());
        }
        let mut view = self.view.lock().await;
        view.reset_for_filter(filter, today());
        self.signal_rerender();
        self.fetch_next_page(&mut view, &CancellationToken::new())
            .await
    }

    /// Immediate free-text change. Interactive keystrokes should go through
    /// [`Self::set_filter_text_debounced`] instead.
    pub async fn set_filter_text(&self, text: impl Into<String>) -> Result<(), ListError> {
        let filter = {
            let view = self.view.lock().await;
            let mut filter = view.filter().clone();
            filter.text = text.into();
            filter
        };
        self.set_filter(filter).await
    }

    /// Coalesce keystroke-driven text changes: each call re-arms a 300 ms
    /// timer and discards the previously pending value; only the value that
    /// survives the quiet period triggers a fetch. A fetch whose value
    /// already settled completes even if another keystroke follows, so the
    /// list never drops a finished reset mid-way.
    pub async fn set_filter_text_debounced(self: &Arc<Self>, text: impl Into<String>) {
        let text = text.into();
        let client = Arc::clone(self);
        let mut debounce = self.debounce.lock().await;
        debounce.schedule(FILTER_TEXT_DEBOUNCE, async move {
            if client.shutdown.is_cancelled() {
                return;
            }
            if let Err(err) = client.set_filter_text(text).await {
                warn!(%err, "debounced filter refetch failed");
            }
        });
    }

    /// Fetch the next page under the current filter. No-op once the last
    /// fetch stopped growing the buffer. A cancellation before the fetch
    /// resolves discards the result and leaves the view untouched.
    pub async fn load_more(&self, cancel: &CancellationToken) -> Result<(), ListError> {
        let mut view = self.view.lock().await;
        self.fetch_next_page(&mut view, cancel).await
    }

    /// Tear the view down: release the feed subscription and cancel any
    /// pending debounce. No mutation or re-render happens afterwards, even
    /// if a fetch is still in flight.
    pub async fn teardown(&self) {
        self.shutdown.cancel();
        self.debounce.lock().await.cancel();
        if let Some(handle) = self.feed_task.lock().await.take() {
            handle.abort();
        }
    }

    async fn fetch_next_page(
        &self,
        view: &mut ChallengeListView,
        cancel: &CancellationToken,
    ) -> Result<(), ListError> {
        if self.shutdown.is_cancelled() || !view.has_more() {
            return Ok(());
        }

        let next_page = (view.page() + 1) as u32;
        let filter = view.filter().server_filter(self.viewer);
        let paging = Paging::new(self.page_size, next_page);

        let items = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            () = self.shutdown.cancelled() => return Ok(()),
            result = self
                .directory
                .fetch_page(self.viewer, &filter, paging, cancel.clone()) =>
            {
                result.map_err(ListError::FetchFailed)?
            }
        };
        if self.shutdown.is_cancelled() {
            return Ok(());
        }

        view.page = next_page as i32;
        let added = view.ingest_page(items, today());
        // "More" means this fetch grew the buffer, mirroring the count
        // comparison the paged UI relies on.
        view.has_more = added > 0;
        self.signal_rerender();
        Ok(())
    }

    async fn run_feed(self: Arc<Self>) {
        loop {
            let mut feed = self.directory.subscribe_feed();
            loop {
                tokio::select! {
                    () = self.shutdown.cancelled() => return,
                    update = feed.recv() => match update {
                        Ok(update) => self.apply_feed_update(update).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "challenge feed lagged; continuing");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }

            let err = ListError::FeedSubscriptionLost;
            warn!(%err, delay_ms = FEED_RESUBSCRIBE_DELAY.as_millis() as u64, "resubscribing");
            tokio::select! {
                () = self.shutdown.cancelled() => return,
                () = tokio::time::sleep(FEED_RESUBSCRIBE_DELAY) => {}
            }
        }
    }

    async fn apply_feed_update(&self, update: FeedUpdate) {
        let mut view = self.view.lock().await;
        match view.apply_feed_update(update, today()) {
            Ok(()) => {
                drop(view);
                self.signal_rerender();
            }
            Err(err) => {
                drop(view);
                // Malformed event; the buffer is untouched and the
                // subscription keeps going.
                error!(%err, "skipping challenge feed event");
            }
        }
    }

    fn signal_rerender(&self) {
        let _ = self.events.send(ViewEvent::Invalidated);
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

#[cfg(test)]
mod tests;
