use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex as StdMutex,
};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use shared::{
    domain::{ActivityType, AthleteId, Challenge, ChallengeId, ChallengeMeasurement},
    protocol::{ChallengeFilter, FeedAction, FeedUpdate, Paging},
};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::{ChallengeDirectory, ChallengeListController, ChallengeListFilter, ListError};

const VIEWER: AthleteId = AthleteId(1);

fn challenge(id: i64, title: &str, start_day: u32) -> Challenge {
    Challenge {
        challenge_id: ChallengeId(id),
        title: title.to_string(),
        description: String::new(),
        start: Utc.with_ymd_and_hms(2024, 3, start_day, 12, 0, 0).unwrap(),
        end: Utc::now() + ChronoDuration::days(30),
        measurement: ChallengeMeasurement::Distance,
        activity_types: vec![ActivityType::Ride],
        is_private: false,
        created_by: VIEWER,
        athletes: vec![VIEWER],
    }
}

struct TestDirectory {
    pages: Vec<Vec<Challenge>>,
    fail: AtomicBool,
    delay: Option<Duration>,
    feed: StdMutex<broadcast::Sender<FeedUpdate>>,
    fetch_log: StdMutex<Vec<(String, u32)>>,
}

impl TestDirectory {
    fn new(pages: Vec<Vec<Challenge>>) -> Arc<Self> {
        Self::build(pages, None)
    }

    fn slow(pages: Vec<Vec<Challenge>>, delay: Duration) -> Arc<Self> {
        Self::build(pages, Some(delay))
    }

    fn build(pages: Vec<Vec<Challenge>>, delay: Option<Duration>) -> Arc<Self> {
        let (feed, _) = broadcast::channel(64);
        Arc::new(Self {
            pages,
            fail: AtomicBool::new(false),
            delay,
            feed: StdMutex::new(feed),
            fetch_log: StdMutex::new(Vec::new()),
        })
    }

    fn send(&self, update: FeedUpdate) {
        self.feed.lock().unwrap().send(update).unwrap();
    }

    /// Drop the current sender, closing every subscription handed out so far.
    fn replace_feed(&self) {
        let (feed, _) = broadcast::channel(64);
        *self.feed.lock().unwrap() = feed;
    }

    fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn log(&self) -> Vec<(String, u32)> {
        self.fetch_log.lock().unwrap().clone()
    }

    fn fetched_pages(&self) -> Vec<u32> {
        self.log().into_iter().map(|(_, page)| page).collect()
    }
}

#[async_trait]
impl ChallengeDirectory for TestDirectory {
    async fn fetch_page(
        &self,
        _viewer: AthleteId,
        filter: &ChallengeFilter,
        paging: Paging,
        _cancel: CancellationToken,
    ) -> anyhow::Result<Vec<Challenge>> {
        self.fetch_log
            .lock()
            .unwrap()
            .push((filter.search_text.clone(), paging.page));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("directory unavailable");
        }
        Ok(self
            .pages
            .get(paging.page as usize)
            .cloned()
            .unwrap_or_default())
    }

    fn subscribe_feed(&self) -> broadcast::Receiver<FeedUpdate> {
        self.feed.lock().unwrap().subscribe()
    }
}

/// Let the current-thread runtime drive the controller's feed task up to its
/// next await point.
async fn settle() {
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn load_more_paginates_dedups_and_stops() {
    let dir = TestDirectory::new(vec![
        vec![challenge(1, "Alpha", 3), challenge(2, "Bravo", 2)],
        // Server page overlap: id 2 comes back again alongside the new id 3.
        vec![challenge(2, "Bravo", 2), challenge(3, "Charlie", 1)],
        vec![],
    ]);
    let controller = ChallengeListController::new(dir.clone(), VIEWER, 2);

    controller
        .set_filter(ChallengeListFilter::default())
        .await
        .unwrap();
    assert_eq!(controller.visible().await.len(), 2);
    assert!(controller.has_more().await);

    let cancel = CancellationToken::new();
    controller.load_more(&cancel).await.unwrap();
    assert_eq!(controller.visible().await.len(), 3);
    assert!(controller.has_more().await);

    controller.load_more(&cancel).await.unwrap();
    assert!(!controller.has_more().await);

    // Exhausted: no further fetch happens.
    controller.load_more(&cancel).await.unwrap();
    assert_eq!(dir.fetched_pages(), vec![0, 1, 2]);

    let titles: Vec<String> = controller
        .visible()
        .await
        .iter()
        .map(|c| c.title.clone())
        .collect();
    assert_eq!(titles, ["Alpha", "Bravo", "Charlie"]);
}

#[tokio::test]
async fn set_filter_restarts_from_page_zero() {
    let dir = TestDirectory::new(vec![
        vec![challenge(1, "Alpha", 3), challenge(2, "Bravo", 2)],
        vec![challenge(3, "Charlie", 1)],
    ]);
    let controller = ChallengeListController::new(dir.clone(), VIEWER, 2);

    controller
        .set_filter(ChallengeListFilter::default())
        .await
        .unwrap();
    controller.load_more(&CancellationToken::new()).await.unwrap();
    assert_eq!(controller.visible().await.len(), 3);

    controller
        .set_filter(ChallengeListFilter {
            text: "alpha".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    // Accumulation restarted from scratch under the new filter.
    assert_eq!(dir.log().last().unwrap(), &("alpha".to_string(), 0));
    let titles: Vec<String> = controller
        .visible()
        .await
        .iter()
        .map(|c| c.title.clone())
        .collect();
    assert_eq!(titles, ["Alpha"]);
}

#[tokio::test]
async fn fetch_failure_leaves_last_good_state() {
    let dir = TestDirectory::new(vec![
        vec![challenge(1, "Alpha", 3), challenge(2, "Bravo", 2)],
        vec![challenge(3, "Charlie", 1)],
    ]);
    let controller = ChallengeListController::new(dir.clone(), VIEWER, 2);
    controller
        .set_filter(ChallengeListFilter::default())
        .await
        .unwrap();

    dir.set_fail(true);
    let err = controller
        .load_more(&CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ListError::FetchFailed(_)));
    assert_eq!(controller.visible().await.len(), 2);
    assert!(controller.has_more().await);

    // The cursor did not advance: the retry fetches the same page.
    dir.set_fail(false);
    controller.load_more(&CancellationToken::new()).await.unwrap();
    assert_eq!(dir.fetched_pages(), vec![0, 1, 1]);
    assert_eq!(controller.visible().await.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn debounced_text_changes_coalesce_to_last_value() {
    let dir = TestDirectory::new(vec![vec![challenge(1, "Foobar", 3)]]);
    let controller = ChallengeListController::new(dir.clone(), VIEWER, 10);

    for text in ["f", "fo", "foo"] {
        controller.set_filter_text_debounced(text).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    tokio::time::sleep(Duration::from_millis(400)).await;

    // Exactly one effective fetch, under the settled value.
    assert_eq!(dir.log(), vec![("foo".to_string(), 0)]);
    assert_eq!(controller.filter().await.text, "foo");
}

#[tokio::test(start_paused = true)]
async fn canceled_load_more_discards_the_fetch() {
    let dir = TestDirectory::slow(
        vec![vec![challenge(1, "Alpha", 3)]],
        Duration::from_secs(60),
    );
    let controller = ChallengeListController::new(dir.clone(), VIEWER, 10);
    let mut renders = controller.subscribe_events();

    let cancel = CancellationToken::new();
    let task = {
        let controller = Arc::clone(&controller);
        let cancel = cancel.clone();
        tokio::spawn(async move { controller.load_more(&cancel).await })
    };
    settle().await;
    cancel.cancel();
    task.await.unwrap().unwrap();

    assert!(controller.visible().await.is_empty());
    assert!(controller.has_more().await);
    assert!(renders.try_recv().is_err());

    // A fresh load_more starts over from page 0: the canceled fetch never
    // advanced the cursor.
    controller.load_more(&CancellationToken::new()).await.unwrap();
    assert_eq!(dir.fetched_pages(), vec![0, 0]);
    assert_eq!(controller.visible().await.len(), 1);
}

#[tokio::test]
async fn feed_events_flow_into_the_visible_list() {
    let dir = TestDirectory::new(vec![]);
    let controller = ChallengeListController::new(dir.clone(), VIEWER, 10);
    controller.start().await;
    settle().await;
    let mut renders = controller.subscribe_events();

    dir.send(FeedUpdate::new(FeedAction::Create, challenge(1, "Alpha", 3)));
    renders.recv().await.unwrap();
    assert_eq!(controller.visible().await[0].title, "Alpha");

    dir.send(FeedUpdate::new(FeedAction::Update, challenge(1, "Alpha v2", 3)));
    renders.recv().await.unwrap();
    let visible = controller.visible().await;
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].title, "Alpha v2");

    dir.send(FeedUpdate::new(FeedAction::Delete, challenge(1, "Alpha v2", 3)));
    renders.recv().await.unwrap();
    assert!(controller.visible().await.is_empty());

    controller.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn feed_resubscribes_after_the_channel_closes() {
    let dir = TestDirectory::new(vec![]);
    let controller = ChallengeListController::new(dir.clone(), VIEWER, 10);
    controller.start().await;
    settle().await;
    let mut renders = controller.subscribe_events();

    dir.send(FeedUpdate::new(FeedAction::Create, challenge(1, "Alpha", 3)));
    renders.recv().await.unwrap();

    // Dropping the sender closes the subscription; the feed task backs off
    // for a second and subscribes to the replacement.
    dir.replace_feed();
    settle().await;
    tokio::time::sleep(Duration::from_millis(1100)).await;
    settle().await;

    dir.send(FeedUpdate::new(FeedAction::Create, challenge(2, "Bravo", 2)));
    renders.recv().await.unwrap();
    assert_eq!(controller.visible().await.len(), 2);

    controller.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn keystroke_during_a_settling_fetch_keeps_its_result() {
    let dir = TestDirectory::slow(
        vec![vec![challenge(1, "Alpha", 3)]],
        Duration::from_millis(100),
    );
    let controller = ChallengeListController::new(dir.clone(), VIEWER, 10);

    controller.set_filter_text_debounced("a").await;
    tokio::time::sleep(Duration::from_millis(310)).await;
    // The settled fetch for "a" is mid-flight; this keystroke re-arms the
    // timer but must not discard that fetch.
    controller.set_filter_text_debounced("al").await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(controller.filter().await.text, "a");
    assert_eq!(controller.visible().await.len(), 1);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(controller.filter().await.text, "al");
    assert_eq!(controller.visible().await.len(), 1);
    assert_eq!(dir.log(), vec![("a".to_string(), 0), ("al".to_string(), 0)]);
}

#[tokio::test]
async fn unknown_feed_actions_skip_only_that_event() {
    let dir = TestDirectory::new(vec![]);
    let controller = ChallengeListController::new(dir.clone(), VIEWER, 10);
    controller.start().await;
    settle().await;
    let mut renders = controller.subscribe_events();

    dir.send(FeedUpdate::new(FeedAction::Unknown, challenge(9, "Bogus", 2)));
    dir.send(FeedUpdate::new(FeedAction::Create, challenge(1, "Alpha", 3)));

    // Only the valid event lands and signals a re-render.
    renders.recv().await.unwrap();
    let titles: Vec<String> = controller
        .visible()
        .await
        .iter()
        .map(|c| c.title.clone())
        .collect();
    assert_eq!(titles, ["Alpha"]);

    controller.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn teardown_discards_an_inflight_fetch() {
    let dir = TestDirectory::slow(
        vec![vec![challenge(1, "Alpha", 3)]],
        Duration::from_secs(60),
    );
    let controller = ChallengeListController::new(dir.clone(), VIEWER, 10);
    let mut renders = controller.subscribe_events();

    let task = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.load_more(&CancellationToken::new()).await })
    };
    settle().await;
    controller.teardown().await;
    task.await.unwrap().unwrap();

    assert!(controller.visible().await.is_empty());
    assert!(renders.try_recv().is_err());

    // Every later entry point is inert after teardown.
    controller
        .set_filter(ChallengeListFilter::default())
        .await
        .unwrap();
    controller.load_more(&CancellationToken::new()).await.unwrap();
    assert_eq!(dir.fetched_pages(), vec![0]);
    assert!(renders.try_recv().is_err());
}
