use std::sync::Arc;

use async_trait::async_trait;
use shared::{
    domain::{AthleteId, Challenge},
    protocol::{ChallengeFilter, FeedUpdate, Paging},
};
use store::ChallengeStore;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::ChallengeDirectory;

/// [`ChallengeDirectory`] backed by the in-memory challenge store. Queries
/// resolve immediately, so the cancellation token only matters to the
/// controller's own select.
pub struct StoreDirectory {
    store: Arc<ChallengeStore>,
}

impl StoreDirectory {
    pub fn new(store: Arc<ChallengeStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ChallengeDirectory for StoreDirectory {
    async fn fetch_page(
        &self,
        viewer: AthleteId,
        filter: &ChallengeFilter,
        paging: Paging,
        _cancel: CancellationToken,
    ) -> anyhow::Result<Vec<Challenge>> {
        Ok(self.store.list_challenges(viewer, filter, paging).await)
    }

    fn subscribe_feed(&self) -> broadcast::Receiver<FeedUpdate> {
        self.store.subscribe_feed()
    }
}
