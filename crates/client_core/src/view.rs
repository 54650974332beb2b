use chrono::NaiveDate;
use shared::{
    domain::{AthleteId, Challenge, ChallengeId, ChallengeMeasurement},
    protocol::{ChallengeFilter, FeedAction, FeedUpdate},
};

use crate::error::ListError;

/// Client-side filter toggles. The measurement toggles combine as OR: a
/// challenge passes when it matches any enabled kind, and when none are
/// enabled every kind passes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChallengeListFilter {
    pub text: String,
    pub created_by_me: bool,
    pub participating: bool,
    pub time_based: bool,
    pub distance_based: bool,
    pub elevation_based: bool,
    pub show_outdated: bool,
}

impl ChallengeListFilter {
    /// Projection onto the coarser server-side filter; the precise predicates
    /// are re-applied in [`ChallengeListView::recompute_visible`].
    pub(crate) fn server_filter(&self, viewer: AthleteId) -> ChallengeFilter {
        ChallengeFilter {
            search_text: self.text.clone(),
            by_athlete: (self.created_by_me || self.participating).then_some(viewer),
            include_outdated: self.show_outdated,
        }
    }

    fn passes(&self, challenge: &Challenge, viewer: AthleteId, today: NaiveDate) -> bool {
        if self.created_by_me && challenge.created_by != viewer {
            return false;
        }
        if self.participating && !challenge.has_member(viewer) {
            return false;
        }
        if self.time_based || self.distance_based || self.elevation_based {
            let enabled = match challenge.measurement {
                ChallengeMeasurement::Time => self.time_based,
                ChallengeMeasurement::Distance => self.distance_based,
                ChallengeMeasurement::Elevation => self.elevation_based,
            };
            if !enabled {
                return false;
            }
        }
        if !self.show_outdated && challenge.end.date_naive() < today {
            return false;
        }
        let text = self.text.trim();
        if !text.is_empty()
            && !challenge
                .title
                .to_lowercase()
                .contains(&text.to_lowercase())
        {
            return false;
        }
        true
    }
}

/// Locally materialized view state over the server-backed challenge
/// collection. `visible` is always rebuilt from `(buffer, filter)`; the
/// buffer holds at most one entry per challenge id after any mutation.
pub struct ChallengeListView {
    viewer: AthleteId,
    pub(crate) buffer: Vec<Challenge>,
    pub(crate) filter: ChallengeListFilter,
    /// Zero-based server page cursor; -1 means no page fetched yet.
    pub(crate) page: i32,
    pub(crate) has_more: bool,
    visible: Vec<Challenge>,
}

impl ChallengeListView {
    pub fn new(viewer: AthleteId) -> Self {
        Self {
            viewer,
            buffer: Vec::new(),
            filter: ChallengeListFilter::default(),
            page: -1,
            has_more: true,
            visible: Vec::new(),
        }
    }

    pub fn visible(&self) -> &[Challenge] {
        &self.visible
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn filter(&self) -> &ChallengeListFilter {
        &self.filter
    }

    pub fn page(&self) -> i32 {
        self.page
    }

    /// Replace the filter and force a refetch from scratch: the buffer is not
    /// re-filtered client-side only, the server gets re-queried from page 0.
    pub fn reset_for_filter(&mut self, filter: ChallengeListFilter, today: NaiveDate) {
        self.filter = filter;
        self.buffer.clear();
        self.page = -1;
        self.has_more = true;
        self.recompute_visible(today);
    }

    /// Append one fetched page, last-write-wins per id. Returns the number of
    /// net-new buffer entries.
    pub fn ingest_page(&mut self, items: Vec<Challenge>, today: NaiveDate) -> usize {
        let before = self.buffer.len();
        for item in items {
            self.remove_by_id(item.challenge_id);
            self.buffer.push(item);
        }
        self.recompute_visible(today);
        self.buffer.len() - before
    }

    /// Apply one push-feed event, regardless of whether the challenge matches
    /// the current filter; filtering happens in the derived-view step.
    pub fn apply_feed_update(
        &mut self,
        update: FeedUpdate,
        today: NaiveDate,
    ) -> Result<(), ListError> {
        match update.action {
            FeedAction::Create | FeedAction::Update => {
                self.remove_by_id(update.challenge.challenge_id);
                self.buffer.push(update.challenge);
            }
            FeedAction::Delete => {
                self.remove_by_id(update.challenge.challenge_id);
            }
            FeedAction::Unknown => return Err(ListError::InvalidFeedAction),
        }
        self.recompute_visible(today);
        Ok(())
    }

    /// Full rebuild of the derived view: filter, then sort by start
    /// descending with title ascending as the tie-break. The buffer stays
    /// small enough (bounded by paging) that incremental maintenance is not
    /// worth it.
    pub fn recompute_visible(&mut self, today: NaiveDate) {
        let mut visible: Vec<Challenge> = self
            .buffer
            .iter()
            .filter(|c| self.filter.passes(c, self.viewer, today))
            .cloned()
            .collect();
        visible.sort_by(|a, b| b.start.cmp(&a.start).then_with(|| a.title.cmp(&b.title)));
        self.visible = visible;
    }

    fn remove_by_id(&mut self, challenge_id: ChallengeId) {
        self.buffer.retain(|c| c.challenge_id != challenge_id);
    }
}
