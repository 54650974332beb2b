use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use shared::{
    domain::{
        ActivityType, Athlete, AthleteId, Challenge, ChallengeId, ChallengeMeasurement,
        ChallengeTemplate, TemplateId,
    },
    error::ApiError,
    protocol::{ChallengeFilter, FeedAction, FeedUpdate, Paging},
};
use tokio::sync::{broadcast, Mutex};
use tracing::debug;

const FEED_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct NewChallenge {
    pub title: String,
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub measurement: ChallengeMeasurement,
    pub activity_types: Vec<ActivityType>,
    pub is_private: bool,
    pub created_by: AthleteId,
}

#[derive(Debug, Clone)]
pub struct NewChallengeTemplate {
    pub title: String,
    pub description: String,
    pub measurement: ChallengeMeasurement,
    pub activity_types: Vec<ActivityType>,
    pub is_private: bool,
    pub created_by: AthleteId,
}

/// In-memory challenge collection. Every mutation emits one `FeedUpdate` on
/// the broadcast feed; queries apply the server-side filter, visibility rules,
/// and paging.
pub struct ChallengeStore {
    inner: Mutex<StoreState>,
    events: broadcast::Sender<FeedUpdate>,
}

struct StoreState {
    athletes: BTreeMap<AthleteId, Athlete>,
    challenges: BTreeMap<ChallengeId, Challenge>,
    templates: BTreeMap<TemplateId, ChallengeTemplate>,
    next_challenge_id: i64,
    next_template_id: i64,
}

impl Default for ChallengeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChallengeStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            inner: Mutex::new(StoreState {
                athletes: BTreeMap::new(),
                challenges: BTreeMap::new(),
                templates: BTreeMap::new(),
                next_challenge_id: 1,
                next_template_id: 1,
            }),
            events,
        }
    }

    pub fn subscribe_feed(&self) -> broadcast::Receiver<FeedUpdate> {
        self.events.subscribe()
    }

    /// Insert or refresh an athlete profile. Ids are assigned upstream by the
    /// identity provider, so this is an upsert rather than a create.
    pub async fn upsert_athlete(&self, athlete: Athlete) {
        let mut state = self.inner.lock().await;
        state.athletes.insert(athlete.athlete_id, athlete);
    }

    pub async fn get_athlete(&self, athlete_id: AthleteId) -> Option<Athlete> {
        let state = self.inner.lock().await;
        state.athletes.get(&athlete_id).cloned()
    }

    /// Membership of a challenge resolved to athlete profiles. Member ids
    /// without a registered profile are skipped.
    pub async fn challenge_athletes(
        &self,
        challenge_id: ChallengeId,
    ) -> Result<Vec<Athlete>, ApiError> {
        let state = self.inner.lock().await;
        let challenge = state
            .challenges
            .get(&challenge_id)
            .ok_or_else(|| ApiError::not_found(format!("challenge {}", challenge_id.0)))?;
        Ok(challenge
            .athletes
            .iter()
            .filter_map(|id| state.athletes.get(id).cloned())
            .collect())
    }

    pub async fn create_challenge(&self, new: NewChallenge) -> Challenge {
        let mut state = self.inner.lock().await;
        let challenge_id = ChallengeId(state.next_challenge_id);
        state.next_challenge_id += 1;

        let challenge = Challenge {
            challenge_id,
            title: new.title,
            description: new.description,
            start: new.start,
            end: new.end,
            measurement: new.measurement,
            activity_types: new.activity_types,
            is_private: new.is_private,
            created_by: new.created_by,
            // The creator always takes part in their own challenge.
            athletes: vec![new.created_by],
        };
        state.challenges.insert(challenge_id, challenge.clone());
        drop(state);

        debug!(challenge_id = challenge_id.0, "challenge created");
        self.emit(FeedAction::Create, challenge.clone());
        challenge
    }

    pub async fn update_challenge(
        &self,
        challenge_id: ChallengeId,
        new: NewChallenge,
    ) -> Result<Challenge, ApiError> {
        let mut state = self.inner.lock().await;
        let challenge = state
            .challenges
            .get_mut(&challenge_id)
            .ok_or_else(|| ApiError::not_found(format!("challenge {}", challenge_id.0)))?;

        challenge.title = new.title;
        challenge.description = new.description;
        challenge.start = new.start;
        challenge.end = new.end;
        challenge.measurement = new.measurement;
        challenge.activity_types = new.activity_types;
        challenge.is_private = new.is_private;
        let updated = challenge.clone();
        drop(state);

        debug!(challenge_id = challenge_id.0, "challenge updated");
        self.emit(FeedAction::Update, updated.clone());
        Ok(updated)
    }

    pub async fn delete_challenge(&self, challenge_id: ChallengeId) -> Result<(), ApiError> {
        let mut state = self.inner.lock().await;
        let removed = state
            .challenges
            .remove(&challenge_id)
            .ok_or_else(|| ApiError::not_found(format!("challenge {}", challenge_id.0)))?;
        drop(state);

        debug!(challenge_id = challenge_id.0, "challenge deleted");
        self.emit(FeedAction::Delete, removed);
        Ok(())
    }

    pub async fn join_challenge(
        &self,
        challenge_id: ChallengeId,
        athlete_id: AthleteId,
    ) -> Result<Challenge, ApiError> {
        let mut state = self.inner.lock().await;
        let challenge = state
            .challenges
            .get_mut(&challenge_id)
            .ok_or_else(|| ApiError::not_found(format!("challenge {}", challenge_id.0)))?;
        if !challenge.has_member(athlete_id) {
            challenge.athletes.push(athlete_id);
        }
        let updated = challenge.clone();
        drop(state);

        self.emit(FeedAction::Update, updated.clone());
        Ok(updated)
    }

    pub async fn leave_challenge(
        &self,
        challenge_id: ChallengeId,
        athlete_id: AthleteId,
    ) -> Result<Challenge, ApiError> {
        let mut state = self.inner.lock().await;
        let challenge = state
            .challenges
            .get_mut(&challenge_id)
            .ok_or_else(|| ApiError::not_found(format!("challenge {}", challenge_id.0)))?;
        challenge.athletes.retain(|a| *a != athlete_id);
        let updated = challenge.clone();
        drop(state);

        self.emit(FeedAction::Update, updated.clone());
        Ok(updated)
    }

    pub async fn get_challenge(&self, challenge_id: ChallengeId) -> Option<Challenge> {
        let state = self.inner.lock().await;
        state.challenges.get(&challenge_id).cloned()
    }

    /// Filtered, paged challenge listing for one viewer. A page shorter than
    /// `paging.page_size` means the end of the data set.
    pub async fn list_challenges(
        &self,
        viewer: AthleteId,
        filter: &ChallengeFilter,
        paging: Paging,
    ) -> Vec<Challenge> {
        let today = Utc::now().date_naive();
        let state = self.inner.lock().await;
        let mut matched: Vec<Challenge> = state
            .challenges
            .values()
            .filter(|c| visible_to(c, viewer))
            .filter(|c| matches_filter(c, filter, today))
            .cloned()
            .collect();
        drop(state);

        matched.sort_by(|a, b| b.start.cmp(&a.start).then_with(|| a.title.cmp(&b.title)));
        matched
            .into_iter()
            .skip(paging.offset())
            .take(paging.page_size as usize)
            .collect()
    }

    pub async fn create_template(&self, new: NewChallengeTemplate) -> ChallengeTemplate {
        let mut state = self.inner.lock().await;
        let template_id = TemplateId(state.next_template_id);
        state.next_template_id += 1;

        let template = ChallengeTemplate {
            template_id,
            title: new.title,
            description: new.description,
            measurement: new.measurement,
            activity_types: new.activity_types,
            is_private: new.is_private,
            created_by: new.created_by,
            created_at: Utc::now(),
        };
        state.templates.insert(template_id, template.clone());
        template
    }

    pub async fn list_templates(&self, athlete_id: AthleteId) -> Vec<ChallengeTemplate> {
        let state = self.inner.lock().await;
        state
            .templates
            .values()
            .filter(|t| t.created_by == athlete_id)
            .cloned()
            .collect()
    }

    pub async fn delete_template(&self, template_id: TemplateId) -> Result<(), ApiError> {
        let mut state = self.inner.lock().await;
        state
            .templates
            .remove(&template_id)
            .map(|_| ())
            .ok_or_else(|| ApiError::not_found(format!("template {}", template_id.0)))
    }

    fn emit(&self, action: FeedAction, challenge: Challenge) {
        // Send fails only when nobody is subscribed, which is fine.
        let _ = self.events.send(FeedUpdate::new(action, challenge));
    }
}

fn visible_to(challenge: &Challenge, viewer: AthleteId) -> bool {
    !challenge.is_private || challenge.created_by == viewer || challenge.has_member(viewer)
}

fn matches_filter(challenge: &Challenge, filter: &ChallengeFilter, today: NaiveDate) -> bool {
    if let Some(athlete_id) = filter.by_athlete {
        if challenge.created_by != athlete_id && !challenge.has_member(athlete_id) {
            return false;
        }
    }
    if !filter.include_outdated && challenge.end.date_naive() < today {
        return false;
    }
    let text = filter.search_text.trim();
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
