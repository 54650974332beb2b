use serde::{Deserialize, Serialize};

use crate::domain::{AthleteId, Challenge};

/// Server-side filter parameters for a paged challenge query. The fine-grained
/// toggles (measurement kinds, created-by-me vs participating) stay client-side;
/// the server only narrows by text, athlete scope, and recency.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChallengeFilter {
    #[serde(default)]
    pub search_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by_athlete: Option<AthleteId>,
    #[serde(default)]
    pub include_outdated: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Paging {
    pub page_size: u32,
    pub page: u32,
}

impl Paging {
    pub fn new(page_size: u32, page: u32) -> Self {
        Self { page_size, page }
    }

    pub fn offset(&self) -> usize {
        (self.page_size as usize) * (self.page as usize)
    }
}

/// Push-feed mutation kind. Unrecognized wire tags collapse into `Unknown`
/// rather than failing the whole feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedAction {
    Create,
    Update,
    Delete,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedUpdate {
    pub action: FeedAction,
    pub challenge: Challenge,
}

impl FeedUpdate {
    pub fn new(action: FeedAction, challenge: Challenge) -> Self {
        Self { action, challenge }
    }
}
