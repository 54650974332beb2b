use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

id_newtype!(AthleteId);
id_newtype!(ChallengeId);
id_newtype!(TemplateId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeMeasurement {
    Distance,
    Time,
    Elevation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Ride,
    Run,
    Swim,
    Walk,
    Hike,
    NordicSki,
    AlpineSki,
    Rowing,
    Workout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Athlete {
    pub athlete_id: AthleteId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub img_url: Option<String>,
}

/// A time-bounded competition between athletes. `athletes` is the membership
/// list; private challenges are visible only to the creator and members.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    pub challenge_id: ChallengeId,
    pub title: String,
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub measurement: ChallengeMeasurement,
    pub activity_types: Vec<ActivityType>,
    pub is_private: bool,
    pub created_by: AthleteId,
    pub athletes: Vec<AthleteId>,
}

impl Challenge {
    pub fn has_member(&self, athlete_id: AthleteId) -> bool {
        self.athletes.contains(&athlete_id)
    }
}

/// Reusable blueprint for creating challenges with the same shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeTemplate {
    pub template_id: TemplateId,
    pub title: String,
    pub description: String,
    pub measurement: ChallengeMeasurement,
    pub activity_types: Vec<ActivityType>,
    pub is_private: bool,
    pub created_by: AthleteId,
    pub created_at: DateTime<Utc>,
}
