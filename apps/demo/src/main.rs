use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};
use clap::Parser;
use client_core::{ChallengeListController, ChallengeListFilter, StoreDirectory, DEFAULT_PAGE_SIZE};
use shared::domain::{ActivityType, Athlete, AthleteId, Challenge, ChallengeMeasurement};
use store::{ChallengeStore, NewChallenge};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser, Debug)]
struct Args {
    /// Athlete the list is scoped to.
    #[arg(long, default_value_t = 1)]
    athlete_id: i64,
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: u32,
    /// Free-text title filter.
    #[arg(long, default_value = "")]
    search: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let store = Arc::new(ChallengeStore::new());
    let viewer = AthleteId(args.athlete_id);
    seed(&store, viewer).await;

    let controller = ChallengeListController::new(
        Arc::new(StoreDirectory::new(Arc::clone(&store))),
        viewer,
        args.page_size,
    );
    controller.start().await;

    controller
        .set_filter(ChallengeListFilter {
            text: args.search,
            ..Default::default()
        })
        .await?;
    print_list("initial page", &controller.visible().await);

    // Subscribe after the initial fetch so the next signal is the feed's.
    let mut renders = controller.subscribe_events();

    // A challenge created elsewhere arrives over the push feed.
    store
        .upsert_athlete(Athlete {
            athlete_id: AthleteId(99),
            name: "Sam".to_string(),
            img_url: None,
        })
        .await;
    store
        .create_challenge(NewChallenge {
            title: "Midnight trail run".to_string(),
            description: "Pushed mid-session".to_string(),
            start: Utc::now(),
            end: Utc::now() + Duration::days(7),
            measurement: ChallengeMeasurement::Time,
            activity_types: vec![ActivityType::Run],
            is_private: false,
            created_by: AthleteId(99),
        })
        .await;
    renders.recv().await?;
    print_list("after feed update", &controller.visible().await);

    while controller.has_more().await {
        controller.load_more(&CancellationToken::new()).await?;
    }
    print_list("fully loaded", &controller.visible().await);

    if let Some(newest) = controller.visible().await.first() {
        let names: Vec<String> = store
            .challenge_athletes(newest.challenge_id)
            .await?
            .into_iter()
            .map(|a| a.name)
            .collect();
        println!("== riders in {:?}: {}", newest.title, names.join(", "));
    }

    controller.teardown().await;
    info!("demo finished");
    Ok(())
}

fn print_list(label: &str, challenges: &[Challenge]) {
    println!("== {label} ({} challenges)", challenges.len());
    for challenge in challenges {
        println!(
            "  {}  {:>9?}  {}",
            challenge.start.format("%Y-%m-%d"),
            challenge.measurement,
            challenge.title
        );
    }
}

async fn seed(store: &ChallengeStore, viewer: AthleteId) {
    let teammates = [AthleteId(2), AthleteId(3)];
    for (athlete_id, name) in [(viewer, "Alex"), (teammates[0], "Robin"), (teammates[1], "Kim")] {
        store
            .upsert_athlete(Athlete {
                athlete_id,
                name: name.to_string(),
                img_url: None,
            })
            .await;
    }
    let seeds: [(&str, i64, ChallengeMeasurement, ActivityType); 5] = [
        ("Spring century", 10, ChallengeMeasurement::Distance, ActivityType::Ride),
        ("Everesting month", 20, ChallengeMeasurement::Elevation, ActivityType::Ride),
        ("Hour of power", 3, ChallengeMeasurement::Time, ActivityType::Workout),
        ("Lake crossing", 6, ChallengeMeasurement::Distance, ActivityType::Swim),
        ("Summit week", 1, ChallengeMeasurement::Elevation, ActivityType::Hike),
    ];
    for (i, (title, days_ago, measurement, activity)) in seeds.into_iter().enumerate() {
        let created_by = if i % 2 == 0 { viewer } else { teammates[i % teammates.len()] };
        store
            .create_challenge(NewChallenge {
                title: title.to_string(),
                description: String::new(),
                start: Utc::now() - Duration::days(days_ago),
                end: Utc::now() + Duration::days(30),
                measurement,
                activity_types: vec![activity],
                is_private: false,
                created_by,
            })
            .await;
    }
}
