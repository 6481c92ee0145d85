//! async-race binary: races the cars of the current garage page against the race API.

use std::{env, sync::Arc};

use anyhow::{Context, bail};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use async_race::{
    config::AppConfig,
    services::{
        garage_service::{self, DEFAULT_BATCH},
        motion::{CarMotionController, HeadlessSink},
        race_service, storage_supervisor,
    },
    state::{AppState, SharedState},
};

#[derive(Debug, PartialEq)]
enum Command {
    Race,
    Generate(usize),
    Winners,
    Reset,
}

fn parse_command(mut args: impl Iterator<Item = String>) -> anyhow::Result<Command> {
    let command = match args.next().as_deref() {
        None | Some("race") => Command::Race,
        Some("generate") => match args.next() {
            Some(count) => Command::Generate(
                count
                    .parse()
                    .with_context(|| format!("invalid car count `{count}`"))?,
            ),
            None => Command::Generate(DEFAULT_BATCH),
        },
        Some("winners") => Command::Winners,
        Some("reset") => Command::Reset,
        Some(other) => {
            bail!("unknown command `{other}` (expected race, generate [n], winners or reset)")
        }
    };
    Ok(command)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let command = parse_command(env::args().skip(1))?;
    let config = AppConfig::load();
    let state = AppState::connect(config).context("building race API client")?;
    state.restore_snapshots().await;
    let supervisor = storage_supervisor::spawn(state.clone());

    let outcome = match command {
        Command::Race => race(&state).await,
        Command::Generate(count) => generate(&state, count).await,
        Command::Winners => winners(&state).await,
        Command::Reset => reset(&state).await,
    };

    supervisor.abort();
    state
        .persist_snapshots()
        .await
        .context("writing local snapshots")?;
    outcome
}

async fn race(state: &SharedState) -> anyhow::Result<()> {
    state.cars().refresh().await.context("loading garage")?;
    let geometry = state.config().track();
    for car in state.cars().cars() {
        state.race().attach(Arc::new(CarMotionController::new(
            car.id,
            state.cars().clone(),
            Arc::new(HeadlessSink::new(geometry)),
        )));
    }

    tokio::select! {
        result = race_service::start_race(state) => {
            match result.context("running race")? {
                Some(winner) => info!(
                    car_id = winner.id,
                    name = %winner.name,
                    time = winner.time,
                    "winner"
                ),
                None => info!("no winner"),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted; resetting the track");
            race_service::reset_race(state).await;
        }
    }
    Ok(())
}

async fn generate(state: &SharedState, count: usize) -> anyhow::Result<()> {
    let created = garage_service::generate_random_cars(state, count)
        .await
        .context("generating cars")?;
    let snapshot = state.cars().snapshot();
    info!(
        created,
        total = snapshot.total,
        pages = snapshot.page_count(state.cars().page_size()),
        "garage updated"
    );
    Ok(())
}

async fn winners(state: &SharedState) -> anyhow::Result<()> {
    state
        .winners()
        .refresh()
        .await
        .context("loading leaderboard")?;
    let snapshot = state.winners().snapshot();
    info!(page = snapshot.page, total = snapshot.total, "leaderboard");
    for (rank, winner) in snapshot.winners.iter().enumerate() {
        info!(
            rank = rank + 1,
            car_id = winner.id,
            wins = winner.wins,
            best_time = winner.time,
            "winner"
        );
    }
    Ok(())
}

async fn reset(state: &SharedState) -> anyhow::Result<()> {
    state.cars().refresh().await.context("loading garage")?;
    race_service::reset_race(state).await;
    Ok(())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> impl Iterator<Item = String> {
        values
            .iter()
            .map(|value| value.to_string())
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn race_is_the_default_command() {
        assert_eq!(parse_command(args(&[])).unwrap(), Command::Race);
        assert_eq!(
            parse_command(args(&["generate"])).unwrap(),
            Command::Generate(DEFAULT_BATCH)
        );
        assert_eq!(
            parse_command(args(&["generate", "12"])).unwrap(),
            Command::Generate(12)
        );
        assert!(parse_command(args(&["generate", "many"])).is_err());
        assert!(parse_command(args(&["fly"])).is_err());
    }
}
