use std::collections::BTreeSet;

use futures::future::join_all;
use serde::Serialize;
use tokio::time::sleep;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::{
    api::{Car, CarId},
    error::ServiceError,
    services::motion::DriveVerdict,
    state::{RaceWinner, SharedState},
};

/// Settled result of one car in a race.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RaceResult {
    /// Car id.
    pub id: CarId,
    /// Travel time in seconds; zero for non-finishers.
    pub time: f64,
    /// Whether the car finished.
    pub success: bool,
}

impl RaceResult {
    fn finished(id: CarId, time: f64) -> Self {
        Self {
            id,
            time,
            success: true,
        }
    }

    fn dnf(id: CarId) -> Self {
        Self {
            id,
            time: 0.0,
            success: false,
        }
    }
}

/// Fastest finisher; on equal times the earliest entry wins.
pub fn pick_winner(results: &[RaceResult]) -> Option<RaceResult> {
    let mut finishers: Vec<&RaceResult> =
        results.iter().filter(|result| result.success).collect();
    finishers.sort_by(|a, b| a.time.total_cmp(&b.time));
    finishers.first().map(|result| **result)
}

/// Race every car of the current garage page and record the winner.
///
/// Returns `None` when the page is empty, when no car finished or when the race
/// was reset before it settled.
pub async fn start_race(state: &SharedState) -> Result<Option<RaceWinner>, ServiceError> {
    let Some(_racing) = state.race().begin() else {
        return Err(ServiceError::InvalidState(
            "a race is already in progress".into(),
        ));
    };

    let race_id = Uuid::new_v4();
    run_race(state)
        .instrument(info_span!("race", %race_id))
        .await
}

async fn run_race(state: &SharedState) -> Result<Option<RaceWinner>, ServiceError> {
    let cars = state.cars().cars();
    if cars.is_empty() {
        info!("no cars on the track");
        return Ok(None);
    }

    let generation = state.race().epoch();
    state.race().announce(None);
    info!(cars = cars.len(), "race started");

    let results = join_all(cars.iter().map(|car| run_car(state, car.id))).await;

    if state.race().epoch() != generation {
        info!("race was reset before it settled");
        return Ok(None);
    }

    let Some(best) = pick_winner(&results) else {
        info!("no car finished the race");
        return Ok(None);
    };

    let winner = RaceWinner {
        id: best.id,
        name: car_name(&cars, best.id),
        time: best.time,
    };
    info!(car_id = winner.id, time = winner.time, name = %winner.name, "race won");

    if let Err(err) = state.winners().save_winner(winner.id, winner.time).await {
        warn!(car_id = winner.id, error = %err, "failed to record race winner");
    }

    state.race().announce(Some(winner.clone()));
    Ok(Some(winner))
}

fn car_name(cars: &[Car], id: CarId) -> String {
    cars.iter()
        .find(|car| car.id == id)
        .map(|car| car.name.clone())
        .unwrap_or_default()
}

/// One car's branch of the race; failures become a non-finisher result.
async fn run_car(state: &SharedState, id: CarId) -> RaceResult {
    let cars = state.cars();
    let start = match cars.start_car_engine(id).await {
        Ok(Some(start)) => start,
        Ok(None) => return RaceResult::dnf(id),
        Err(err) => {
            warn!(car_id = id, error = %err, "engine did not start");
            return RaceResult::dnf(id);
        }
    };
    let (status, epoch) = (start.status, start.epoch);
    let time = status.duration_secs();
    let travel = match state.race().controller(id) {
        Some(controller) => match controller.launch(&start) {
            Some(travel) => Some((travel, controller)),
            None => return RaceResult::dnf(id),
        },
        None if !cars.is_current_run(id, epoch) => return RaceResult::dnf(id),
        None => None,
    };

    let drive = async {
        let outcome = cars.drive_car(id, epoch).await;
        if let Some((travel, controller)) = &travel {
            let verdict = DriveVerdict::from(&outcome);
            let (travel, controller) = (*travel, controller.clone());
            tokio::spawn(async move {
                controller.present_drive(&travel, verdict).await;
            });
        }
        outcome
    };
    let (outcome, ()) = tokio::join!(drive, sleep(status.duration()));

    match outcome {
        Ok(outcome) if outcome.success => {
            if cars.mark_finished(id, epoch) {
                debug!(car_id = id, time, "car finished");
                RaceResult::finished(id, time)
            } else {
                debug!(car_id = id, "car was not running at settlement");
                RaceResult::dnf(id)
            }
        }
        Ok(_) => {
            debug!(car_id = id, "car broke down");
            RaceResult::dnf(id)
        }
        Err(err) => {
            warn!(car_id = id, error = %err, "drive request failed");
            RaceResult::dnf(id)
        }
    }
}

/// Put every car back on the start line and hide the winner.
///
/// Engines are stopped concurrently and on a best-effort basis; late results of
/// the interrupted race are ignored.
pub async fn reset_race(state: &SharedState) {
    state.race().bump_epoch();

    let ids: BTreeSet<CarId> = state
        .cars()
        .cars()
        .iter()
        .map(|car| car.id)
        .chain(state.race().controlled_cars())
        .collect();

    reset_cars(state, &ids);

    let stops = join_all(ids.iter().map(|id| state.cars().stop_car_engine(*id))).await;
    for (id, result) in ids.iter().zip(stops) {
        if let Err(err) = result {
            debug!(car_id = id, error = %err, "engine stop failed during reset");
        }
    }

    reset_cars(state, &ids);
    state.race().announce(None);
    info!(cars = ids.len(), "race reset");
}

fn reset_cars(state: &SharedState, ids: &BTreeSet<CarId>) {
    for id in ids {
        match state.race().controller(*id) {
            Some(controller) => controller.reset(),
            None => {
                state.cars().reset_car_state(*id);
            }
        }
    }
}
