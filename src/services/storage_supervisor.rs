use serde::Serialize;
use tokio::{
    task::JoinHandle,
    time::{Instant, sleep_until},
};
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use crate::state::{
    SharedState,
    snapshot::{CARS_NAMESPACE, SnapshotDir, WINNERS_NAMESPACE},
};

/// A burst of changes never holds a write back longer than this many debounce periods.
const MAX_DEFERRAL: u32 = 8;

/// Follow both stores and write their snapshots once changes settle.
///
/// The stores are subscribed before this returns, so no change made afterwards is missed.
pub fn spawn(state: SharedState) -> JoinHandle<()> {
    let mut cars = state.cars().changes();
    let mut winners = state.winners().changes();

    tokio::spawn(async move {
        let debounce = state.config().persist_debounce();
        let mut saved_cars = state.cars().persisted();
        let mut saved_winners = state.winners().persisted();

        loop {
            let changed = tokio::select! {
                next = cars.next() => next.is_some(),
                next = winners.next() => next.is_some(),
            };
            if !changed {
                break;
            }

            let hard_deadline = Instant::now() + debounce * MAX_DEFERRAL;
            let mut quiet_deadline = Instant::now() + debounce;
            loop {
                tokio::select! {
                    _ = sleep_until(quiet_deadline.min(hard_deadline)) => break,
                    Some(_) = cars.next() => quiet_deadline = Instant::now() + debounce,
                    Some(_) = winners.next() => quiet_deadline = Instant::now() + debounce,
                }
            }

            let current = state.cars().persisted();
            if current != saved_cars && save(state.snapshots(), CARS_NAMESPACE, &current).await {
                saved_cars = current;
            }
            let current = state.winners().persisted();
            if current != saved_winners
                && save(state.snapshots(), WINNERS_NAMESPACE, &current).await
            {
                saved_winners = current;
            }
        }

        debug!("store channels closed; snapshot supervisor stopped");
    })
}

async fn save<T: Serialize>(snapshots: &SnapshotDir, namespace: &'static str, value: &T) -> bool {
    match snapshots.save(namespace, value).await {
        Ok(()) => {
            debug!(namespace, "snapshot written");
            true
        }
        Err(err) => {
            warn!(namespace, error = %err, "failed to write snapshot; will retry on next change");
            false
        }
    }
}
