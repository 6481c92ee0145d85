pub mod car_state;
pub mod cars;
mod race;
pub mod snapshot;
pub mod winners;

use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    api::{EngineApi, GarageApi, RestClient, WinnersApi},
    config::AppConfig,
    error::ServiceError,
};

pub use self::race::{RaceBoard, RaceWinner};
use self::{
    cars::CarsStore,
    snapshot::{
        CARS_NAMESPACE, PersistedCars, PersistedWinners, SnapshotDir, WINNERS_NAMESPACE,
    },
    winners::WinnersStore,
};

pub type SharedState = Arc<AppState>;

/// Central application state: both stores, race bookkeeping and snapshot storage.
pub struct AppState {
    config: AppConfig,
    cars: Arc<CarsStore>,
    winners: Arc<WinnersStore>,
    race: RaceBoard,
    snapshots: SnapshotDir,
}

impl AppState {
    /// Construct the state on top of explicit API implementations.
    pub fn with_apis(
        config: AppConfig,
        engine: Arc<dyn EngineApi>,
        garage: Arc<dyn GarageApi>,
        winners: Arc<dyn WinnersApi>,
    ) -> SharedState {
        let cars = CarsStore::new(engine, garage, config.garage_page_size());
        let winners = WinnersStore::new(winners, config.winners_page_size());
        let snapshots = SnapshotDir::new(config.snapshot_dir().clone());
        Arc::new(Self {
            config,
            cars: Arc::new(cars),
            winners: Arc::new(winners),
            race: RaceBoard::new(),
            snapshots,
        })
    }

    /// Construct the state talking to the REST API named in `config`.
    pub fn connect(config: AppConfig) -> Result<SharedState, ServiceError> {
        let client = Arc::new(RestClient::new(config.api_url(), config.request_timeout())?);
        Ok(Self::with_apis(config, client.clone(), client.clone(), client))
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Garage cache and car runtime flags.
    pub fn cars(&self) -> &Arc<CarsStore> {
        &self.cars
    }

    /// Leaderboard cache and winner recorder.
    pub fn winners(&self) -> &Arc<WinnersStore> {
        &self.winners
    }

    /// Race bookkeeping.
    pub fn race(&self) -> &RaceBoard {
        &self.race
    }

    /// Snapshot storage.
    pub fn snapshots(&self) -> &SnapshotDir {
        &self.snapshots
    }

    /// Load both namespaces into the stores.
    ///
    /// A missing namespace is skipped; an unreadable one is logged and skipped so
    /// the other namespace still loads.
    pub async fn restore_snapshots(&self) {
        match self.snapshots.load::<PersistedCars>(CARS_NAMESPACE).await {
            Ok(Some(persisted)) => {
                info!(
                    cars = persisted.cars.len(),
                    page = persisted.page,
                    "restored garage snapshot"
                );
                self.cars.restore(persisted);
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, "ignoring unreadable garage snapshot"),
        }

        match self
            .snapshots
            .load::<PersistedWinners>(WINNERS_NAMESPACE)
            .await
        {
            Ok(Some(persisted)) => {
                info!(
                    winners = persisted.winners.len(),
                    page = persisted.page,
                    "restored leaderboard snapshot"
                );
                self.winners.restore(persisted);
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, "ignoring unreadable leaderboard snapshot"),
        }
    }

    /// Write both namespaces now.
    pub async fn persist_snapshots(&self) -> Result<(), ServiceError> {
        self.snapshots
            .save(CARS_NAMESPACE, &self.cars.persisted())
            .await?;
        self.snapshots
            .save(WINNERS_NAMESPACE, &self.winners.persisted())
            .await?;
        Ok(())
    }
}
