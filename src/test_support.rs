//! In-memory stand-ins for the race API used by unit tests.

use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

use futures::future::BoxFuture;
use reqwest::StatusCode;

use crate::{
    api::{
        ApiError, ApiResult, Car, CarId, CarInput, DriveOutcome, EngineApi, EngineStatus,
        GarageApi, Winner, WinnerUpdate, WinnersApi,
    },
    config::AppConfig,
    state::{AppState, SharedState},
};

pub fn car(id: CarId) -> Car {
    Car {
        id,
        name: format!("Car {id}"),
        color: "#ff0000".into(),
    }
}

/// Shared state over in-memory APIs, snapshotting into a fresh scratch directory.
pub fn test_state(engine: FakeEngine, garage: MemoryGarage, winners: MemoryWinners) -> SharedState {
    let dir = std::env::temp_dir().join(format!("async-race-test-{}", uuid::Uuid::new_v4()));
    test_state_in(&dir, engine, garage, winners)
}

/// Shared state over in-memory APIs, snapshotting into `dir`.
pub fn test_state_in(
    dir: &Path,
    engine: FakeEngine,
    garage: MemoryGarage,
    winners: MemoryWinners,
) -> SharedState {
    let config = AppConfig::default().with_endpoints("http://127.0.0.1:0", dir.to_path_buf());
    AppState::with_apis(config, Arc::new(engine), Arc::new(garage), Arc::new(winners))
}

fn status_error(path: String, status: StatusCode) -> ApiError {
    ApiError::Status { path, status }
}

#[derive(Clone, Default)]
struct EngineScript {
    status: Option<EngineStatus>,
    start_delay: Duration,
    drive_success: bool,
    drive_delay: Duration,
    fail_drive: bool,
    fail_stop: bool,
}

#[derive(Default)]
struct EngineLog {
    starts: Vec<CarId>,
    drives: Vec<CarId>,
    stops: Vec<CarId>,
}

/// Scripted engine endpoint.
#[derive(Clone, Default)]
pub struct FakeEngine {
    scripts: Arc<Mutex<HashMap<CarId, EngineScript>>>,
    log: Arc<Mutex<EngineLog>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(self, id: CarId, f: impl FnOnce(&mut EngineScript)) -> Self {
        {
            let mut scripts = self.scripts.lock().unwrap();
            f(scripts.entry(id).or_default());
        }
        self
    }

    pub fn with_car(self, id: CarId, velocity: f64, distance: f64, drive_success: bool) -> Self {
        self.script(id, |script| {
            script.status = Some(EngineStatus { velocity, distance });
            script.drive_success = drive_success;
        })
    }

    pub fn with_failing_start(self, id: CarId) -> Self {
        self.script(id, |script| script.status = None)
    }

    pub fn with_failing_drive(self, id: CarId) -> Self {
        self.script(id, |script| script.fail_drive = true)
    }

    pub fn with_failing_stop(self, id: CarId) -> Self {
        self.script(id, |script| script.fail_stop = true)
    }

    pub fn with_start_delay(self, id: CarId, delay: Duration) -> Self {
        self.script(id, |script| script.start_delay = delay)
    }

    pub fn with_drive_delay(self, id: CarId, delay: Duration) -> Self {
        self.script(id, |script| script.drive_delay = delay)
    }

    pub fn starts(&self) -> Vec<CarId> {
        self.log.lock().unwrap().starts.clone()
    }

    pub fn drives(&self) -> Vec<CarId> {
        self.log.lock().unwrap().drives.clone()
    }

    pub fn stops(&self) -> Vec<CarId> {
        self.log.lock().unwrap().stops.clone()
    }

    fn lookup(&self, id: CarId) -> EngineScript {
        self.scripts
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }
}

impl EngineApi for FakeEngine {
    fn start_engine(&self, id: CarId) -> BoxFuture<'static, ApiResult<EngineStatus>> {
        self.log.lock().unwrap().starts.push(id);
        let script = self.lookup(id);
        Box::pin(async move {
            if !script.start_delay.is_zero() {
                tokio::time::sleep(script.start_delay).await;
            }
            script
                .status
                .ok_or_else(|| status_error(format!("engine?id={id}"), StatusCode::NOT_FOUND))
        })
    }

    fn stop_engine(&self, id: CarId) -> BoxFuture<'static, ApiResult<EngineStatus>> {
        self.log.lock().unwrap().stops.push(id);
        let script = self.lookup(id);
        Box::pin(async move {
            if script.fail_stop {
                return Err(status_error(
                    format!("engine?id={id}"),
                    StatusCode::INTERNAL_SERVER_ERROR,
                ));
            }
            Ok(EngineStatus {
                velocity: 0.0,
                distance: script.status.map(|s| s.distance).unwrap_or_default(),
            })
        })
    }

    fn drive(&self, id: CarId) -> BoxFuture<'static, ApiResult<DriveOutcome>> {
        self.log.lock().unwrap().drives.push(id);
        let script = self.lookup(id);
        Box::pin(async move {
            if !script.drive_delay.is_zero() {
                tokio::time::sleep(script.drive_delay).await;
            }
            if script.fail_drive {
                return Err(status_error(
                    format!("engine?id={id}"),
                    StatusCode::INTERNAL_SERVER_ERROR,
                ));
            }
            Ok(DriveOutcome {
                success: script.drive_success,
            })
        })
    }
}

/// Garage kept in a vector, paginated like the mock API.
#[derive(Clone, Default)]
pub struct MemoryGarage {
    cars: Arc<Mutex<Vec<Car>>>,
}

impl MemoryGarage {
    pub fn with_cars(cars: Vec<Car>) -> Self {
        Self {
            cars: Arc::new(Mutex::new(cars)),
        }
    }

    pub fn cars(&self) -> Vec<Car> {
        self.cars.lock().unwrap().clone()
    }
}

fn paginate<T: Clone>(items: &[T], page: u32, limit: u32) -> Vec<T> {
    let start = (page.saturating_sub(1) * limit) as usize;
    items
        .iter()
        .skip(start)
        .take(limit as usize)
        .cloned()
        .collect()
}

impl GarageApi for MemoryGarage {
    fn list_cars(&self, page: u32, limit: u32) -> BoxFuture<'static, ApiResult<Vec<Car>>> {
        let page = paginate(&self.cars.lock().unwrap(), page, limit);
        Box::pin(async move { Ok(page) })
    }

    fn count_cars(&self) -> BoxFuture<'static, ApiResult<usize>> {
        let count = self.cars.lock().unwrap().len();
        Box::pin(async move { Ok(count) })
    }

    fn create_car(&self, input: CarInput) -> BoxFuture<'static, ApiResult<Car>> {
        let mut cars = self.cars.lock().unwrap();
        let id = cars.iter().map(|car| car.id).max().unwrap_or(0) + 1;
        let car = Car {
            id,
            name: input.name,
            color: input.color,
        };
        cars.push(car.clone());
        Box::pin(async move { Ok(car) })
    }

    fn update_car(&self, id: CarId, input: CarInput) -> BoxFuture<'static, ApiResult<Car>> {
        let mut cars = self.cars.lock().unwrap();
        let result = match cars.iter_mut().find(|car| car.id == id) {
            Some(car) => {
                car.name = input.name;
                car.color = input.color;
                Ok(car.clone())
            }
            None => Err(status_error(format!("garage/{id}"), StatusCode::NOT_FOUND)),
        };
        Box::pin(async move { result })
    }

    fn delete_car(&self, id: CarId) -> BoxFuture<'static, ApiResult<()>> {
        let mut cars = self.cars.lock().unwrap();
        let before = cars.len();
        cars.retain(|car| car.id != id);
        let result = if cars.len() < before {
            Ok(())
        } else {
            Err(status_error(format!("garage/{id}"), StatusCode::NOT_FOUND))
        };
        Box::pin(async move { result })
    }
}

/// Winners table kept in a vector.
#[derive(Clone, Default)]
pub struct MemoryWinners {
    winners: Arc<Mutex<Vec<Winner>>>,
    writes: Arc<Mutex<usize>>,
}

impl MemoryWinners {
    pub fn with_winners(winners: Vec<Winner>) -> Self {
        Self {
            winners: Arc::new(Mutex::new(winners)),
            ..Default::default()
        }
    }

    pub fn winners(&self) -> Vec<Winner> {
        self.winners.lock().unwrap().clone()
    }

    pub fn get(&self, id: CarId) -> Option<Winner> {
        self.winners
            .lock()
            .unwrap()
            .iter()
            .find(|winner| winner.id == id)
            .cloned()
    }

    /// Number of create/update calls received.
    pub fn writes(&self) -> usize {
        *self.writes.lock().unwrap()
    }
}

impl WinnersApi for MemoryWinners {
    fn list_winners(&self, page: u32, limit: u32) -> BoxFuture<'static, ApiResult<Vec<Winner>>> {
        let page = paginate(&self.winners.lock().unwrap(), page, limit);
        Box::pin(async move { Ok(page) })
    }

    fn count_winners(&self) -> BoxFuture<'static, ApiResult<usize>> {
        let count = self.winners.lock().unwrap().len();
        Box::pin(async move { Ok(count) })
    }

    fn find_winner(&self, id: CarId) -> BoxFuture<'static, ApiResult<Option<Winner>>> {
        let found = self.get(id);
        Box::pin(async move { Ok(found) })
    }

    fn create_winner(&self, winner: Winner) -> BoxFuture<'static, ApiResult<Winner>> {
        *self.writes.lock().unwrap() += 1;
        let mut winners = self.winners.lock().unwrap();
        let result = if winners.iter().any(|existing| existing.id == winner.id) {
            Err(status_error("winners".into(), StatusCode::INTERNAL_SERVER_ERROR))
        } else {
            winners.push(winner.clone());
            Ok(winner)
        };
        Box::pin(async move { result })
    }

    fn update_winner(
        &self,
        id: CarId,
        update: WinnerUpdate,
    ) -> BoxFuture<'static, ApiResult<Winner>> {
        *self.writes.lock().unwrap() += 1;
        let mut winners = self.winners.lock().unwrap();
        let result = match winners.iter_mut().find(|winner| winner.id == id) {
            Some(winner) => {
                winner.wins = update.wins;
                winner.time = update.time;
                Ok(winner.clone())
            }
            None => Err(status_error(format!("winners/{id}"), StatusCode::NOT_FOUND)),
        };
        Box::pin(async move { result })
    }

    fn delete_winner(&self, id: CarId) -> BoxFuture<'static, ApiResult<()>> {
        let mut winners = self.winners.lock().unwrap();
        let before = winners.len();
        winners.retain(|winner| winner.id != id);
        let result = if winners.len() < before {
            Ok(())
        } else {
            Err(status_error(format!("winners/{id}"), StatusCode::NOT_FOUND))
        };
        Box::pin(async move { result })
    }
}
