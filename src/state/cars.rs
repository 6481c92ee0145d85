//! Garage cache and per-car runtime flags, shared by every race flow and observer.

use std::{collections::HashMap, sync::Arc};

use futures::future::join_all;
use indexmap::IndexMap;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, warn};
use validator::Validate;

use crate::{
    api::{Car, CarId, CarInput, DriveOutcome, EngineApi, EngineStatus, GarageApi},
    error::ServiceError,
    state::{
        car_state::{CarRuntimeState, CarStatePatch},
        snapshot::PersistedCars,
    },
};

/// Immutable view of the cars store handed to readers.
#[derive(Debug, Clone, PartialEq)]
pub struct CarsSnapshot {
    /// Cars of the current page, in API order.
    pub cars: IndexMap<CarId, Car>,
    /// Runtime flags by car id; missing entries are idle.
    pub car_states: HashMap<CarId, CarRuntimeState>,
    /// Car picked for editing.
    pub selected_car: Option<Car>,
    /// Current page (1-based).
    pub page: u32,
    /// Total number of cars in the garage.
    pub total: usize,
    /// A garage request is in flight.
    pub loading: bool,
    /// Bumped whenever a car's run starts over or is reset; late results of an
    /// older run are dropped.
    epochs: HashMap<CarId, u64>,
}

/// An engine start accepted for run `epoch` of a car.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineStart {
    /// Speed parameters returned by the engine.
    pub status: EngineStatus,
    /// Run the start belongs to; later writes for the car are conditioned on it.
    pub epoch: u64,
}

impl Default for CarsSnapshot {
    fn default() -> Self {
        Self {
            cars: IndexMap::new(),
            car_states: HashMap::new(),
            selected_car: None,
            page: 1,
            total: 0,
            loading: false,
            epochs: HashMap::new(),
        }
    }
}

impl CarsSnapshot {
    /// Runtime flags of a car, idle when never touched.
    pub fn car_state(&self, id: CarId) -> CarRuntimeState {
        self.car_states.get(&id).copied().unwrap_or_default()
    }

    /// Number of pages for the given page size (at least one).
    pub fn page_count(&self, page_size: u32) -> u32 {
        let page_size = page_size.max(1) as usize;
        self.total.div_ceil(page_size).max(1) as u32
    }

    fn persisted(&self) -> PersistedCars {
        PersistedCars {
            cars: self.cars.values().cloned().collect(),
            car_states: self
                .car_states
                .iter()
                .map(|(id, state)| (*id, *state))
                .collect(),
            page: self.page,
            total: self.total,
            selected_car: self.selected_car.clone(),
        }
    }
}

impl From<PersistedCars> for CarsSnapshot {
    fn from(value: PersistedCars) -> Self {
        Self {
            cars: value.cars.into_iter().map(|car| (car.id, car)).collect(),
            car_states: value.car_states.into_iter().collect(),
            selected_car: value.selected_car,
            page: value.page.max(1),
            total: value.total,
            loading: false,
            epochs: HashMap::new(),
        }
    }
}

/// Process-wide store for the garage page and every car's runtime flags.
///
/// Every mutation goes through [`CarsStore::update`], which applies the change to the
/// latest committed snapshot and notifies subscribers.
pub struct CarsStore {
    engine: Arc<dyn EngineApi>,
    garage: Arc<dyn GarageApi>,
    state: watch::Sender<CarsSnapshot>,
    page_size: u32,
}

impl CarsStore {
    /// Build an empty store on top of the engine and garage endpoints.
    pub fn new(engine: Arc<dyn EngineApi>, garage: Arc<dyn GarageApi>, page_size: u32) -> Self {
        let (state, _rx) = watch::channel(CarsSnapshot::default());
        Self {
            engine,
            garage,
            state,
            page_size: page_size.max(1),
        }
    }

    /// Number of cars per garage page.
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Receive every subsequent snapshot.
    pub fn subscribe(&self) -> watch::Receiver<CarsSnapshot> {
        self.state.subscribe()
    }

    /// Stream of snapshots, emitted on each change.
    pub fn changes(&self) -> WatchStream<CarsSnapshot> {
        WatchStream::from_changes(self.state.subscribe())
    }

    /// Copy of the latest committed snapshot.
    pub fn snapshot(&self) -> CarsSnapshot {
        self.state.borrow().clone()
    }

    /// Cars of the current page, in display order.
    pub fn cars(&self) -> Vec<Car> {
        self.state.borrow().cars.values().cloned().collect()
    }

    /// Live runtime flags of a car.
    pub fn car_state(&self, id: CarId) -> CarRuntimeState {
        self.state.borrow().car_state(id)
    }

    /// Single mutation entry point: `f` runs against the latest committed snapshot.
    fn update(&self, f: impl FnOnce(&mut CarsSnapshot)) {
        self.state.send_modify(f);
    }

    /// Merge a partial update into a car's flags, creating idle defaults when absent.
    pub fn set_car_state(&self, id: CarId, patch: CarStatePatch) {
        self.update(|snapshot| snapshot.car_states.entry(id).or_default().apply(patch));
    }

    /// Current run epoch of a car.
    pub fn car_epoch(&self, id: CarId) -> u64 {
        self.state.borrow().epochs.get(&id).copied().unwrap_or_default()
    }

    /// Merge a patch only if the car is still in run `epoch`; returns whether it applied.
    pub fn set_car_state_if(&self, id: CarId, epoch: u64, patch: CarStatePatch) -> bool {
        let mut applied = false;
        self.update(|snapshot| {
            if snapshot.epochs.get(&id).copied().unwrap_or_default() == epoch {
                snapshot.car_states.entry(id).or_default().apply(patch);
                applied = true;
            }
        });
        applied
    }

    /// Mark a car finished if it is still in run `epoch` and was not seen broken.
    pub fn mark_finished(&self, id: CarId, epoch: u64) -> bool {
        let mut finished = false;
        self.update(|snapshot| {
            if snapshot.epochs.get(&id).copied().unwrap_or_default() != epoch {
                return;
            }
            let state = snapshot.car_states.entry(id).or_default();
            if !state.is_broken {
                state.apply(CarStatePatch::finished());
                finished = true;
            }
        });
        finished
    }

    /// Reset a car's flags to idle and drop the late effects of its current run.
    pub fn reset_car_state(&self, id: CarId) -> u64 {
        let mut epoch = 0;
        self.update(|snapshot| {
            let next = snapshot.epochs.entry(id).or_default();
            *next += 1;
            epoch = *next;
            snapshot
                .car_states
                .entry(id)
                .or_default()
                .apply(CarStatePatch::idle());
        });
        epoch
    }

    /// Start a car's engine and mark it running.
    ///
    /// On failure the running flag is cleared and the error is returned. `None`
    /// means the car was reset while the request was in flight: it stays idle
    /// and the run must not go on.
    pub async fn start_car_engine(&self, id: CarId) -> Result<Option<EngineStart>, ServiceError> {
        let epoch = self.reset_car_state(id);

        match self.engine.start_engine(id).await {
            Ok(status) => {
                if self.set_car_state_if(id, epoch, CarStatePatch::running_only(true)) {
                    Ok(Some(EngineStart { status, epoch }))
                } else {
                    debug!(car_id = id, "car reset during engine start");
                    Ok(None)
                }
            }
            Err(err) => {
                debug!(car_id = id, error = %err, "engine start failed");
                self.set_car_state_if(id, epoch, CarStatePatch::running_only(false));
                Err(err.into())
            }
        }
    }

    /// Whether `epoch` is still the car's current run.
    pub fn is_current_run(&self, id: CarId, epoch: u64) -> bool {
        self.car_epoch(id) == epoch
    }

    /// Stop a car's engine, then reset its flags to idle.
    pub async fn stop_car_engine(&self, id: CarId) -> Result<(), ServiceError> {
        self.engine.stop_engine(id).await?;
        self.reset_car_state(id);
        Ok(())
    }

    /// Put a car in drive mode.
    ///
    /// A declared failure or an error marks the car broken; a success is returned
    /// untouched since finishing also depends on the elapsed travel time. Flags are
    /// only written while the car is still in run `epoch`.
    pub async fn drive_car(&self, id: CarId, epoch: u64) -> Result<DriveOutcome, ServiceError> {
        match self.engine.drive(id).await {
            Ok(outcome) => {
                if !outcome.success {
                    self.set_car_state_if(id, epoch, CarStatePatch::broken());
                }
                Ok(outcome)
            }
            Err(err) => {
                debug!(car_id = id, error = %err, "drive request failed");
                self.set_car_state_if(id, epoch, CarStatePatch::broken());
                Err(err.into())
            }
        }
    }

    /// Select (or clear) the car being edited.
    pub fn select_car(&self, car: Option<Car>) {
        self.update(|snapshot| snapshot.selected_car = car);
    }

    /// Move to another page without fetching it.
    pub fn set_page(&self, page: u32) {
        self.update(|snapshot| snapshot.page = page.max(1));
    }

    /// Load a page of cars and the garage total.
    pub async fn fetch_cars(&self, page: u32, limit: u32) -> Result<(), ServiceError> {
        self.update(|snapshot| snapshot.loading = true);
        let result = self.load_page(page.max(1), limit).await;
        self.update(|snapshot| snapshot.loading = false);
        result
    }

    /// Reload the current page.
    pub async fn refresh(&self) -> Result<(), ServiceError> {
        let page = self.state.borrow().page;
        self.fetch_cars(page, self.page_size).await
    }

    async fn load_page(&self, page: u32, limit: u32) -> Result<(), ServiceError> {
        let cars = self.garage.list_cars(page, limit).await?;
        let total = self.garage.count_cars().await?;
        self.update(|snapshot| {
            snapshot.cars = cars.into_iter().map(|car| (car.id, car)).collect();
            snapshot.total = total;
            snapshot.page = page;
        });
        Ok(())
    }

    /// Create a car, or update it when `id` is given, then clear the selection.
    pub async fn save_car(&self, input: CarInput, id: Option<CarId>) -> Result<Car, ServiceError> {
        input.validate()?;
        self.update(|snapshot| snapshot.loading = true);

        let result = match id {
            Some(id) => self.update_car(id, input).await,
            None => self.create_car(input).await,
        };

        self.update(|snapshot| {
            snapshot.loading = false;
            snapshot.selected_car = None;
        });
        result
    }

    async fn update_car(&self, id: CarId, input: CarInput) -> Result<Car, ServiceError> {
        let updated = self.garage.update_car(id, input).await?;
        let cached = updated.clone();
        self.update(|snapshot| {
            if let Some(car) = snapshot.cars.get_mut(&id) {
                *car = cached;
            }
            if snapshot.selected_car.as_ref().is_some_and(|car| car.id == id) {
                snapshot.selected_car = None;
            }
        });
        Ok(updated)
    }

    async fn create_car(&self, input: CarInput) -> Result<Car, ServiceError> {
        let created = self.garage.create_car(input).await?;
        let page = self.state.borrow().page;
        self.load_page(page, self.page_size).await?;
        Ok(created)
    }

    /// Create many cars concurrently, returning how many were stored.
    ///
    /// Individual failures are logged; the page is reloaded from the first page afterwards.
    pub async fn create_cars(&self, inputs: Vec<CarInput>) -> Result<usize, ServiceError> {
        for input in &inputs {
            input.validate()?;
        }

        self.update(|snapshot| snapshot.loading = true);
        let results = join_all(inputs.into_iter().map(|input| self.garage.create_car(input))).await;
        let created = results
            .into_iter()
            .filter(|result| match result {
                Ok(_) => true,
                Err(err) => {
                    warn!(error = %err, "failed to create generated car");
                    false
                }
            })
            .count();

        let reload = self.load_page(1, self.page_size).await;
        self.update(|snapshot| snapshot.loading = false);
        reload.map(|_| created)
    }

    /// Delete a car and reload the page, stepping back when its page became empty.
    pub async fn remove_car(&self, id: CarId) -> Result<(), ServiceError> {
        self.update(|snapshot| snapshot.loading = true);
        let result = self.delete_car(id).await;
        self.update(|snapshot| snapshot.loading = false);
        result
    }

    async fn delete_car(&self, id: CarId) -> Result<(), ServiceError> {
        let was_last_on_page = self.state.borrow().cars.len() == 1;
        self.garage.delete_car(id).await?;

        let mut page = 1;
        self.update(|snapshot| {
            snapshot.cars.shift_remove(&id);
            snapshot.car_states.remove(&id);
            snapshot.total = snapshot.total.saturating_sub(1);
            if snapshot.selected_car.as_ref().is_some_and(|car| car.id == id) {
                snapshot.selected_car = None;
            }
            if was_last_on_page && snapshot.page > 1 {
                snapshot.page -= 1;
            }
            page = snapshot.page;
        });

        self.load_page(page, self.page_size).await
    }

    /// Replace the store content with a persisted snapshot.
    pub fn restore(&self, persisted: PersistedCars) {
        let restored = CarsSnapshot::from(persisted);
        self.update(|snapshot| *snapshot = restored);
    }

    /// Persistable part of the current snapshot.
    pub fn persisted(&self) -> PersistedCars {
        self.state.borrow().persisted()
    }
}
