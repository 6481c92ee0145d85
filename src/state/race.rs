use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::watch;

use crate::{api::CarId, services::motion::CarMotionController};

/// Winner announced at the end of a race.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RaceWinner {
    /// Winning car.
    pub id: CarId,
    /// Car name at race time.
    pub name: String,
    /// Travel time in seconds.
    pub time: f64,
}

/// Race bookkeeping carved out from [`super::AppState`]: the motion controller
/// registry, the announced winner and the in-progress guard.
pub struct RaceBoard {
    motion: DashMap<CarId, Arc<CarMotionController>>,
    winner: watch::Sender<Option<RaceWinner>>,
    racing: AtomicBool,
    epoch: AtomicU64,
}

impl RaceBoard {
    /// Empty board: no controllers, no winner, no race.
    pub fn new() -> Self {
        let (winner, _rx) = watch::channel(None);
        Self {
            motion: DashMap::new(),
            winner,
            racing: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
        }
    }

    /// Register the controller rendering a car, replacing any previous one.
    pub fn attach(&self, controller: Arc<CarMotionController>) {
        self.motion.insert(controller.car_id(), controller);
    }

    /// Forget the controller of a car that is no longer rendered.
    pub fn detach(&self, id: CarId) -> Option<Arc<CarMotionController>> {
        self.motion.remove(&id).map(|(_, controller)| controller)
    }

    /// Controller rendering `id`, if any.
    pub fn controller(&self, id: CarId) -> Option<Arc<CarMotionController>> {
        self.motion.get(&id).map(|entry| entry.value().clone())
    }

    /// Ids of every car with a registered controller.
    pub fn controlled_cars(&self) -> Vec<CarId> {
        self.motion.iter().map(|entry| *entry.key()).collect()
    }

    /// Whether a race is in progress.
    pub fn is_racing(&self) -> bool {
        self.racing.load(Ordering::SeqCst)
    }

    /// Mark a race as started; `None` when one is already running.
    pub(crate) fn begin(&self) -> Option<RacingGuard<'_>> {
        self.racing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| RacingGuard {
                racing: &self.racing,
            })
    }

    /// Reset generation; bumped by every race reset.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    pub(crate) fn bump_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Last announced winner.
    pub fn winner(&self) -> Option<RaceWinner> {
        self.winner.borrow().clone()
    }

    /// Receive winner announcements.
    pub fn subscribe_winner(&self) -> watch::Receiver<Option<RaceWinner>> {
        self.winner.subscribe()
    }

    pub(crate) fn announce(&self, winner: Option<RaceWinner>) {
        self.winner.send_replace(winner);
    }

    /// Hide the announced winner.
    pub fn dismiss_winner(&self) {
        self.winner.send_if_modified(|winner| winner.take().is_some());
    }
}

impl Default for RaceBoard {
    fn default() -> Self {
        Self::new()
    }
}

/// Clears the in-progress flag when the race ends, even if it is dropped midway.
pub(crate) struct RacingGuard<'a> {
    racing: &'a AtomicBool,
}

impl Drop for RacingGuard<'_> {
    fn drop(&mut self) {
        self.racing.store(false, Ordering::SeqCst);
    }
}
