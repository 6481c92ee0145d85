//! Per-car motion: engine calls, the travel animation, the finish flourish and the
//! breakdown jitter.

mod animator;
mod sink;

use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use tokio::time::{Instant, sleep_until};
use tracing::{debug, warn};

use crate::{
    api::{CarId, DriveOutcome},
    error::ServiceError,
    state::{
        car_state::CarStatePatch,
        cars::{CarsStore, EngineStart},
    },
};

pub use self::animator::{
    Animator, CubicBezier, Easing, FRAME_INTERVAL, Playback, Segment, interpolate,
};
pub use self::sink::{HeadlessSink, MotionSink, TrackGeometry};

/// Finish line, as a share of the track width.
pub const FINISH_LINE_RATIO: f64 = 0.9;
/// How far past the finish line the car travels.
pub const OVERSHOOT: f64 = 30.0;
/// Gap kept between the car and the end of the track.
pub const TRACK_PADDING: f64 = 8.0;

const FLOURISH_AT: f64 = 0.85;
const FLOURISH_SHARE: f64 = 0.15;
const FLOURISH_PUSH: f64 = 5.0;
const FLOURISH_SETTLE: Duration = Duration::from_millis(200);
const FINISHED_AT: f64 = 0.9;
const STOP_DURATION: Duration = Duration::from_millis(700);
const JITTER_LEAD_IN: Duration = Duration::from_millis(50);
const JITTER: [(f64, u64); 4] = [(3.0, 100), (-2.0, 150), (4.0, 120), (-3.0, 180)];
const JITTER_REST: (f64, u64) = (-5.0, 200);

/// Offset where the travel animation stops.
pub fn travel_end(geometry: TrackGeometry) -> f64 {
    let finish_line = geometry.track_width * FINISH_LINE_RATIO;
    let past_finish = finish_line + geometry.car_width / 2.0 + OVERSHOOT;
    let track_end = geometry.track_width - geometry.car_width - TRACK_PADDING;
    past_finish.min(track_end).max(0.0)
}

/// Shake played where the car broke down, ending slightly behind `offset`.
pub fn breakdown_steps(offset: f64) -> Vec<Segment> {
    let mut steps: Vec<Segment> = JITTER
        .iter()
        .map(|(delta, millis)| {
            Segment::new(offset + delta, Duration::from_millis(*millis), Easing::JOLT)
        })
        .collect();
    let (rest, millis) = JITTER_REST;
    steps.push(Segment::new(
        (offset + rest).max(0.0),
        Duration::from_millis(millis),
        Easing::JOLT,
    ));
    if let Some(first) = steps.first_mut() {
        first.delay = JITTER_LEAD_IN;
    }
    steps
}

fn flourish_steps(travel: &Travel) -> Vec<Segment> {
    vec![
        Segment::new(
            travel.end + FLOURISH_PUSH,
            travel.duration.mul_f64(FLOURISH_SHARE),
            Easing::EASE,
        ),
        Segment::new(travel.end, FLOURISH_SETTLE, Easing::SETTLE),
    ]
}

/// A travel animation in progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Travel {
    /// Controller run the travel belongs to.
    pub run: u64,
    /// When the car left the start line.
    pub started: Instant,
    /// Predicted travel time.
    pub duration: Duration,
    /// Offset the car travels to.
    pub end: f64,
}

impl Travel {
    /// Instant at which `share` of the travel has elapsed.
    pub fn at(&self, share: f64) -> Instant {
        self.started + self.duration.mul_f64(share)
    }
}

/// How the drive call ended, as far as the animation cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveVerdict {
    /// The car reaches the end of the track.
    Completed,
    /// The API reported a breakdown.
    BrokeDown,
    /// The drive request itself failed.
    Failed,
}

impl From<&Result<DriveOutcome, ServiceError>> for DriveVerdict {
    fn from(result: &Result<DriveOutcome, ServiceError>) -> Self {
        match result {
            Ok(outcome) if outcome.success => DriveVerdict::Completed,
            Ok(_) => DriveVerdict::BrokeDown,
            Err(_) => DriveVerdict::Failed,
        }
    }
}

/// What a controller run ended with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionOutcome {
    /// The car crossed the finish line.
    Finished,
    /// The car broke down on the track.
    Broken,
    /// The engine did not start; the car stayed idle.
    EngineFailed,
    /// The run was stopped or reset before it ended.
    Interrupted,
}

/// Sole owner of one car's on-screen position.
pub struct CarMotionController {
    car_id: CarId,
    cars: Arc<CarsStore>,
    animator: Animator,
    run: Mutex<u64>,
}

impl CarMotionController {
    /// Controller for `car_id`, drawing into `sink`.
    pub fn new(car_id: CarId, cars: Arc<CarsStore>, sink: Arc<dyn MotionSink>) -> Self {
        Self {
            car_id,
            cars,
            animator: Animator::new(sink),
            run: Mutex::new(0),
        }
    }

    /// Car this controller animates.
    pub fn car_id(&self) -> CarId {
        self.car_id
    }

    /// Offset the car is drawn at.
    pub fn position(&self) -> f64 {
        self.animator.sink().position()
    }

    fn runs(&self) -> MutexGuard<'_, u64> {
        self.run.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn begin_run(&self) -> u64 {
        let mut run = self.runs();
        *run += 1;
        *run
    }

    fn is_current(&self, run: u64) -> bool {
        *self.runs() == run
    }

    /// Start `segments` unless `run` is over. The run lock is held while the
    /// playback starts so a concurrent reset cannot be overtaken.
    fn play_in_run(&self, run: u64, segments: Vec<Segment>) -> Option<Playback> {
        let current = self.runs();
        (*current == run).then(|| self.animator.play(segments))
    }

    /// Begin the travel animation for an engine that just started.
    ///
    /// Visual only: the car's flags are left to the caller. Returns `None` when
    /// the car was reset since `start`, leaving it on the start line.
    pub fn launch(&self, start: &EngineStart) -> Option<Travel> {
        let mut current = self.runs();
        if !self.cars.is_current_run(self.car_id, start.epoch) {
            return None;
        }
        *current += 1;

        let end = travel_end(self.animator.sink().geometry());
        let duration = start.status.duration();
        let travel = Travel {
            run: *current,
            started: Instant::now(),
            duration,
            end,
        };
        // The travel runs on its own until superseded by the drive presentation.
        let _travel = self.animator.play(vec![
            Segment::jump(0.0),
            Segment::new(end, duration, Easing::Linear),
        ]);
        Some(travel)
    }

    /// Play the end of a travel once the drive call answered.
    ///
    /// Visual only. A completed drive plays the finish flourish at 85 % of the
    /// travel; a breakdown or a failed request shakes the car where it stands.
    pub async fn present_drive(&self, travel: &Travel, verdict: DriveVerdict) -> MotionOutcome {
        if !self.is_current(travel.run) {
            return MotionOutcome::Interrupted;
        }

        let (playback, outcome) = match verdict {
            DriveVerdict::Completed => {
                sleep_until(travel.at(FLOURISH_AT)).await;
                (
                    self.play_in_run(travel.run, flourish_steps(travel)),
                    MotionOutcome::Finished,
                )
            }
            DriveVerdict::BrokeDown | DriveVerdict::Failed => {
                let offset = self.position();
                (
                    self.play_in_run(travel.run, breakdown_steps(offset)),
                    MotionOutcome::Broken,
                )
            }
        };

        let played = match playback {
            Some(playback) => playback.finished().await,
            None => false,
        };
        if played && self.is_current(travel.run) {
            outcome
        } else {
            MotionOutcome::Interrupted
        }
    }

    /// Drive the car on its own: start the engine, animate the travel and settle
    /// its flags from the drive result.
    pub async fn start_animation(&self) -> MotionOutcome {
        let id = self.car_id;
        let start = match self.cars.start_car_engine(id).await {
            Ok(Some(start)) => start,
            Ok(None) => return MotionOutcome::Interrupted,
            Err(err) => {
                debug!(car_id = id, error = %err, "engine did not start, car stays idle");
                return MotionOutcome::EngineFailed;
            }
        };
        let epoch = start.epoch;
        let Some(travel) = self.launch(&start) else {
            return MotionOutcome::Interrupted;
        };

        let drive = self.cars.drive_car(id, epoch).await;
        let verdict = DriveVerdict::from(&drive);
        if let Err(err) = &drive {
            warn!(car_id = id, error = %err, "drive request failed");
        }

        match verdict {
            DriveVerdict::Completed => {
                let flag = async {
                    sleep_until(travel.at(FINISHED_AT)).await;
                    if self.is_current(travel.run) {
                        self.cars.mark_finished(id, epoch);
                    }
                };
                let (outcome, ()) = tokio::join!(self.present_drive(&travel, verdict), flag);
                outcome
            }
            DriveVerdict::BrokeDown | DriveVerdict::Failed => {
                let outcome = self.present_drive(&travel, verdict).await;
                if outcome == MotionOutcome::Broken {
                    self.cars.set_car_state_if(id, epoch, CarStatePatch::broken());
                }
                outcome
            }
        }
    }

    /// Stop the engine and bring the car back to the start line.
    ///
    /// A failed stop request is logged; the car is returned anyway.
    pub async fn stop_animation(&self) {
        let id = self.car_id;
        let run = self.begin_run();

        if let Err(err) = self.cars.stop_car_engine(id).await {
            warn!(car_id = id, error = %err, "failed to stop engine");
        }

        let returned = match self.play_in_run(
            run,
            vec![Segment::new(0.0, STOP_DURATION, Easing::EASE_IN_OUT)],
        ) {
            Some(playback) => playback.finished().await,
            None => false,
        };
        if returned && self.is_current(run) {
            self.cars.reset_car_state(id);
        }
    }

    /// Cancel whatever is playing, put the car on the start line and clear its flags.
    ///
    /// The car's run is closed under the same lock as the animation, so a
    /// concurrent `launch` sees either both or neither.
    pub fn reset(&self) {
        let mut run = self.runs();
        *run += 1;
        self.animator.snap(0.0);
        self.cars.reset_car_state(self.car_id);
    }
}
