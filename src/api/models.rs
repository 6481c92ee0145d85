use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

use super::validation::{validate_car_color, validate_car_name};

/// Identifier assigned to cars (and their winner records) by the API.
pub type CarId = u32;

/// A car stored in the remote garage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Car {
    /// Identifier assigned by the garage service.
    pub id: CarId,
    /// Display name (brand and model for generated cars).
    pub name: String,
    /// Body color as `#rrggbb`.
    pub color: String,
}

/// Payload used to create or update a car.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct CarInput {
    /// Display name; must not be blank.
    #[validate(custom(function = "validate_car_name"))]
    pub name: String,
    /// Body color as `#rrggbb`.
    #[validate(custom(function = "validate_car_color"))]
    pub color: String,
}

impl CarInput {
    /// Build a payload from a name and a color.
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
        }
    }
}

/// Speed parameters returned when an engine is started or stopped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    /// Velocity reported by the engine service.
    pub velocity: f64,
    /// Track distance reported by the engine service.
    pub distance: f64,
}

impl EngineStatus {
    /// Predicted travel time in seconds (`distance / velocity / 1000`).
    ///
    /// A stopped engine (zero or negative velocity) yields `0.0`.
    pub fn duration_secs(&self) -> f64 {
        if self.velocity <= 0.0 || !self.velocity.is_finite() {
            return 0.0;
        }
        let secs = self.distance / self.velocity / 1000.0;
        if secs.is_finite() && secs > 0.0 { secs } else { 0.0 }
    }

    /// Predicted travel time as a [`Duration`].
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_secs())
    }
}

/// Result of a drive attempt; `success == false` means the car broke down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveOutcome {
    /// Whether the car reached the finish line.
    pub success: bool,
}

/// Engine commands understood by the `PATCH /engine` endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCommand {
    /// Start the engine and obtain speed parameters.
    Started,
    /// Stop the engine.
    Stopped,
    /// Switch the engine to drive mode.
    Drive,
}

impl EngineCommand {
    /// Value of the `status` query parameter.
    pub fn as_str(self) -> &'static str {
        match self {
            EngineCommand::Started => "started",
            EngineCommand::Stopped => "stopped",
            EngineCommand::Drive => "drive",
        }
    }
}

/// Leaderboard entry keyed by car id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Winner {
    /// Id of the winning car.
    pub id: CarId,
    /// Number of races won.
    pub wins: u32,
    /// Best (lowest) winning time in seconds.
    pub time: f64,
}

impl Winner {
    /// Record for a car's first win.
    pub fn first(id: CarId, time: f64) -> Self {
        Self { id, wins: 1, time }
    }

    /// Record after one more win: count incremented, best time kept.
    pub fn with_win(&self, time: f64) -> Self {
        Self {
            id: self.id,
            wins: self.wins + 1,
            time: self.time.min(time),
        }
    }
}

/// Body of `PUT /winners/:id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WinnerUpdate {
    /// New win count.
    pub wins: u32,
    /// New best time.
    pub time: f64,
}

impl From<&Winner> for WinnerUpdate {
    fn from(winner: &Winner) -> Self {
        Self {
            wins: winner.wins,
            time: winner.time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_is_distance_over_velocity_in_seconds() {
        let status = EngineStatus {
            velocity: 64.0,
            distance: 500_000.0,
        };
        assert!((status.duration_secs() - 7.8125).abs() < f64::EPSILON);
        assert_eq!(status.duration(), Duration::from_secs_f64(7.8125));
    }

    #[test]
    fn stopped_engine_has_zero_duration() {
        let status = EngineStatus {
            velocity: 0.0,
            distance: 500_000.0,
        };
        assert_eq!(status.duration_secs(), 0.0);
        assert_eq!(status.duration(), Duration::ZERO);
    }

    #[test]
    fn winner_upsert_keeps_best_time() {
        let first = Winner::first(7, 4.0);
        assert_eq!(first, Winner { id: 7, wins: 1, time: 4.0 });

        let second = first.with_win(3.5);
        assert_eq!(second, Winner { id: 7, wins: 2, time: 3.5 });

        let third = second.with_win(5.0);
        assert_eq!(third, Winner { id: 7, wins: 3, time: 3.5 });
    }

    #[test]
    fn car_input_validation() {
        assert!(CarInput::new("BMW M3", "#1a2b3c").validate().is_ok());
        assert!(CarInput::new("", "#1a2b3c").validate().is_err());
        assert!(CarInput::new("BMW M3", "red").validate().is_err());
    }
}
