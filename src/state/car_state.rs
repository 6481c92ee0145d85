use serde::{Deserialize, Serialize};

/// Transient per-car status flags.
///
/// At most one flag is set at a time; all flags cleared means the car is idle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarRuntimeState {
    /// Engine started and the car is moving.
    pub is_running: bool,
    /// The car broke down during its drive.
    pub is_broken: bool,
    /// The car crossed the finish line.
    pub is_finished: bool,
}

impl CarRuntimeState {
    /// Idle state (every flag cleared).
    pub const IDLE: Self = Self {
        is_running: false,
        is_broken: false,
        is_finished: false,
    };

    /// Merge a partial update into this state.
    pub fn apply(&mut self, patch: CarStatePatch) {
        if let Some(value) = patch.is_running {
            self.is_running = value;
        }
        if let Some(value) = patch.is_broken {
            self.is_broken = value;
        }
        if let Some(value) = patch.is_finished {
            self.is_finished = value;
        }
    }

    /// Single-valued view of the flags.
    pub fn status(&self) -> CarStatus {
        if self.is_broken {
            CarStatus::Broken
        } else if self.is_finished {
            CarStatus::Finished
        } else if self.is_running {
            CarStatus::Running
        } else {
            CarStatus::Idle
        }
    }
}

/// Status derived from [`CarRuntimeState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarStatus {
    /// Engine off.
    Idle,
    /// Moving towards the finish.
    Running,
    /// Broke down before the finish.
    Broken,
    /// Reached the finish.
    Finished,
}

impl CarStatus {
    /// Label shown next to a car's controls.
    pub fn label(self) -> &'static str {
        match self {
            CarStatus::Idle => "ENGINE OFF",
            CarStatus::Running => "ENGINE ON",
            CarStatus::Broken => "BROKEN",
            CarStatus::Finished => "FINISHED",
        }
    }
}

/// Partial update of a [`CarRuntimeState`]; `None` fields are left untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CarStatePatch {
    /// New running flag.
    pub is_running: Option<bool>,
    /// New broken flag.
    pub is_broken: Option<bool>,
    /// New finished flag.
    pub is_finished: Option<bool>,
}

impl CarStatePatch {
    /// Clear every flag.
    pub const fn idle() -> Self {
        Self::all(false, false, false)
    }

    /// Engine on, moving.
    pub const fn running() -> Self {
        Self::all(true, false, false)
    }

    /// Broken down.
    pub const fn broken() -> Self {
        Self::all(false, true, false)
    }

    /// Crossed the finish line.
    pub const fn finished() -> Self {
        Self::all(false, false, true)
    }

    /// Only touch the running flag.
    pub const fn running_only(value: bool) -> Self {
        Self {
            is_running: Some(value),
            is_broken: None,
            is_finished: None,
        }
    }

    const fn all(is_running: bool, is_broken: bool, is_finished: bool) -> Self {
        Self {
            is_running: Some(is_running),
            is_broken: Some(is_broken),
            is_finished: Some(is_finished),
        }
    }
}
