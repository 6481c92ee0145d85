//! Local snapshot of the stores, kept across restarts in two independent namespaces.

use std::{
    collections::BTreeMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tokio::fs;

use crate::{
    api::{Car, CarId, Winner},
    state::{car_state::CarRuntimeState, winners::WinnersSort},
};

/// Namespace holding the garage page, selection and car states.
pub const CARS_NAMESPACE: &str = "cars-storage";
/// Namespace holding the leaderboard page and sorting.
pub const WINNERS_NAMESPACE: &str = "winners-storage";

/// Failures while reading or writing a snapshot file.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The snapshot file exists but could not be read.
    #[error("failed to read snapshot `{}`", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The snapshot file (or its directory) could not be written.
    #[error("failed to write snapshot `{}`", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The snapshot file does not hold valid JSON for its namespace.
    #[error("failed to decode snapshot `{}`", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// The state could not be serialized.
    #[error("failed to encode snapshot `{namespace}`")]
    Encode {
        namespace: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Persisted part of the cars store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedCars {
    /// Cars of the cached page, in display order.
    pub cars: Vec<Car>,
    /// Runtime flags by car id.
    pub car_states: BTreeMap<CarId, CarRuntimeState>,
    /// Current garage page (1-based).
    pub page: u32,
    /// Total number of cars in the garage.
    pub total: usize,
    /// Car picked for editing.
    pub selected_car: Option<Car>,
}

/// Persisted part of the winners store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedWinners {
    /// Winners of the cached page, already sorted.
    pub winners: Vec<Winner>,
    /// Current leaderboard page (1-based).
    pub page: u32,
    /// Total number of winner records.
    pub total: usize,
    /// Sort field and direction.
    pub sort: WinnersSort,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<T> {
    saved_at: String,
    state: T,
}

/// Directory holding one JSON file per namespace.
#[derive(Debug, Clone)]
pub struct SnapshotDir {
    dir: PathBuf,
}

impl SnapshotDir {
    /// Use `dir` for snapshot files; it is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Location of the snapshot file for `namespace`.
    pub fn path(&self, namespace: &str) -> PathBuf {
        self.dir.join(format!("{namespace}.json"))
    }

    /// Load a namespace, returning `None` when nothing was saved yet.
    pub async fn load<T>(&self, namespace: &'static str) -> Result<Option<T>, SnapshotError>
    where
        T: DeserializeOwned,
    {
        let path = self.path(namespace);
        let contents = match fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(SnapshotError::Read { path, source }),
        };

        let envelope = serde_json::from_str::<Envelope<T>>(&contents)
            .map_err(|source| SnapshotError::Decode { path, source })?;
        Ok(Some(envelope.state))
    }

    /// Write a namespace atomically (temp file then rename).
    pub async fn save<T>(&self, namespace: &'static str, state: &T) -> Result<(), SnapshotError>
    where
        T: Serialize,
    {
        let envelope = Envelope {
            saved_at: now_rfc3339(),
            state,
        };
        let payload = serde_json::to_vec_pretty(&envelope)
            .map_err(|source| SnapshotError::Encode { namespace, source })?;

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| SnapshotError::Write {
                path: self.dir.clone(),
                source,
            })?;

        let path = self.path(namespace);
        let tmp = path.with_extension("json.tmp");
        write_file(&tmp, &payload).await?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|source| SnapshotError::Write { path, source })
    }
}

async fn write_file(path: &Path, payload: &[u8]) -> Result<(), SnapshotError> {
    fs::write(path, payload)
        .await
        .map_err(|source| SnapshotError::Write {
            path: path.to_path_buf(),
            source,
        })
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::winners::{SortBy, SortOrder};

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("async-race-snapshot-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn missing_namespace_loads_as_none() {
        let snapshots = SnapshotDir::new(scratch_dir());
        let loaded = snapshots
            .load::<PersistedCars>(CARS_NAMESPACE)
            .await
            .unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn namespaces_are_saved_independently() {
        let dir = scratch_dir();
        let snapshots = SnapshotDir::new(&dir);

        let mut cars = PersistedCars {
            page: 3,
            total: 15,
            ..Default::default()
        };
        cars.car_states.insert(
            4,
            CarRuntimeState {
                is_broken: true,
                ..Default::default()
            },
        );
        let winners = PersistedWinners {
            winners: vec![Winner::first(4, 2.5)],
            page: 1,
            total: 1,
            sort: WinnersSort {
                by: SortBy::Time,
                order: SortOrder::Desc,
            },
        };

        snapshots.save(CARS_NAMESPACE, &cars).await.unwrap();
        snapshots.save(WINNERS_NAMESPACE, &winners).await.unwrap();

        let loaded_cars = snapshots
            .load::<PersistedCars>(CARS_NAMESPACE)
            .await
            .unwrap();
        let loaded_winners = snapshots
            .load::<PersistedWinners>(WINNERS_NAMESPACE)
            .await
            .unwrap();
        assert_eq!(loaded_cars, Some(cars));
        assert_eq!(loaded_winners, Some(winners));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn corrupted_file_is_reported() {
        let dir = scratch_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let snapshots = SnapshotDir::new(&dir);
        std::fs::write(snapshots.path(CARS_NAMESPACE), "{not json").unwrap();

        let err = snapshots
            .load::<PersistedCars>(CARS_NAMESPACE)
            .await
            .unwrap_err();
        assert!(matches!(err, SnapshotError::Decode { .. }));

        let _ = std::fs::remove_dir_all(dir);
    }
}
