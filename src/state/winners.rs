//! Leaderboard cache and the winner recorder.

use std::{cmp::Ordering, sync::Arc};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info};

use crate::{
    api::{CarId, Winner, WinnerUpdate, WinnersApi},
    error::ServiceError,
    state::snapshot::PersistedWinners,
};

/// Leaderboard column used for sorting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    /// Car id.
    #[default]
    Id,
    /// Number of wins.
    Wins,
    /// Best time.
    Time,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

/// Sort field and direction applied to the cached leaderboard page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinnersSort {
    /// Column to sort by.
    pub by: SortBy,
    /// Direction.
    pub order: SortOrder,
}

impl WinnersSort {
    /// Order two winners according to this sort.
    pub fn compare(&self, a: &Winner, b: &Winner) -> Ordering {
        let ordering = match self.by {
            SortBy::Id => a.id.cmp(&b.id),
            SortBy::Wins => a.wins.cmp(&b.wins),
            SortBy::Time => a.time.total_cmp(&b.time),
        };
        match self.order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }

    /// Sort a page of winners in place (stable).
    pub fn apply(&self, winners: &mut [Winner]) {
        winners.sort_by(|a, b| self.compare(a, b));
    }
}

/// Immutable view of the winners store.
#[derive(Debug, Clone, PartialEq)]
pub struct WinnersSnapshot {
    /// Winners of the current page, sorted.
    pub winners: Vec<Winner>,
    /// Current page (1-based).
    pub page: u32,
    /// Total number of winner records.
    pub total: usize,
    /// Active sorting.
    pub sort: WinnersSort,
    /// A leaderboard request is in flight.
    pub loading: bool,
}

impl Default for WinnersSnapshot {
    fn default() -> Self {
        Self {
            winners: Vec::new(),
            page: 1,
            total: 0,
            sort: WinnersSort::default(),
            loading: false,
        }
    }
}

/// Process-wide leaderboard store; also records race winners.
pub struct WinnersStore {
    api: Arc<dyn WinnersApi>,
    state: watch::Sender<WinnersSnapshot>,
    page_size: u32,
}

impl WinnersStore {
    /// Build an empty store on top of the winners endpoints.
    pub fn new(api: Arc<dyn WinnersApi>, page_size: u32) -> Self {
        let (state, _rx) = watch::channel(WinnersSnapshot::default());
        Self {
            api,
            state,
            page_size: page_size.max(1),
        }
    }

    /// Number of winners per leaderboard page.
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Receive every subsequent snapshot.
    pub fn subscribe(&self) -> watch::Receiver<WinnersSnapshot> {
        self.state.subscribe()
    }

    /// Stream of snapshots, emitted on each change.
    pub fn changes(&self) -> WatchStream<WinnersSnapshot> {
        WatchStream::from_changes(self.state.subscribe())
    }

    /// Copy of the latest committed snapshot.
    pub fn snapshot(&self) -> WinnersSnapshot {
        self.state.borrow().clone()
    }

    fn update(&self, f: impl FnOnce(&mut WinnersSnapshot)) {
        self.state.send_modify(f);
    }

    /// Change the sorting and re-sort the cached page.
    pub fn set_sorting(&self, sort: WinnersSort) {
        self.update(|snapshot| {
            snapshot.sort = sort;
            sort.apply(&mut snapshot.winners);
        });
    }

    /// Move to another page without fetching it.
    pub fn set_page(&self, page: u32) {
        self.update(|snapshot| snapshot.page = page.max(1));
    }

    /// Load a page of winners, sorted with `sort` (or the current sorting).
    pub async fn fetch_winners(
        &self,
        page: u32,
        limit: u32,
        sort: Option<WinnersSort>,
    ) -> Result<(), ServiceError> {
        self.update(|snapshot| snapshot.loading = true);
        let result = self.load_page(page.max(1), limit, sort).await;
        self.update(|snapshot| snapshot.loading = false);
        result
    }

    /// Reload the current page with the current sorting.
    pub async fn refresh(&self) -> Result<(), ServiceError> {
        let page = self.state.borrow().page;
        self.fetch_winners(page, self.page_size, None).await
    }

    async fn load_page(
        &self,
        page: u32,
        limit: u32,
        sort: Option<WinnersSort>,
    ) -> Result<(), ServiceError> {
        let sort = sort.unwrap_or_else(|| self.state.borrow().sort);
        let mut winners = self.api.list_winners(page, limit).await?;
        sort.apply(&mut winners);
        let total = self.api.count_winners().await?;

        self.update(|snapshot| {
            snapshot.winners = winners;
            snapshot.total = total;
            snapshot.page = page;
            snapshot.sort = sort;
        });
        Ok(())
    }

    /// Record a race win: create the entry on a first win, otherwise bump the count
    /// and keep the best time. The leaderboard page is refreshed afterwards.
    pub async fn save_winner(&self, id: CarId, time: f64) -> Result<Winner, ServiceError> {
        let saved = match self.api.find_winner(id).await? {
            Some(existing) => {
                let next = existing.with_win(time);
                self.api
                    .update_winner(id, WinnerUpdate::from(&next))
                    .await?
            }
            None => self.api.create_winner(Winner::first(id, time)).await?,
        };
        info!(car_id = id, wins = saved.wins, time = saved.time, "winner recorded");

        if let Err(err) = self.refresh().await {
            debug!(error = %err, "failed to refresh leaderboard after saving winner");
        }
        Ok(saved)
    }

    /// Delete a winner record and reload the page.
    pub async fn remove_winner(&self, id: CarId) -> Result<(), ServiceError> {
        self.api.delete_winner(id).await?;
        self.refresh().await
    }

    /// Replace the store content with a persisted snapshot.
    pub fn restore(&self, persisted: PersistedWinners) {
        self.update(|snapshot| {
            *snapshot = WinnersSnapshot {
                winners: persisted.winners,
                page: persisted.page.max(1),
                total: persisted.total,
                sort: persisted.sort,
                loading: false,
            }
        });
    }

    /// Persistable part of the current snapshot.
    pub fn persisted(&self) -> PersistedWinners {
        let snapshot = self.state.borrow();
        PersistedWinners {
            winners: snapshot.winners.clone(),
            page: snapshot.page,
            total: snapshot.total,
            sort: snapshot.sort,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryWinners;

    fn store(api: MemoryWinners) -> WinnersStore {
        WinnersStore::new(Arc::new(api), 10)
    }

    #[tokio::test]
    async fn save_winner_upserts_and_keeps_best_time() {
        let api = MemoryWinners::default();
        let store = store(api.clone());

        let first = store.save_winner(7, 4.0).await.unwrap();
        assert_eq!(first, Winner { id: 7, wins: 1, time: 4.0 });

        let second = store.save_winner(7, 3.5).await.unwrap();
        assert_eq!(second, Winner { id: 7, wins: 2, time: 3.5 });

        let third = store.save_winner(7, 5.0).await.unwrap();
        assert_eq!(third, Winner { id: 7, wins: 3, time: 3.5 });

        assert_eq!(api.get(7), Some(Winner { id: 7, wins: 3, time: 3.5 }));
        assert_eq!(store.snapshot().winners, vec![third]);
    }

    #[tokio::test]
    async fn concurrent_saves_for_different_cars_do_not_interfere() {
        let api = MemoryWinners::with_winners(vec![Winner { id: 2, wins: 4, time: 6.0 }]);
        let store = store(api.clone());

        let (a, b) = tokio::join!(store.save_winner(1, 3.0), store.save_winner(2, 5.0));
        assert_eq!(a.unwrap(), Winner { id: 1, wins: 1, time: 3.0 });
        assert_eq!(b.unwrap(), Winner { id: 2, wins: 5, time: 5.0 });
        assert_eq!(api.winners().len(), 2);
    }

    #[tokio::test]
    async fn fetch_sorts_the_page() {
        let api = MemoryWinners::with_winners(vec![
            Winner { id: 1, wins: 2, time: 4.1 },
            Winner { id: 2, wins: 5, time: 3.2 },
            Winner { id: 3, wins: 1, time: 9.0 },
        ]);
        let store = store(api);

        let by_wins = WinnersSort {
            by: SortBy::Wins,
            order: SortOrder::Desc,
        };
        store.fetch_winners(1, 10, Some(by_wins)).await.unwrap();
        let ids: Vec<_> = store.snapshot().winners.iter().map(|w| w.id).collect();
        assert_eq!(ids, vec![2, 1, 3]);

        store.set_sorting(WinnersSort {
            by: SortBy::Time,
            order: SortOrder::Asc,
        });
        let snapshot = store.snapshot();
        let ids: Vec<_> = snapshot.winners.iter().map(|w| w.id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
        assert_eq!(snapshot.total, 3);
        assert_eq!(snapshot.sort.by, SortBy::Time);
    }

    #[tokio::test]
    async fn remove_winner_refreshes_the_page() {
        let api = MemoryWinners::with_winners(vec![
            Winner::first(1, 2.0),
            Winner::first(2, 3.0),
        ]);
        let store = store(api);
        store.refresh().await.unwrap();

        store.remove_winner(1).await.unwrap();

        let snapshot = store.snapshot();
        assert_eq!(snapshot.total, 1);
        assert_eq!(snapshot.winners, vec![Winner::first(2, 3.0)]);
    }

    #[test]
    fn sort_order_serializes_like_the_leaderboard_query() {
        let sort = WinnersSort {
            by: SortBy::Wins,
            order: SortOrder::Desc,
        };
        let json = serde_json::to_value(sort).unwrap();
        assert_eq!(json, serde_json::json!({ "by": "wins", "order": "DESC" }));
    }
}
