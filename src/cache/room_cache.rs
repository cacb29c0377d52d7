//! Room-search cache: a ~10ms TTL in front of `RoomStore::search_rooms`, keyed by
//! `(app_id, search_group)`. Short enough that two requests landing in the same instant
//! see a consistent room list, long enough to absorb a burst of `Search`/`JoinAtRandom`
//! calls without hammering the store.

use super::TtlCell;
use crate::protocol::types::RoomInfo;
use crate::store::RoomStore;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_TTL: Duration = Duration::from_millis(10);

pub struct RoomCache {
    ttl: Duration,
    store: Arc<dyn RoomStore>,
    cells: DashMap<(String, u32), Arc<TtlCell<Vec<RoomInfo>>>>,
}

impl RoomCache {
    pub fn new(store: Arc<dyn RoomStore>) -> Self {
        Self::with_ttl(store, DEFAULT_TTL)
    }

    pub fn with_ttl(store: Arc<dyn RoomStore>, ttl: Duration) -> Self {
        Self {
            ttl,
            store,
            cells: DashMap::new(),
        }
    }

    /// Visible, joinable rooms in `search_group`. Watchability and query-predicate
    /// filtering happen downstream in the lobby, not here.
    pub async fn search(&self, app_id: &str, search_group: u32) -> anyhow::Result<Vec<RoomInfo>> {
        let key = (app_id.to_string(), search_group);
        let cell = self
            .cells
            .entry(key.clone())
            .or_insert_with(|| Arc::new(TtlCell::new(self.ttl)))
            .clone();

        let store = self.store.clone();
        let (app_id, search_group) = key;
        cell.get_or_fetch(|| async move { store.search_rooms(&app_id, search_group).await })
            .await
    }

    /// Force the next lookup for `(app_id, search_group)` to hit the store, used after a
    /// room's visibility/joinability changes so stale results don't outlive the TTL
    /// unnecessarily long.
    pub async fn invalidate(&self, app_id: &str, search_group: u32) {
        if let Some(cell) = self.cells.get(&(app_id.to_string(), search_group)) {
            cell.invalidate().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use chrono::Utc;

    fn sample_room(id: &str, search_group: u32) -> RoomInfo {
        RoomInfo {
            id: id.to_string(),
            app_id: "app1".to_string(),
            host_id: 1,
            number: None,
            search_group,
            max_players: 4,
            players: 0,
            visible: true,
            joinable: true,
            watchable: true,
            public_props: Default::default(),
            private_props: Default::default(),
            created: Utc::now(),
        }
    }

    #[tokio::test]
    async fn search_reflects_store_contents() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_room(sample_room("r1", 0)).await.unwrap();
        let cache = RoomCache::new(store.clone());

        let found = cache.search("app1", 0).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "r1");
    }

    #[tokio::test]
    async fn separate_search_groups_are_cached_independently() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_room(sample_room("r1", 0)).await.unwrap();
        store.insert_room(sample_room("r2", 1)).await.unwrap();
        let cache = RoomCache::new(store);

        assert_eq!(cache.search("app1", 0).await.unwrap().len(), 1);
        assert_eq!(cache.search("app1", 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalidate_allows_seeing_a_freshly_inserted_room() {
        let store = Arc::new(InMemoryStore::new());
        let cache = RoomCache::with_ttl(store.clone(), Duration::from_secs(60));

        assert_eq!(cache.search("app1", 0).await.unwrap().len(), 0);
        store.insert_room(sample_room("r1", 0)).await.unwrap();
        assert_eq!(cache.search("app1", 0).await.unwrap().len(), 0); // still cached

        cache.invalidate("app1", 0).await;
        assert_eq!(cache.search("app1", 0).await.unwrap().len(), 1);
    }
}
