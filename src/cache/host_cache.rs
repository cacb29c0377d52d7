//! Host-liveness cache: a ~1s TTL in front of `HostStore::live_hosts`, one cell
//! per host kind (game/hub). Backs the lobby's `Get`/`Rand` host lookups so every
//! `Create`/`Join*` doesn't re-scan the heartbeat table.

use super::TtlCell;
use crate::protocol::types::Host;
use crate::store::{HostKind, HostStore};
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_TTL: Duration = Duration::from_secs(1);

pub struct HostCache {
    store: Arc<dyn HostStore>,
    valid_heartbeat: chrono::Duration,
    game: Arc<TtlCell<Vec<Host>>>,
    hub: Arc<TtlCell<Vec<Host>>>,
}

impl HostCache {
    pub fn new(store: Arc<dyn HostStore>, valid_heartbeat: chrono::Duration) -> Self {
        Self::with_ttl(store, valid_heartbeat, DEFAULT_TTL)
    }

    pub fn with_ttl(
        store: Arc<dyn HostStore>,
        valid_heartbeat: chrono::Duration,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            valid_heartbeat,
            game: Arc::new(TtlCell::new(ttl)),
            hub: Arc::new(TtlCell::new(ttl)),
        }
    }

    fn cell_for(&self, kind: HostKind) -> &Arc<TtlCell<Vec<Host>>> {
        match kind {
            HostKind::Game => &self.game,
            HostKind::Hub => &self.hub,
        }
    }

    async fn live(&self, kind: HostKind) -> anyhow::Result<Vec<Host>> {
        let store = self.store.clone();
        let valid_heartbeat = self.valid_heartbeat;
        self.cell_for(kind)
            .get_or_fetch(|| async move { store.live_hosts(kind, valid_heartbeat).await })
            .await
    }

    /// A specific live host, or `None` if it isn't live (or doesn't exist).
    pub async fn get(&self, kind: HostKind, host_id: u32) -> anyhow::Result<Option<Host>> {
        Ok(self
            .live(kind)
            .await?
            .into_iter()
            .find(|h| h.host_id == host_id))
    }

    /// A uniformly random live host, for `Create`'s host-assignment and
    /// `JoinAtRandom`'s candidate pool.
    pub async fn rand(&self, kind: HostKind) -> anyhow::Result<Option<Host>> {
        let hosts = self.live(kind).await?;
        Ok(hosts.choose(&mut rand::thread_rng()).cloned())
    }

    pub async fn all(&self, kind: HostKind) -> anyhow::Result<Vec<Host>> {
        self.live(kind).await
    }

    pub async fn invalidate(&self, kind: HostKind) {
        self.cell_for(kind).invalidate().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::HostStatus;
    use crate::store::InMemoryStore;
    use chrono::Utc;

    fn sample_host(id: u32) -> Host {
        Host {
            host_id: id,
            hostname: "localhost".to_string(),
            public_name: "localhost".to_string(),
            http_port: 9000 + id as u16,
            status: HostStatus::Live,
            heartbeat: Utc::now(),
        }
    }

    #[tokio::test]
    async fn get_finds_a_live_host() {
        let store = Arc::new(InMemoryStore::new());
        store
            .upsert_heartbeat(HostKind::Game, sample_host(1))
            .await
            .unwrap();
        let cache = HostCache::new(store, chrono::Duration::seconds(5));

        let host = cache.get(HostKind::Game, 1).await.unwrap();
        assert!(host.is_some());
    }

    #[tokio::test]
    async fn stale_heartbeats_are_excluded() {
        let store = Arc::new(InMemoryStore::new());
        let mut stale = sample_host(1);
        stale.heartbeat = Utc::now() - chrono::Duration::seconds(30);
        store.upsert_heartbeat(HostKind::Game, stale).await.unwrap();

        let cache = HostCache::new(store, chrono::Duration::seconds(5));
        assert!(cache.get(HostKind::Game, 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rand_picks_among_live_hosts_only() {
        let store = Arc::new(InMemoryStore::new());
        store
            .upsert_heartbeat(HostKind::Game, sample_host(1))
            .await
            .unwrap();
        let cache = HostCache::new(store, chrono::Duration::seconds(5));

        let picked = cache.rand(HostKind::Game).await.unwrap();
        assert_eq!(picked.unwrap().host_id, 1);
    }

    #[tokio::test]
    async fn game_and_hub_caches_are_independent() {
        let store = Arc::new(InMemoryStore::new());
        store
            .upsert_heartbeat(HostKind::Game, sample_host(1))
            .await
            .unwrap();
        let cache = HostCache::new(store, chrono::Duration::seconds(5));

        assert!(cache.get(HostKind::Hub, 1).await.unwrap().is_none());
        assert!(cache.get(HostKind::Game, 1).await.unwrap().is_some());
    }
}
