//! Opaque store interface standing in for the relational ground truth treated as an
//! external collaborator (`app`, `room`, `game`, `hub` tables): a focused async trait
//! plus an in-memory implementation, rather than an embedded SQL engine or schema
//! migrations.

use crate::protocol::types::{Host, HostStatus, HubAssignment, RoomId, RoomInfo};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("room id {0} already exists for this app")]
    RoomIdConflict(RoomId),
    #[error("room number {0} already exists for this app")]
    RoomNumberConflict(u32),
    #[error("room not found")]
    RoomNotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostKind {
    Game,
    Hub,
}

/// The `room` table plus whatever indexing the lobby's dispatch paths need.
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Insert a brand-new room row. Returns `StoreError::RoomIdConflict` /
    /// `RoomNumberConflict` on collision so the repository's retry loop can
    /// distinguish a collision from any other store failure.
    async fn insert_room(&self, room: RoomInfo) -> Result<()>;

    async fn get_room_by_id(&self, app_id: &str, room_id: &RoomId) -> Result<Option<RoomInfo>>;

    async fn get_room_by_number(&self, app_id: &str, number: u32) -> Result<Option<RoomInfo>>;

    /// Rows matching `app_id`/`search_group`/`visible=1`/`joinable=1`, as consulted by
    /// the room cache on a miss. Watchability is filtered downstream by the
    /// caller, not here.
    async fn search_rooms(&self, app_id: &str, search_group: u32) -> Result<Vec<RoomInfo>>;

    /// Replace a room row wholesale.
    async fn update_room(&self, room: RoomInfo) -> Result<()>;

    async fn delete_room(&self, app_id: &str, room_id: &RoomId) -> Result<bool>;

    async fn room_count_for_host(&self, app_id: &str, host_id: u32) -> Result<usize>;
}

/// The `game`/`hub` tables.
#[async_trait]
pub trait HostStore: Send + Sync {
    /// Rows with `heartbeat >= now - valid_heartbeat` and `status = 'live'`, as
    /// consulted by the host cache on a miss.
    async fn live_hosts(&self, kind: HostKind, valid_heartbeat: chrono::Duration)
        -> Result<Vec<Host>>;

    async fn get_host(&self, kind: HostKind, host_id: u32) -> Result<Option<Host>>;

    async fn upsert_heartbeat(&self, kind: HostKind, host: Host) -> Result<()>;

    /// Hubs currently serving `room_id`, for watcher-spreading.
    async fn hubs_for_room(&self, room_id: &RoomId) -> Result<Vec<HubAssignment>>;

    async fn set_hub_watchers(&self, host_id: u32, room_id: &RoomId, watchers: u32) -> Result<()>;

    async fn clear_hub_room(&self, host_id: u32, room_id: &RoomId) -> Result<()>;
}

/// In-memory backend for both traits; every `app` within one process shares a single
/// instance, so a room or host row inserted through one trait is immediately visible
/// through the other.
#[derive(Default)]
pub struct InMemoryStore {
    rooms: DashMap<(String, RoomId), RoomInfo>,
    room_numbers: DashMap<(String, u32), RoomId>,
    hosts: DashMap<(HostKind, u32), Host>,
    hub_assignments: DashMap<(u32, RoomId), u32>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoomStore for InMemoryStore {
    async fn insert_room(&self, room: RoomInfo) -> Result<()> {
        let key = (room.app_id.clone(), room.id.clone());
        if self.rooms.contains_key(&key) {
            return Err(StoreError::RoomIdConflict(room.id).into());
        }
        if let Some(number) = room.number {
            let number_key = (room.app_id.clone(), number);
            if self.room_numbers.contains_key(&number_key) {
                return Err(StoreError::RoomNumberConflict(number).into());
            }
            self.room_numbers.insert(number_key, room.id.clone());
        }
        self.rooms.insert(key, room);
        Ok(())
    }

    async fn get_room_by_id(&self, app_id: &str, room_id: &RoomId) -> Result<Option<RoomInfo>> {
        Ok(self
            .rooms
            .get(&(app_id.to_string(), room_id.clone()))
            .map(|r| r.clone()))
    }

    async fn get_room_by_number(&self, app_id: &str, number: u32) -> Result<Option<RoomInfo>> {
        let Some(room_id) = self
            .room_numbers
            .get(&(app_id.to_string(), number))
            .map(|id| id.clone())
        else {
            return Ok(None);
        };
        self.get_room_by_id(app_id, &room_id).await
    }

    async fn search_rooms(&self, app_id: &str, search_group: u32) -> Result<Vec<RoomInfo>> {
        Ok(self
            .rooms
            .iter()
            .filter(|entry| {
                let room = entry.value();
                room.app_id == app_id
                    && room.search_group == search_group
                    && room.visible
                    && room.joinable
            })
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn update_room(&self, room: RoomInfo) -> Result<()> {
        let key = (room.app_id.clone(), room.id.clone());
        self.rooms.insert(key, room);
        Ok(())
    }

    async fn delete_room(&self, app_id: &str, room_id: &RoomId) -> Result<bool> {
        let removed = self
            .rooms
            .remove(&(app_id.to_string(), room_id.clone()));
        if let Some((_, room)) = &removed {
            if let Some(number) = room.number {
                self.room_numbers.remove(&(app_id.to_string(), number));
            }
        }
        Ok(removed.is_some())
    }

    async fn room_count_for_host(&self, app_id: &str, host_id: u32) -> Result<usize> {
        Ok(self
            .rooms
            .iter()
            .filter(|entry| entry.value().app_id == app_id && entry.value().host_id == host_id)
            .count())
    }
}

#[async_trait]
impl HostStore for InMemoryStore {
    async fn live_hosts(
        &self,
        kind: HostKind,
        valid_heartbeat: chrono::Duration,
    ) -> Result<Vec<Host>> {
        let cutoff = Utc::now() - valid_heartbeat;
        Ok(self
            .hosts
            .iter()
            .filter(|entry| {
                let (host_kind, _) = entry.key();
                *host_kind == kind
                    && entry.value().status == HostStatus::Live
                    && entry.value().heartbeat >= cutoff
            })
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn get_host(&self, kind: HostKind, host_id: u32) -> Result<Option<Host>> {
        Ok(self.hosts.get(&(kind, host_id)).map(|h| h.clone()))
    }

    async fn upsert_heartbeat(&self, kind: HostKind, host: Host) -> Result<()> {
        self.hosts.insert((kind, host.host_id), host);
        Ok(())
    }

    async fn hubs_for_room(&self, room_id: &RoomId) -> Result<Vec<HubAssignment>> {
        Ok(self
            .hub_assignments
            .iter()
            .filter(|entry| entry.key().1 == *room_id)
            .map(|entry| HubAssignment {
                host_id: entry.key().0,
                room_id: entry.key().1.clone(),
                watchers: *entry.value(),
            })
            .collect())
    }

    async fn set_hub_watchers(&self, host_id: u32, room_id: &RoomId, watchers: u32) -> Result<()> {
        self.hub_assignments
            .insert((host_id, room_id.clone()), watchers);
        Ok(())
    }

    async fn clear_hub_room(&self, host_id: u32, room_id: &RoomId) -> Result<()> {
        self.hub_assignments.remove(&(host_id, room_id.clone()));
        Ok(())
    }
}

/// Timestamped wrapper kept for store backends that need last-write tracking; unused by
/// the in-memory implementation but mirrors the shape a persisted backend's
/// `update_room_activity` would need.
#[derive(Debug, Clone)]
pub struct Timestamped<T> {
    pub value: T,
    pub at: DateTime<Utc>,
}

pub type AppRegistry = HashMap<String, crate::protocol::types::App>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_room(app_id: &str, id: &str, number: Option<u32>) -> RoomInfo {
        RoomInfo {
            id: id.to_string(),
            app_id: app_id.to_string(),
            host_id: 1,
            number,
            search_group: 0,
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
    async fn insert_then_lookup_by_id_and_number() {
        let store = InMemoryStore::new();
        store
            .insert_room(sample_room("app1", "0123456789abcdef", Some(7)))
            .await
            .unwrap();

        let by_id = store
            .get_room_by_id("app1", &"0123456789abcdef".to_string())
            .await
            .unwrap();
        assert!(by_id.is_some());

        let by_number = store.get_room_by_number("app1", 7).await.unwrap();
        assert_eq!(by_number.unwrap().id, "0123456789abcdef");
    }

    #[tokio::test]
    async fn duplicate_id_is_rejected() {
        let store = InMemoryStore::new();
        store
            .insert_room(sample_room("app1", "dup", None))
            .await
            .unwrap();
        let err = store
            .insert_room(sample_room("app1", "dup", None))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::RoomIdConflict(_))
        ));
    }

    #[tokio::test]
    async fn duplicate_number_is_rejected_independently_of_id() {
        let store = InMemoryStore::new();
        store
            .insert_room(sample_room("app1", "room-a", Some(1)))
            .await
            .unwrap();
        let err = store
            .insert_room(sample_room("app1", "room-b", Some(1)))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::RoomNumberConflict(_))
        ));
    }

    #[tokio::test]
    async fn search_filters_by_visible_joinable_and_group() {
        let store = InMemoryStore::new();
        let mut hidden = sample_room("app1", "hidden", None);
        hidden.visible = false;
        store.insert_room(hidden).await.unwrap();
        store
            .insert_room(sample_room("app1", "visible", None))
            .await
            .unwrap();

        let found = store.search_rooms("app1", 0).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "visible");
    }

    #[tokio::test]
    async fn delete_frees_both_id_and_number() {
        let store = InMemoryStore::new();
        store
            .insert_room(sample_room("app1", "room-x", Some(5)))
            .await
            .unwrap();
        assert!(store
            .delete_room("app1", &"room-x".to_string())
            .await
            .unwrap());

        store
            .insert_room(sample_room("app1", "room-y", Some(5)))
            .await
            .unwrap();
    }
}
