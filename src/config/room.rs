//! Room-loop tunables, the config-file-facing counterpart of
//! [`crate::room::RoomConfig`] (kept as a distinct type so the wire/config schema doesn't
//! have to track the room loop's internal field names one-for-one).

use serde::{Deserialize, Serialize};

fn default_history_capacity() -> usize {
    1024
}

fn default_send_queue_capacity() -> usize {
    256
}

fn default_tick_interval_secs() -> u64 {
    1
}

fn default_client_deadline_secs() -> u64 {
    30
}

fn default_msg_channel_capacity() -> usize {
    512
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomTuning {
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default = "default_send_queue_capacity")]
    pub send_queue_capacity: usize,
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    #[serde(default = "default_client_deadline_secs")]
    pub default_client_deadline_secs: u64,
    #[serde(default = "default_msg_channel_capacity")]
    pub msg_channel_capacity: usize,
}

impl Default for RoomTuning {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            send_queue_capacity: default_send_queue_capacity(),
            tick_interval_secs: default_tick_interval_secs(),
            default_client_deadline_secs: default_client_deadline_secs(),
            msg_channel_capacity: default_msg_channel_capacity(),
        }
    }
}

impl RoomTuning {
    #[must_use]
    pub fn to_room_config(&self) -> crate::room::RoomConfig {
        crate::room::RoomConfig {
            history_capacity: self.history_capacity,
            send_queue_capacity: self.send_queue_capacity,
            tick_interval: std::time::Duration::from_secs(self.tick_interval_secs),
            default_client_deadline: std::time::Duration::from_secs(
                self.default_client_deadline_secs,
            ),
            msg_channel_capacity: self.msg_channel_capacity,
        }
    }
}
