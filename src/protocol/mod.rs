//! Wire and domain types: data model, binary-wire events/messages, and the error
//! taxonomy.

pub mod error;
pub mod types;
pub mod wire;

pub use error::{AppError, RemoteStatus};
pub use types::{
    generate_room_id, new_client_id, App, ClientInfo, Host, HostStatus, HubAssignment,
    JoinedRoomRes, RoomId, RoomInfo, RoomOption, Token,
};
pub use wire::{Event, LeaveCause, Message};
