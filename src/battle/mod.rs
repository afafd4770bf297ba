// Server-side battle rooms: the state machine, its actor and the registry.

pub mod actor;
pub mod registry;
pub mod room;

pub use actor::{RoomCommand, RoomHandle, RoomSummary};
pub use registry::RoomRegistry;
pub use room::{Room, RoomStatus};
