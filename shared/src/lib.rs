pub mod arena;
pub mod config;
pub mod protocol;
pub mod reliability;
pub mod types;

pub use arena::{Arena, ArenaError, Cell};
pub use config::{ConfigError, GameConfig};
pub use protocol::{Message, MessageBody, MessageKind};
pub use reliability::ReliabilityTracker;
pub use types::{
    Coord, Direction, GameState, NodeRole, Player, PlayerId, PlayerType, Snake, SnakeState,
};

use std::net::Ipv4Addr;

/// Multicast group the master announces running sessions on.
pub const DISCOVERY_GROUP: Ipv4Addr = Ipv4Addr::new(239, 192, 0, 4);
pub const DISCOVERY_PORT: u16 = 9192;

/// Side of the square kept free of snakes when placing a new one.
pub const SPAWN_BASE_SIZE: i32 = 5;

/// Receive buffer size; every encoded message fits well below this.
pub const MAX_DATAGRAM: usize = 2048;
