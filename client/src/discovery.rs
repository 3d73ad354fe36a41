//! Multicast listener collecting session announcements for the lobby.

use log::{debug, warn};
use shared::{GameConfig, Message, MessageBody, Player, DISCOVERY_GROUP, DISCOVERY_PORT, MAX_DATAGRAM};
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::UdpSocket;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// One announced session, keyed in the map by the master's address.
#[derive(Debug, Clone)]
pub struct DiscoveredGame {
    pub master: SocketAddr,
    pub config: GameConfig,
    pub players: Vec<Player>,
    pub can_join: bool,
    pub seen_at: Instant,
}

pub type GameMap = Arc<RwLock<HashMap<SocketAddr, DiscoveredGame>>>;

/// Join the discovery group and keep a map of announced games current.
/// The source address of each announcement is the master's game socket,
/// which is exactly the address a join must target.
pub async fn spawn_listener() -> std::io::Result<(GameMap, JoinHandle<()>)> {
    let socket = UdpSocket::bind(("0.0.0.0", DISCOVERY_PORT)).await?;
    socket.join_multicast_v4(DISCOVERY_GROUP, Ipv4Addr::UNSPECIFIED)?;
    let games: GameMap = Arc::new(RwLock::new(HashMap::new()));

    let handle = {
        let games = Arc::clone(&games);
        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_DATAGRAM];
            loop {
                let (len, from) = match socket.recv_from(&mut buffer).await {
                    Ok(received) => received,
                    Err(e) => {
                        warn!("discovery receive failed: {}", e);
                        break;
                    }
                };
                match Message::decode(&buffer[..len]) {
                    Ok(Message {
                        body:
                            MessageBody::Announcement {
                                config,
                                players,
                                can_join,
                            },
                        ..
                    }) => {
                        games.write().await.insert(
                            from,
                            DiscoveredGame {
                                master: from,
                                config,
                                players,
                                can_join,
                                seen_at: Instant::now(),
                            },
                        );
                    }
                    Ok(_) => {}
                    Err(_) => debug!("dropping malformed announcement from {}", from),
                }
            }
        })
    };
    Ok((games, handle))
}
