//! Multicast session announcements for lobby discovery.

use crate::session::Session;
use log::warn;
use shared::{Message, MessageBody, DISCOVERY_GROUP, DISCOVERY_PORT};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::interval;

pub const ANNOUNCE_PERIOD: Duration = Duration::from_secs(1);

/// Periodically multicast the session's announcement (config, player
/// list, joinability) on the discovery group. Announcements are
/// unsolicited and never acknowledged.
pub fn spawn_announcer(socket: Arc<UdpSocket>, session: Arc<RwLock<Session>>) -> JoinHandle<()> {
    let group = SocketAddr::new(IpAddr::V4(DISCOVERY_GROUP), DISCOVERY_PORT);
    tokio::spawn(async move {
        let mut ticker = interval(ANNOUNCE_PERIOD);
        loop {
            ticker.tick().await;
            let message = {
                let session = session.read().await;
                Message::new(MessageBody::Announcement {
                    config: session.config().clone(),
                    players: session.players(),
                    can_join: session.can_join(),
                })
                .with_sender(session.local_id())
            };
            match message.encode() {
                Ok(bytes) => {
                    if let Err(e) = socket.send_to(&bytes, group).await {
                        warn!("announcement send failed: {}", e);
                    }
                }
                Err(e) => {
                    warn!("failed to encode announcement: {}", e);
                }
            }
        }
    })
}
