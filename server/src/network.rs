//! Master-side network plumbing: the inbound receiver task, the
//! retransmission/liveness sweeps and the tick loop that drives the
//! simulation and broadcasts snapshots.

use crate::discovery;
use crate::session::{RoleNotice, Session};
use log::{debug, error, info, warn};
use shared::{
    GameConfig, Message, MessageBody, NodeRole, PlayerId, ReliabilityTracker, MAX_DATAGRAM,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Events funneled from the network tasks into the owning loop.
#[derive(Debug)]
pub enum ServerEvent {
    Datagram { message: Message, addr: SocketAddr },
    PeerExpired { addr: SocketAddr },
    Shutdown,
}

/// One hosted game session bound to a UDP socket.
pub struct Server {
    socket: Arc<UdpSocket>,
    session: Arc<RwLock<Session>>,
    tracker: Arc<Mutex<ReliabilityTracker>>,
    event_tx: mpsc::UnboundedSender<ServerEvent>,
    event_rx: mpsc::UnboundedReceiver<ServerEvent>,
    config: GameConfig,
    local_id: PlayerId,
    tasks: Vec<JoinHandle<()>>,
}

impl Server {
    pub async fn bind(
        addr: &str,
        config: GameConfig,
        master_name: &str,
    ) -> Result<Server, Box<dyn std::error::Error>> {
        config.validate()?;
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("master listening on {}", socket.local_addr()?);
        let session = Session::new(config.clone(), master_name)?;
        let local_id = session.local_id();
        let tracker = ReliabilityTracker::new(config.ping_delay(), config.node_timeout());
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Ok(Server {
            socket,
            session: Arc::new(RwLock::new(session)),
            tracker: Arc::new(Mutex::new(tracker)),
            event_tx,
            event_rx,
            config,
            local_id,
            tasks: Vec::new(),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn local_id(&self) -> PlayerId {
        self.local_id
    }

    /// Shared session handle, for steering the local snake and for tests.
    pub fn session(&self) -> Arc<RwLock<Session>> {
        Arc::clone(&self.session)
    }

    /// Run the session until the socket dies or the event channel closes.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.tasks.push(self.spawn_receiver());
        self.tasks.push(self.spawn_reliability());
        self.tasks.push(discovery::spawn_announcer(
            Arc::clone(&self.socket),
            Arc::clone(&self.session),
        ));

        let mut ticker = interval(self.config.state_delay());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // the first tick fires immediately; swallow it so peers joining
        // right away still see order 1 first
        ticker.tick().await;

        info!(
            "session started, tick period {} ms",
            self.config.state_delay_ms
        );
        loop {
            tokio::select! {
                event = self.event_rx.recv() => match event {
                    Some(ServerEvent::Datagram { message, addr }) => {
                        self.dispatch(message, addr).await;
                    }
                    Some(ServerEvent::PeerExpired { addr }) => self.drop_peer(addr).await,
                    Some(ServerEvent::Shutdown) | None => {
                        info!("session shutting down");
                        break;
                    }
                },
                _ = ticker.tick() => self.tick_once().await,
            }
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
        Ok(())
    }

    /// Receives datagrams and forwards everything that decodes; malformed
    /// payloads are dropped where they land.
    fn spawn_receiver(&self) -> JoinHandle<()> {
        let socket = Arc::clone(&self.socket);
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_DATAGRAM];
            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match Message::decode(&buffer[..len]) {
                        Ok(message) => {
                            if event_tx
                                .send(ServerEvent::Datagram { message, addr })
                                .is_err()
                            {
                                break;
                            }
                        }
                        Err(_) => debug!("dropping malformed datagram from {}", addr),
                    },
                    Err(e) => {
                        error!("socket receive failed: {}", e);
                        let _ = event_tx.send(ServerEvent::Shutdown);
                        break;
                    }
                }
            }
        })
    }

    /// Retransmits the outstanding ledger and pings idle peers every ping
    /// period; reports peers silent past the node timeout.
    fn spawn_reliability(&self) -> JoinHandle<()> {
        let socket = Arc::clone(&self.socket);
        let tracker = Arc::clone(&self.tracker);
        let event_tx = self.event_tx.clone();
        let ping_delay = self.config.ping_delay();
        let node_timeout = self.config.node_timeout();
        tokio::spawn(async move {
            let mut resend = interval(ping_delay);
            resend.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut liveness = interval(node_timeout);
            liveness.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = resend.tick() => {
                        let now = Instant::now();
                        let (queue, pings) = {
                            let mut tracker = tracker.lock().await;
                            (tracker.retransmit_queue(), tracker.pings_due(now))
                        };
                        for (message, destinations) in queue {
                            let Ok(bytes) = message.encode() else { continue };
                            for addr in destinations {
                                if let Err(e) = socket.send_to(&bytes, addr).await {
                                    warn!("retransmit to {} failed: {}", addr, e);
                                }
                                tracker.lock().await.note_sent(addr, Instant::now());
                            }
                        }
                        if !pings.is_empty() {
                            let ping = Message::new(MessageBody::Ping);
                            if let Ok(bytes) = ping.encode() {
                                for addr in &pings {
                                    if let Err(e) = socket.send_to(&bytes, *addr).await {
                                        warn!("ping to {} failed: {}", addr, e);
                                    }
                                }
                                tracker.lock().await.register(ping, pings, Instant::now());
                            }
                        }
                    }
                    _ = liveness.tick() => {
                        let expired = tracker.lock().await.expired_peers(Instant::now());
                        for addr in expired {
                            if event_tx.send(ServerEvent::PeerExpired { addr }).is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        })
    }

    async fn dispatch(&mut self, message: Message, addr: SocketAddr) {
        if self.session.read().await.knows_addr(addr) {
            self.tracker.lock().await.note_heard(addr, Instant::now());
        }
        let seq = message.seq;
        let kind = message.kind();
        match message.body {
            MessageBody::Join {
                player_name,
                only_view,
                ..
            } => {
                let outcome = self
                    .session
                    .write()
                    .await
                    .join(addr, &player_name, only_view);
                match outcome {
                    Ok(id) => {
                        // the ack carries the assigned id back to the joiner
                        let ack = Message::ack(seq)
                            .with_sender(self.local_id)
                            .with_receiver(id);
                        self.send_now(&ack, addr).await;
                    }
                    Err(reason) => {
                        warn!("join from {} rejected: {}", addr, reason);
                        let error = Message::new(MessageBody::Error {
                            message: reason.to_string(),
                        })
                        .with_sender(self.local_id);
                        self.send_tracked(error, vec![addr]).await;
                    }
                }
            }
            MessageBody::Steer { direction } => {
                let Some(id) = message.sender_id else {
                    debug!("steer without sender id from {}", addr);
                    return;
                };
                let verified = {
                    let mut session = self.session.write().await;
                    if session.verify_steer(addr, id) {
                        session.queue_steer(id, direction);
                        true
                    } else {
                        false
                    }
                };
                if verified {
                    let ack = Message::ack(seq).with_sender(self.local_id).with_receiver(id);
                    self.send_now(&ack, addr).await;
                } else {
                    debug!("unverified steer from {} for player {}", addr, id);
                }
            }
            MessageBody::Ack => {
                self.tracker.lock().await.acknowledge(addr, seq);
            }
            MessageBody::Ping | MessageBody::State { .. } => {
                let ack = Message::ack(seq).with_sender(self.local_id);
                self.send_now(&ack, addr).await;
            }
            MessageBody::Error { message } => warn!("error from {}: {}", addr, message),
            MessageBody::RoleChange { .. } | MessageBody::Announcement { .. } => {
                debug!("ignoring {:?} from {}", kind, addr);
            }
        }
    }

    async fn drop_peer(&mut self, addr: SocketAddr) {
        info!("peer {} timed out", addr);
        let notice = self.session.write().await.remove_peer(addr);
        if let Some(notice) = notice {
            self.send_role_change(notice).await;
        }
    }

    async fn send_role_change(&self, notice: RoleNotice) {
        let message = Message::new(MessageBody::RoleChange {
            sender_role: Some(NodeRole::Master),
            receiver_role: Some(notice.role),
        })
        .with_sender(self.local_id)
        .with_receiver(notice.receiver_id);
        self.send_tracked(message, vec![notice.addr]).await;
    }

    /// Advance the simulation and broadcast the fresh snapshot; the
    /// registration supersedes the previous snapshot in the ledger.
    async fn tick_once(&mut self) {
        let (snapshot, peers) = {
            let mut session = self.session.write().await;
            let snapshot = session.tick();
            (snapshot, session.peer_addrs())
        };
        debug!(
            "tick {}: {} snakes, {} food, {} peers",
            snapshot.order,
            snapshot.snakes.len(),
            snapshot.food.len(),
            peers.len()
        );
        if peers.is_empty() {
            return;
        }
        let message = Message::new(MessageBody::State { state: snapshot }).with_sender(self.local_id);
        self.send_tracked(message, peers).await;
    }

    /// Fire-and-forget send (acks); only the send clock is touched.
    async fn send_now(&self, message: &Message, addr: SocketAddr) {
        match message.encode() {
            Ok(bytes) => {
                if let Err(e) = self.socket.send_to(&bytes, addr).await {
                    warn!("send to {} failed: {}", addr, e);
                    return;
                }
                self.tracker.lock().await.note_sent(addr, Instant::now());
            }
            Err(e) => error!("failed to encode message: {}", e),
        }
    }

    /// Send and register for retransmission until each address acks.
    async fn send_tracked(&self, message: Message, destinations: Vec<SocketAddr>) {
        match message.encode() {
            Ok(bytes) => {
                for addr in &destinations {
                    if let Err(e) = self.socket.send_to(&bytes, *addr).await {
                        warn!("send to {} failed: {}", addr, e);
                    }
                }
                self.tracker
                    .lock()
                    .await
                    .register(message, destinations, Instant::now());
            }
            Err(e) => error!("failed to encode {:?} message: {}", message.kind(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> GameConfig {
        GameConfig {
            width: 20,
            height: 20,
            state_delay_ms: 50,
            ..GameConfig::default()
        }
    }

    #[test]
    fn test_bind_assigns_ephemeral_port() {
        tokio_test::block_on(async {
            let server = Server::bind("127.0.0.1:0", test_config(), "host")
                .await
                .expect("bind");
            let addr = server.local_addr().expect("local addr");
            assert_ne!(addr.port(), 0);
            assert_eq!(server.local_id(), 0);
        });
    }

    #[test]
    fn test_bind_rejects_invalid_config() {
        tokio_test::block_on(async {
            let config = GameConfig {
                width: 5,
                ..GameConfig::default()
            };
            assert!(Server::bind("127.0.0.1:0", config, "host").await.is_err());
        });
    }
}
