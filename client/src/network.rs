//! Connected-node networking: the join handshake and the receive loop
//! that acks snapshots, retransmits its own messages and watches the
//! master's liveness.

use crate::game::ClientGameState;
use log::{debug, info, warn};
use shared::{
    Direction, GameConfig, Message, MessageBody, NodeRole, PlayerId, PlayerType,
    ReliabilityTracker, MAX_DATAGRAM,
};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout_at, MissedTickBehavior};

pub const JOIN_ATTEMPTS: u32 = 3;
pub const JOIN_WINDOW: Duration = Duration::from_millis(1500);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("master rejected the join: {0}")]
    Rejected(String),
    #[error("no response from the master")]
    NoContact,
    #[error("master went silent")]
    MasterLost,
    #[error("acknowledgement carried no player id")]
    BadAck,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("message codec failed: {0}")]
    Codec(#[from] bincode::Error),
}

/// Handle used to feed steering intents into the running client.
pub type SteerHandle = mpsc::UnboundedSender<Direction>;

pub struct Client {
    socket: UdpSocket,
    master: SocketAddr,
    player_id: PlayerId,
    role: NodeRole,
    config: GameConfig,
    tracker: ReliabilityTracker,
    game: ClientGameState,
    steer_rx: mpsc::UnboundedReceiver<Direction>,
}

impl Client {
    /// Join the game at `master`: up to three tracked attempts, each with
    /// a bounded receive window. The ack to the join carries the player id
    /// this node was assigned.
    pub async fn join(
        master: SocketAddr,
        name: &str,
        view_only: bool,
        config: GameConfig,
    ) -> Result<(Client, SteerHandle), ClientError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let join = Message::new(MessageBody::Join {
            player_name: name.to_string(),
            only_view: view_only,
            player_type: PlayerType::Human,
        });
        let bytes = join.encode()?;
        let mut buffer = [0u8; MAX_DATAGRAM];

        for attempt in 1..=JOIN_ATTEMPTS {
            debug!("join attempt {} of {}", attempt, JOIN_ATTEMPTS);
            socket.send_to(&bytes, master).await?;
            // keep reading for the whole window; an early snapshot must not
            // swallow the ack
            let deadline = tokio::time::Instant::now() + JOIN_WINDOW;
            loop {
                let (len, from) = match timeout_at(deadline, socket.recv_from(&mut buffer)).await {
                    Ok(received) => received?,
                    Err(_) => break,
                };
                if from != master {
                    continue;
                }
                let Ok(reply) = Message::decode(&buffer[..len]) else {
                    continue;
                };
                match reply.body {
                    MessageBody::Ack if reply.seq == join.seq => {
                        let player_id = reply.receiver_id.ok_or(ClientError::BadAck)?;
                        info!("joined game at {} as player {}", master, player_id);
                        let role = if view_only {
                            NodeRole::Viewer
                        } else {
                            NodeRole::Normal
                        };
                        let mut tracker =
                            ReliabilityTracker::new(config.ping_delay(), config.node_timeout());
                        tracker.note_heard(master, Instant::now());
                        let (steer_tx, steer_rx) = mpsc::unbounded_channel();
                        let game = ClientGameState::new(&config);
                        return Ok((
                            Client {
                                socket,
                                master,
                                player_id,
                                role,
                                config,
                                tracker,
                                game,
                                steer_rx,
                            },
                            steer_tx,
                        ));
                    }
                    MessageBody::Error { message } => {
                        return Err(ClientError::Rejected(message))
                    }
                    _ => {}
                }
            }
        }
        Err(ClientError::NoContact)
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn game(&self) -> &ClientGameState {
        &self.game
    }

    /// Receive loop: runs until the steer source closes (orderly leave),
    /// the master goes silent, or the socket fails.
    pub async fn run(&mut self) -> Result<(), ClientError> {
        let mut resend = interval(self.config.ping_delay());
        resend.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut liveness = interval(self.config.node_timeout());
        liveness.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut buffer = [0u8; MAX_DATAGRAM];

        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buffer) => {
                    let (len, from) = received?;
                    if from != self.master {
                        continue;
                    }
                    self.tracker.note_heard(from, Instant::now());
                    match Message::decode(&buffer[..len]) {
                        Ok(message) => self.handle_message(message).await?,
                        Err(_) => debug!("dropping malformed datagram from {}", from),
                    }
                }
                _ = resend.tick() => self.flush_outstanding().await?,
                _ = liveness.tick() => {
                    if self.tracker.expired_peers(Instant::now()).contains(&self.master) {
                        warn!("lost contact with master at {}", self.master);
                        return Err(ClientError::MasterLost);
                    }
                }
                queued = self.steer_rx.recv() => match queued {
                    Some(direction) => self.send_steer(direction).await?,
                    None => {
                        info!("steer source closed, leaving the session");
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn handle_message(&mut self, message: Message) -> Result<(), ClientError> {
        let seq = message.seq;
        let kind = message.kind();
        match message.body {
            MessageBody::State { state } => {
                if self.game.apply(state) {
                    // roles are server-authoritative; the snapshot is how a
                    // dead player learns it is a viewer now
                    if let Some(role) = self
                        .game
                        .players()
                        .iter()
                        .find(|player| player.id == self.player_id)
                        .map(|player| player.role)
                    {
                        self.role = role;
                    }
                    self.send_ack(seq).await?;
                } else {
                    debug!("discarding stale snapshot");
                }
            }
            MessageBody::Ping => self.send_ack(seq).await?,
            MessageBody::Ack => {
                self.tracker.acknowledge(self.master, seq);
            }
            MessageBody::RoleChange {
                receiver_role: Some(role),
                ..
            } => {
                info!("role changed to {:?}", role);
                self.role = role;
                self.send_ack(seq).await?;
            }
            MessageBody::Error { message } => warn!("error from master: {}", message),
            _ => debug!("ignoring {:?} from master", kind),
        }
        Ok(())
    }

    async fn send_ack(&mut self, seq: u64) -> Result<(), ClientError> {
        let ack = Message::ack(seq).with_sender(self.player_id);
        let bytes = ack.encode()?;
        self.socket.send_to(&bytes, self.master).await?;
        self.tracker.note_sent(self.master, Instant::now());
        Ok(())
    }

    /// Send a steering intent; it stays in the ledger (superseding any
    /// earlier steer) until the master acknowledges it.
    async fn send_steer(&mut self, direction: Direction) -> Result<(), ClientError> {
        if self.role == NodeRole::Viewer {
            debug!("viewers cannot steer");
            return Ok(());
        }
        let message = Message::new(MessageBody::Steer { direction }).with_sender(self.player_id);
        let bytes = message.encode()?;
        self.socket.send_to(&bytes, self.master).await?;
        self.tracker
            .register(message, vec![self.master], Instant::now());
        Ok(())
    }

    /// Retransmit everything still unacknowledged and ping the master if
    /// the send side has been idle past the ping period.
    async fn flush_outstanding(&mut self) -> Result<(), ClientError> {
        let now = Instant::now();
        for (message, destinations) in self.tracker.retransmit_queue() {
            let bytes = message.encode()?;
            for addr in destinations {
                self.socket.send_to(&bytes, addr).await?;
                self.tracker.note_sent(addr, now);
            }
        }
        for addr in self.tracker.pings_due(now) {
            let ping = Message::new(MessageBody::Ping).with_sender(self.player_id);
            let bytes = ping.encode()?;
            self.socket.send_to(&bytes, addr).await?;
            self.tracker.register(ping, vec![addr], now);
        }
        Ok(())
    }
}
