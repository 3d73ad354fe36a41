//! Acknowledgement tracking and peer liveness on top of lossy datagrams.
//!
//! The tracker is a plain data structure: the owning loop feeds it sends,
//! receipts and the current time, and polls it for what to retransmit,
//! whom to ping and whom to give up on. Keeping the socket out makes the
//! whole retransmission policy testable with synthetic clocks.

use crate::protocol::{Message, MessageKind};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// One tracked message and the destinations still owing an ack.
#[derive(Debug, Clone)]
struct Outstanding {
    message: Message,
    pending: Vec<SocketAddr>,
}

/// Send/receive clocks for one peer.
#[derive(Debug, Clone, Copy)]
struct PeerClock {
    sent: Instant,
    heard: Instant,
}

pub struct ReliabilityTracker {
    ping_delay: Duration,
    node_timeout: Duration,
    /// Outstanding messages keyed by sequence number.
    ledger: HashMap<u64, Outstanding>,
    peers: HashMap<SocketAddr, PeerClock>,
}

impl ReliabilityTracker {
    pub fn new(ping_delay: Duration, node_timeout: Duration) -> ReliabilityTracker {
        ReliabilityTracker {
            ping_delay,
            node_timeout,
            ledger: HashMap::new(),
            peers: HashMap::new(),
        }
    }

    /// Track `message` until every destination acknowledges it. A `State`,
    /// `Steer` or `Ping` registration replaces any previous entry of the
    /// same kind; only the newest of those is worth retransmitting.
    pub fn register(&mut self, message: Message, destinations: Vec<SocketAddr>, now: Instant) {
        if matches!(
            message.kind(),
            MessageKind::State | MessageKind::Steer | MessageKind::Ping
        ) {
            self.drop_kind(message.kind());
        }
        for addr in &destinations {
            self.note_sent(*addr, now);
        }
        if message.needs_ack() && !destinations.is_empty() {
            self.ledger.insert(
                message.seq,
                Outstanding {
                    message,
                    pending: destinations,
                },
            );
        }
    }

    /// Forget every outstanding message of `kind`.
    pub fn drop_kind(&mut self, kind: MessageKind) {
        self.ledger.retain(|_, entry| entry.message.kind() != kind);
    }

    /// Remove `addr` from the entry matching `seq`. Returns true when that
    /// message is now fully acknowledged and gone from the ledger.
    pub fn acknowledge(&mut self, addr: SocketAddr, seq: u64) -> bool {
        if let Some(entry) = self.ledger.get_mut(&seq) {
            entry.pending.retain(|pending| *pending != addr);
            if entry.pending.is_empty() {
                self.ledger.remove(&seq);
                return true;
            }
        }
        false
    }

    pub fn note_sent(&mut self, addr: SocketAddr, now: Instant) {
        let clock = self
            .peers
            .entry(addr)
            .or_insert(PeerClock { sent: now, heard: now });
        clock.sent = now;
    }

    pub fn note_heard(&mut self, addr: SocketAddr, now: Instant) {
        let clock = self
            .peers
            .entry(addr)
            .or_insert(PeerClock { sent: now, heard: now });
        clock.heard = now;
    }

    /// Everything still awaiting acks, cloned with its pending peers. The
    /// whole queue is resent on every retransmission sweep.
    pub fn retransmit_queue(&mut self) -> Vec<(Message, Vec<SocketAddr>)> {
        self.ledger.retain(|_, entry| !entry.pending.is_empty());
        self.ledger
            .values()
            .map(|entry| (entry.message.clone(), entry.pending.clone()))
            .collect()
    }

    /// Peers we have not sent anything to for a full ping period; they
    /// get an unsolicited ping so silence stays distinguishable from loss.
    pub fn pings_due(&self, now: Instant) -> Vec<SocketAddr> {
        self.peers
            .iter()
            .filter(|(_, clock)| now.saturating_duration_since(clock.sent) > self.ping_delay)
            .map(|(addr, _)| *addr)
            .collect()
    }

    /// Peers silent past the node timeout. They are forgotten here; the
    /// caller owns the session-level removal.
    pub fn expired_peers(&mut self, now: Instant) -> Vec<SocketAddr> {
        let expired: Vec<SocketAddr> = self
            .peers
            .iter()
            .filter(|(_, clock)| now.saturating_duration_since(clock.heard) > self.node_timeout)
            .map(|(addr, _)| *addr)
            .collect();
        for addr in &expired {
            self.forget_peer(*addr);
        }
        expired
    }

    /// Drop every trace of a departed peer.
    pub fn forget_peer(&mut self, addr: SocketAddr) {
        self.peers.remove(&addr);
        for entry in self.ledger.values_mut() {
            entry.pending.retain(|pending| *pending != addr);
        }
        self.ledger.retain(|_, entry| !entry.pending.is_empty());
    }

    pub fn outstanding(&self) -> usize {
        self.ledger.len()
    }

    pub fn is_tracked(&self, seq: u64) -> bool {
        self.ledger.contains_key(&seq)
    }
}
