//! Wire protocol: the message envelope and its bincode codec.
//!
//! Every message except `Announcement` carries a random 64-bit sequence
//! number; an `Ack` echoes the sequence number of the message it
//! acknowledges. Delivery is at-least-once over plain datagrams; ordering
//! of game state is recovered from the snapshot's `order` field, not from
//! the transport.

use crate::config::GameConfig;
use crate::types::{Direction, GameState, NodeRole, Player, PlayerId, PlayerType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub seq: u64,
    pub sender_id: Option<PlayerId>,
    pub receiver_id: Option<PlayerId>,
    pub body: MessageBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MessageBody {
    Join {
        player_name: String,
        only_view: bool,
        player_type: PlayerType,
    },
    Ack,
    Error {
        message: String,
    },
    Ping,
    Steer {
        direction: Direction,
    },
    RoleChange {
        sender_role: Option<NodeRole>,
        receiver_role: Option<NodeRole>,
    },
    State {
        state: GameState,
    },
    Announcement {
        config: GameConfig,
        players: Vec<Player>,
        can_join: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Join,
    Ack,
    Error,
    Ping,
    Steer,
    RoleChange,
    State,
    Announcement,
}

impl Message {
    /// Wrap a body in a fresh envelope with a random sequence number.
    pub fn new(body: MessageBody) -> Message {
        Message {
            seq: rand::random::<u64>(),
            sender_id: None,
            receiver_id: None,
            body,
        }
    }

    /// Acknowledgement echoing the sequence number of the message it
    /// answers.
    pub fn ack(seq: u64) -> Message {
        Message {
            seq,
            sender_id: None,
            receiver_id: None,
            body: MessageBody::Ack,
        }
    }

    pub fn with_sender(mut self, id: PlayerId) -> Message {
        self.sender_id = Some(id);
        self
    }

    pub fn with_receiver(mut self, id: PlayerId) -> Message {
        self.receiver_id = Some(id);
        self
    }

    pub fn kind(&self) -> MessageKind {
        match self.body {
            MessageBody::Join { .. } => MessageKind::Join,
            MessageBody::Ack => MessageKind::Ack,
            MessageBody::Error { .. } => MessageKind::Error,
            MessageBody::Ping => MessageKind::Ping,
            MessageBody::Steer { .. } => MessageKind::Steer,
            MessageBody::RoleChange { .. } => MessageKind::RoleChange,
            MessageBody::State { .. } => MessageKind::State,
            MessageBody::Announcement { .. } => MessageKind::Announcement,
        }
    }

    /// Whether the sender must track this message until every destination
    /// acknowledges it.
    pub fn needs_ack(&self) -> bool {
        !matches!(self.kind(), MessageKind::Ack | MessageKind::Announcement)
    }

    pub fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Message, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Coord, Snake};

    #[test]
    fn test_fresh_envelopes_get_distinct_sequences() {
        let a = Message::new(MessageBody::Ping);
        let b = Message::new(MessageBody::Ping);
        assert_ne!(a.seq, b.seq);
    }

    #[test]
    fn test_ack_echoes_sequence() {
        let ping = Message::new(MessageBody::Ping);
        let ack = Message::ack(ping.seq).with_sender(3).with_receiver(1);
        assert_eq!(ack.seq, ping.seq);
        assert_eq!(ack.sender_id, Some(3));
        assert_eq!(ack.receiver_id, Some(1));
        assert_eq!(ack.kind(), MessageKind::Ack);
    }

    #[test]
    fn test_needs_ack_matrix() {
        assert!(Message::new(MessageBody::Ping).needs_ack());
        assert!(Message::new(MessageBody::Steer {
            direction: Direction::Up
        })
        .needs_ack());
        assert!(!Message::ack(1).needs_ack());
        assert!(!Message::new(MessageBody::Announcement {
            config: GameConfig::default(),
            players: vec![],
            can_join: true,
        })
        .needs_ack());
    }

    #[test]
    fn test_serialization_round_trips() {
        let state = GameState {
            order: 9,
            snakes: vec![Snake::spawn(1, Coord::new(4, 4), Direction::Left)],
            food: vec![Coord::new(0, 0)],
            players: vec![Player::new(1, "ada", None, NodeRole::Master)],
            config: GameConfig::default(),
        };
        let messages = vec![
            Message::new(MessageBody::Join {
                player_name: "ada".to_string(),
                only_view: false,
                player_type: PlayerType::Human,
            }),
            Message::ack(17),
            Message::new(MessageBody::Error {
                message: "Lack of space on the field.".to_string(),
            }),
            Message::new(MessageBody::Steer {
                direction: Direction::Down,
            })
            .with_sender(2),
            Message::new(MessageBody::State {
                state: state.clone(),
            })
            .with_sender(0),
            Message::new(MessageBody::RoleChange {
                sender_role: Some(NodeRole::Master),
                receiver_role: Some(NodeRole::Deputy),
            }),
            Message::new(MessageBody::Announcement {
                config: GameConfig::default(),
                players: state.players.clone(),
                can_join: true,
            }),
            Message::new(MessageBody::Ping),
        ];
        for message in messages {
            let bytes = message.encode().unwrap();
            let decoded = Message::decode(&bytes).unwrap();
            assert_eq!(decoded, message);
        }
    }

    #[test]
    fn test_garbage_fails_to_decode() {
        assert!(Message::decode(&[0xff; 11]).is_err());
    }
}
