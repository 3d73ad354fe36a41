//! Player registry and role bookkeeping for one hosted game session.
//!
//! Roles are server-authoritative: one Master (the local node), at most
//! one Deputy, any number of Normal players and Viewers. The session owns
//! the simulation engine; the network layer only talks to this type.

use crate::engine::Engine;
use log::{error, info, warn};
use shared::{
    ArenaError, Direction, GameConfig, GameState, NodeRole, Player, PlayerId,
};
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum JoinError {
    #[error("Address already joined the game.")]
    AlreadyJoined,
    #[error("Lack of space on the field.")]
    NoSpace,
}

/// A role promotion the network layer must deliver as a `RoleChange`.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleNotice {
    pub addr: SocketAddr,
    pub receiver_id: PlayerId,
    pub role: NodeRole,
}

pub struct Session {
    config: GameConfig,
    local_id: PlayerId,
    next_player_id: PlayerId,
    deputy: Option<PlayerId>,
    /// Registration order is id order; BTreeMap iteration preserves it.
    players: BTreeMap<PlayerId, Player>,
    addresses: HashMap<SocketAddr, PlayerId>,
    engine: Engine,
}

impl Session {
    /// Start a session: the local player takes the Master role and its
    /// snake spawns from the grid-centered base.
    pub fn new(config: GameConfig, master_name: &str) -> Result<Session, ArenaError> {
        Session::build(config, master_name, Engine::new)
    }

    /// Deterministic construction for tests.
    pub fn seeded(config: GameConfig, master_name: &str, seed: u64) -> Result<Session, ArenaError> {
        Session::build(config, master_name, |config| Engine::seeded(config, seed))
    }

    fn build(
        config: GameConfig,
        master_name: &str,
        make_engine: impl FnOnce(&GameConfig) -> Engine,
    ) -> Result<Session, ArenaError> {
        let mut engine = make_engine(&config);
        let local_id = 0;
        engine.spawn_snake_centered(local_id)?;
        let mut players = BTreeMap::new();
        players.insert(
            local_id,
            Player::new(local_id, master_name, None, NodeRole::Master),
        );
        Ok(Session {
            config,
            local_id,
            next_player_id: local_id + 1,
            deputy: None,
            players,
            addresses: HashMap::new(),
            engine,
        })
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn local_id(&self) -> PlayerId {
        self.local_id
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn knows_addr(&self, addr: SocketAddr) -> bool {
        self.addresses.contains_key(&addr)
    }

    /// Addresses of every remote peer, for snapshot broadcast.
    pub fn peer_addrs(&self) -> Vec<SocketAddr> {
        self.addresses.keys().copied().collect()
    }

    /// Current player list (id, name, role, score): the scoreboard view.
    pub fn players(&self) -> Vec<Player> {
        self.players.values().cloned().collect()
    }

    /// Whether a joining player could still get a snake.
    pub fn can_join(&self) -> bool {
        self.engine.has_spawn_base()
    }

    /// Admit a peer. Viewers always fit; a playing join needs a free
    /// spawn base. The first Normal player while the Deputy seat is empty
    /// is promoted immediately.
    pub fn join(
        &mut self,
        addr: SocketAddr,
        name: &str,
        only_view: bool,
    ) -> Result<PlayerId, JoinError> {
        if self.addresses.contains_key(&addr) {
            return Err(JoinError::AlreadyJoined);
        }
        let id = self.next_player_id;
        let mut role = NodeRole::Viewer;
        if !only_view {
            match self.engine.spawn_snake(id) {
                Ok(()) => role = NodeRole::Normal,
                Err(ArenaError::NoSpaceAvailable) => return Err(JoinError::NoSpace),
                Err(conflict @ ArenaError::SpawnConflict) => {
                    // grid corruption; refuse the join rather than place a
                    // snake on top of food
                    error!("spawn failed against invariants: {}", conflict);
                    return Err(JoinError::NoSpace);
                }
            }
        }
        self.next_player_id += 1;
        if role == NodeRole::Normal && self.deputy.is_none() {
            role = NodeRole::Deputy;
            self.deputy = Some(id);
        }
        self.addresses.insert(addr, id);
        self.players
            .insert(id, Player::new(id, name, Some(addr), role));
        info!("player {} ({}) joined from {} as {:?}", id, name, addr, role);
        Ok(id)
    }

    /// A steering command is honored only when its address is registered
    /// to that exact player and the player is not a viewer.
    pub fn verify_steer(&self, addr: SocketAddr, id: PlayerId) -> bool {
        if self.addresses.get(&addr) != Some(&id) {
            return false;
        }
        self.players
            .get(&id)
            .map_or(false, |player| player.role != NodeRole::Viewer)
    }

    pub fn queue_steer(&mut self, id: PlayerId, direction: Direction) {
        self.engine.queue_steer(id, direction);
    }

    /// Drop the peer at `addr`: its snake resolves through the usual
    /// probabilistic death rule and, if it held the Deputy seat, the first
    /// remaining Normal player takes it over.
    pub fn remove_peer(&mut self, addr: SocketAddr) -> Option<RoleNotice> {
        let id = self.addresses.remove(&addr)?;
        self.players.remove(&id);
        self.engine.remove_snake(id, &self.config);
        info!("player {} at {} removed", id, addr);
        if self.deputy == Some(id) {
            self.deputy = None;
            return self.promote_deputy();
        }
        None
    }

    /// Scan remaining players in registration order for the first Normal
    /// one and seat it as Deputy.
    fn promote_deputy(&mut self) -> Option<RoleNotice> {
        if self.deputy.is_some() {
            // refusing beats silently seating a second deputy
            warn!("deputy seat already taken, refusing promotion");
            return None;
        }
        for (id, player) in self.players.iter_mut() {
            if player.role != NodeRole::Normal {
                continue;
            }
            let Some(addr) = player.addr else { continue };
            player.role = NodeRole::Deputy;
            self.deputy = Some(*id);
            info!("player {} promoted to deputy", id);
            return Some(RoleNotice {
                addr,
                receiver_id: *id,
                role: NodeRole::Deputy,
            });
        }
        None
    }

    /// Run one simulation tick and return the snapshot to broadcast.
    pub fn tick(&mut self) -> GameState {
        let snapshot = self.engine.tick(&self.config, &mut self.players);
        // a deputy whose snake died was demoted to viewer by the engine
        if let Some(id) = self.deputy {
            if self.players.get(&id).map(|player| player.role) != Some(NodeRole::Deputy) {
                self.deputy = None;
            }
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> GameConfig {
        GameConfig {
            width: 20,
            height: 20,
            food_static: 0,
            food_per_player: 0.0,
            ..GameConfig::default()
        }
    }

    fn session() -> Session {
        Session::seeded(test_config(), "host", 11).unwrap()
    }

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    #[test]
    fn test_new_session_has_master_with_snake() {
        let session = session();
        let players = session.players();
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].id, 0);
        assert_eq!(players[0].role, NodeRole::Master);
        assert_eq!(session.engine().snakes().len(), 1);
    }

    #[test]
    fn test_first_normal_join_becomes_deputy() {
        let mut session = session();
        let first = session.join(addr(1), "a", false).unwrap();
        let second = session.join(addr(2), "b", false).unwrap();
        let roles: Vec<NodeRole> = session.players().iter().map(|p| p.role).collect();
        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(
            roles,
            vec![NodeRole::Master, NodeRole::Deputy, NodeRole::Normal]
        );
    }

    #[test]
    fn test_viewer_join_gets_no_snake_and_no_deputy_seat() {
        let mut session = session();
        let id = session.join(addr(1), "watcher", true).unwrap();
        let players = session.players();
        assert_eq!(players[1].role, NodeRole::Viewer);
        assert_eq!(session.engine().snakes().len(), 1);
        assert!(!session.verify_steer(addr(1), id));
    }

    #[test]
    fn test_duplicate_address_rejected() {
        let mut session = session();
        session.join(addr(1), "a", false).unwrap();
        assert_eq!(
            session.join(addr(1), "again", false),
            Err(JoinError::AlreadyJoined)
        );
    }

    #[test]
    fn test_join_without_space_reports_field_full() {
        let config = GameConfig {
            width: 10,
            height: 10,
            ..test_config()
        };
        let mut session = Session::seeded(config, "host", 3).unwrap();
        let mut port = 1;
        let error = loop {
            match session.join(addr(port), "p", false) {
                Ok(_) => port += 1,
                Err(error) => break error,
            }
            assert!(port < 100, "grid never filled up");
        };
        assert_eq!(error, JoinError::NoSpace);
        assert_eq!(error.to_string(), "Lack of space on the field.");
        // the failed join registered nothing
        assert!(!session.knows_addr(addr(port)));
    }

    #[test]
    fn test_deputy_departure_promotes_next_normal_in_order() {
        let mut session = session();
        session.join(addr(1), "a", false).unwrap();
        session.join(addr(2), "b", false).unwrap();
        session.join(addr(3), "c", false).unwrap();

        let notice = session.remove_peer(addr(1)).expect("promotion expected");
        assert_eq!(
            notice,
            RoleNotice {
                addr: addr(2),
                receiver_id: 2,
                role: NodeRole::Deputy,
            }
        );
        let players = session.players();
        assert_eq!(players[1].id, 2);
        assert_eq!(players[1].role, NodeRole::Deputy);
        assert_eq!(players[2].role, NodeRole::Normal);
    }

    #[test]
    fn test_normal_departure_leaves_deputy_alone() {
        let mut session = session();
        session.join(addr(1), "a", false).unwrap();
        session.join(addr(2), "b", false).unwrap();
        assert_eq!(session.remove_peer(addr(2)), None);
        assert_eq!(session.players()[1].role, NodeRole::Deputy);
    }

    #[test]
    fn test_remove_unknown_peer_is_a_no_op() {
        let mut session = session();
        assert_eq!(session.remove_peer(addr(9)), None);
        assert_eq!(session.players().len(), 1);
    }

    #[test]
    fn test_verify_steer_checks_address_id_binding() {
        let mut session = session();
        let id = session.join(addr(1), "a", false).unwrap();
        session.join(addr(2), "b", false).unwrap();
        assert!(session.verify_steer(addr(1), id));
        assert!(!session.verify_steer(addr(2), id));
        assert!(!session.verify_steer(addr(9), id));
    }

    #[test]
    fn test_snapshot_carries_session_population() {
        let mut session = session();
        session.join(addr(1), "a", false).unwrap();
        let snapshot = session.tick();
        assert_eq!(snapshot.order, 1);
        assert_eq!(snapshot.players.len(), 2);
        assert_eq!(snapshot.snakes.len(), 2);
        assert_eq!(snapshot.config, *session.config());
    }
}
