//! Client-side snapshot cache and occupancy repaint.
//!
//! The master is authoritative; this type only keeps the newest snapshot
//! and repaints a local arena from it for rendering consumers. Anything
//! not strictly newer than the last accepted snapshot is discarded, which
//! absorbs duplication and reordering on the wire.

use shared::{Arena, Cell, GameConfig, GameState, Player};

pub struct ClientGameState {
    last_order: u32,
    arena: Arena,
    state: Option<GameState>,
}

impl ClientGameState {
    pub fn new(config: &GameConfig) -> ClientGameState {
        ClientGameState {
            last_order: 0,
            arena: Arena::new(config.width, config.height),
            state: None,
        }
    }

    /// Apply a snapshot. Returns false (and changes nothing) when the
    /// snapshot is stale or a duplicate.
    pub fn apply(&mut self, state: GameState) -> bool {
        if state.order <= self.last_order {
            return false;
        }
        self.last_order = state.order;

        let (width, height) = (state.config.width, state.config.height);
        if self.arena.width() != width || self.arena.height() != height {
            self.arena = Arena::new(width, height);
        } else {
            self.arena.clear();
        }

        for food in &state.food {
            let index = self.arena.index_of(*food);
            self.arena.set_food(index);
        }
        for snake in state.snakes.iter().filter(|s| !s.points.is_empty()) {
            let head_index = self.arena.index_of(snake.head());
            self.arena
                .set_snake_head(head_index, snake.head_direction, snake.player_id);
            for cell in snake.cells(width, height).into_iter().skip(1) {
                let index = self.arena.index_of(cell);
                self.arena.set_snake_body(index, snake.player_id);
            }
        }

        self.state = Some(state);
        true
    }

    pub fn last_order(&self) -> u32 {
        self.last_order
    }

    /// Per-cell occupancy view for painting.
    pub fn cells(&self) -> &[Cell] {
        self.arena.cells()
    }

    /// Scoreboard view: id, name, role and score per player.
    pub fn players(&self) -> &[Player] {
        self.state
            .as_ref()
            .map(|state| state.players.as_slice())
            .unwrap_or(&[])
    }

    pub fn snapshot(&self) -> Option<&GameState> {
        self.state.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Coord, Direction, NodeRole, Snake};

    fn snapshot(order: u32) -> GameState {
        GameState {
            order,
            snakes: vec![Snake::spawn(1, Coord::new(3, 3), Direction::Right)],
            food: vec![Coord::new(0, 0)],
            players: vec![Player::new(1, "ada", None, NodeRole::Master)],
            config: GameConfig {
                width: 10,
                height: 10,
                ..GameConfig::default()
            },
        }
    }

    fn game() -> ClientGameState {
        ClientGameState::new(&GameConfig {
            width: 10,
            height: 10,
            ..GameConfig::default()
        })
    }

    #[test]
    fn test_apply_paints_occupancy() {
        let mut game = game();
        assert!(game.apply(snapshot(1)));

        let cells = game.cells();
        assert_eq!(cells[0], Cell::Food);
        assert_eq!(
            cells[3 * 10 + 3],
            Cell::SnakeHead {
                direction: Direction::Right,
                owner: 1
            }
        );
        assert_eq!(cells[3 * 10 + 2], Cell::SnakeBody { owner: 1 });
        assert_eq!(game.players().len(), 1);
        assert_eq!(game.last_order(), 1);
    }

    #[test]
    fn test_stale_and_duplicate_snapshots_rejected() {
        let mut game = game();
        assert!(game.apply(snapshot(5)));
        assert!(!game.apply(snapshot(5)));
        assert!(!game.apply(snapshot(4)));
        assert!(game.apply(snapshot(6)));
        assert_eq!(game.last_order(), 6);
    }

    #[test]
    fn test_repaint_clears_previous_frame() {
        let mut game = game();
        game.apply(snapshot(1));
        let mut next = snapshot(2);
        next.food.clear();
        next.snakes[0].advance_head(Coord::new(4, 3), Direction::Right);
        game.apply(next);

        let cells = game.cells();
        assert_eq!(cells[0], Cell::Empty);
        assert_eq!(
            cells[3 * 10 + 4],
            Cell::SnakeHead {
                direction: Direction::Right,
                owner: 1
            }
        );
        // old tail cell repainted as body, old head no longer a head
        assert_eq!(cells[3 * 10 + 3], Cell::SnakeBody { owner: 1 });
    }

    #[test]
    fn test_arena_resizes_with_config_change() {
        let mut game = game();
        game.apply(snapshot(1));
        let mut next = snapshot(2);
        next.config.width = 12;
        next.config.height = 12;
        game.apply(next);
        assert_eq!(game.cells().len(), 144);
    }
}
