//! The authoritative per-tick simulation: steering resolution, toroidal
//! movement, collision classification, death resolution and food
//! replenishment, all operating on the delta-encoded snake chains.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{
    Arena, ArenaError, Cell, Coord, Direction, GameConfig, GameState, NodeRole, Player, PlayerId,
    Snake,
};
use std::collections::{BTreeMap, HashMap};

pub struct Engine {
    arena: Arena,
    snakes: Vec<Snake>,
    food: Vec<Coord>,
    /// Queued steering intent per player, applied at the next tick.
    next_directions: HashMap<PlayerId, Direction>,
    state_order: u32,
    rng: StdRng,
}

impl Engine {
    pub fn new(config: &GameConfig) -> Engine {
        Engine::seeded(config, rand::random())
    }

    /// Deterministic construction for tests.
    pub fn seeded(config: &GameConfig, seed: u64) -> Engine {
        Engine {
            arena: Arena::new(config.width, config.height),
            snakes: Vec::new(),
            food: Vec::new(),
            next_directions: HashMap::new(),
            state_order: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn snakes(&self) -> &[Snake] {
        &self.snakes
    }

    pub fn food(&self) -> &[Coord] {
        &self.food
    }

    /// Whether another snake could still be placed.
    pub fn has_spawn_base(&self) -> bool {
        self.arena.find_spawn_base().is_ok()
    }

    /// Queue a steering intent; resolved (and possibly discarded as a
    /// reversal) when the tick runs.
    pub fn queue_steer(&mut self, id: PlayerId, direction: Direction) {
        if self.snakes.iter().any(|snake| snake.player_id == id) {
            self.next_directions.insert(id, direction);
        }
    }

    /// Place a new two-cell snake on the first free base.
    pub fn spawn_snake(&mut self, id: PlayerId) -> Result<(), ArenaError> {
        let base = self.arena.find_spawn_base()?;
        self.spawn_at(base, id)
    }

    /// Place the master's own snake, starting from the grid-centered base.
    pub fn spawn_snake_centered(&mut self, id: PlayerId) -> Result<(), ArenaError> {
        let base = ((self.arena.width() - shared::SPAWN_BASE_SIZE) / 2
            + (self.arena.height() - shared::SPAWN_BASE_SIZE) / 2 * self.arena.width())
            as usize;
        self.spawn_at(base, id)
    }

    fn spawn_at(&mut self, base: usize, id: PlayerId) -> Result<(), ArenaError> {
        let (head_index, direction) = self.arena.position_new_snake(base, id, &mut self.rng)?;
        let head = self.arena.coord_of(head_index);
        self.next_directions.insert(id, direction);
        self.snakes.push(Snake::spawn(id, head, direction));
        Ok(())
    }

    /// Advance the world one tick and return the snapshot to broadcast.
    pub fn tick(&mut self, config: &GameConfig, players: &mut BTreeMap<PlayerId, Player>) -> GameState {
        self.advance_snakes(config, players);
        self.replenish_food(config, players);
        self.state_order += 1;
        GameState {
            order: self.state_order,
            snakes: self.snakes.clone(),
            food: self.food.clone(),
            players: players.values().cloned().collect(),
            config: config.clone(),
        }
    }

    fn advance_snakes(&mut self, config: &GameConfig, players: &mut BTreeMap<PlayerId, Player>) {
        let count = self.snakes.len();

        // Heads become plain body cells and every snake resolves its
        // steering and target on this same frame.
        let mut targets = Vec::with_capacity(count);
        for i in 0..count {
            let head = self.snakes[i].head();
            let head_index = self.arena.index_of(head);
            self.arena.set_snake_body(head_index, self.snakes[i].player_id);
            let direction = self.effective_direction(i);
            targets.push((self.arena.step(head, direction), direction));
        }

        // Tail pre-shrink: judged before any tail has moved, so all snakes
        // see the same frame. A vacated own tail cell is no obstacle.
        let eats: Vec<bool> = targets
            .iter()
            .map(|(target, _)| self.arena.get(self.arena.index_of(*target)).is_food())
            .collect();
        for i in 0..count {
            if !eats[i] {
                let tail = self.snakes[i].tail(self.arena.width(), self.arena.height());
                let tail_index = self.arena.index_of(tail);
                self.arena.set_empty(tail_index);
                self.snakes[i].shrink_tail();
            }
        }

        // Collision classification, per snake in registration order against
        // the live arena: the first mover into an empty cell plants its
        // head there, and a later mover into the same cell meets it head-on.
        let mut dead = vec![false; count];
        for i in 0..count {
            let (target, direction) = targets[i];
            let target_index = self.arena.index_of(target);
            match self.arena.get(target_index) {
                Cell::Food => {
                    bump_score(players, self.snakes[i].player_id);
                    self.move_head(i, target, direction);
                    self.food.retain(|coord| *coord != target);
                }
                Cell::Empty => self.move_head(i, target, direction),
                Cell::SnakeBody { owner } => {
                    dead[i] = true;
                    bump_score(players, owner);
                }
                Cell::SnakeHead { owner, .. } => {
                    dead[i] = true;
                    if let Some(j) = self.snakes.iter().position(|s| s.player_id == owner) {
                        dead[j] = true;
                    }
                }
            }
        }

        let dead_ids: Vec<PlayerId> = (0..count)
            .filter(|i| dead[*i])
            .map(|i| self.snakes[i].player_id)
            .collect();
        for id in dead_ids {
            self.remove_snake(id, config);
            if let Some(player) = players.get_mut(&id) {
                // the master keeps coordinating even without a snake
                if player.role != NodeRole::Master {
                    player.role = NodeRole::Viewer;
                }
            }
        }
    }

    /// Queued intent against current heading; an exact reversal is
    /// discarded, not deferred.
    fn effective_direction(&mut self, i: usize) -> Direction {
        let snake = &self.snakes[i];
        let heading = snake.head_direction;
        match self.next_directions.get(&snake.player_id) {
            Some(queued) if *queued != heading.opposite() => *queued,
            _ => {
                self.next_directions.insert(snake.player_id, heading);
                heading
            }
        }
    }

    fn move_head(&mut self, i: usize, target: Coord, direction: Direction) {
        let target_index = self.arena.index_of(target);
        self.arena
            .set_snake_head(target_index, direction, self.snakes[i].player_id);
        self.snakes[i].advance_head(target, direction);
    }

    /// Remove a snake from play, converting each of its cells to food with
    /// probability `dead_food_prob` and to empty otherwise. Used both for
    /// in-tick deaths and for departing players.
    pub fn remove_snake(&mut self, id: PlayerId, config: &GameConfig) {
        let Some(position) = self.snakes.iter().position(|s| s.player_id == id) else {
            return;
        };
        let snake = self.snakes.remove(position);
        for cell in snake.cells(self.arena.width(), self.arena.height()) {
            let index = self.arena.index_of(cell);
            if self.rng.gen::<f64>() <= config.dead_food_prob {
                self.arena.set_food(index);
                self.food.push(cell);
            } else {
                self.arena.set_empty(index);
            }
        }
        self.next_directions.remove(&id);
    }

    /// Top food up to `food_static + floor(online * food_per_player)`,
    /// drawing empty cells without replacement. When empty cells run out
    /// the field is silently under-provisioned.
    fn replenish_food(&mut self, config: &GameConfig, players: &BTreeMap<PlayerId, Player>) {
        let online = players
            .values()
            .filter(|player| player.role != NodeRole::Viewer)
            .count();
        let target = config.food_target(online);
        if self.food.len() >= target {
            return;
        }
        let mut empty = self.arena.empty_indices();
        for _ in self.food.len()..target {
            if empty.is_empty() {
                break;
            }
            let pick = self.rng.gen_range(0..empty.len());
            let index = empty.swap_remove(pick);
            self.arena.set_food(index);
            self.food.push(self.arena.coord_of(index));
        }
    }
}

fn bump_score(players: &mut BTreeMap<PlayerId, Player>, id: PlayerId) {
    if let Some(player) = players.get_mut(&id) {
        player.score += 1;
    }
}
