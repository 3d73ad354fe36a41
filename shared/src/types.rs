//! Game data model: directions, coordinates, players and the
//! delta-encoded snake representation shared by master and clients.

use crate::config::GameConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

pub type PlayerId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub fn opposite(self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    /// Unit offset of one step in this direction; x grows rightward,
    /// y grows downward.
    pub fn offset(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    /// Key-delta unit for a snake heading this way: one cell toward the tail.
    pub fn tailward(self) -> Coord {
        let (dx, dy) = self.opposite().offset();
        Coord::new(dx, dy)
    }
}

/// Either an absolute grid cell or a key delta, depending on position in a
/// snake's point chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coord {
    pub x: i32,
    pub y: i32,
}

impl Coord {
    pub fn new(x: i32, y: i32) -> Coord {
        Coord { x, y }
    }

    /// One step in `direction`, wrapping around the torus edges.
    pub fn step(self, direction: Direction, width: i32, height: i32) -> Coord {
        let (dx, dy) = direction.offset();
        Coord {
            x: (self.x + dx).rem_euclid(width),
            y: (self.y + dy).rem_euclid(height),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    Master,
    Deputy,
    Normal,
    Viewer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerType {
    Human,
    Robot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    /// None for the master's own entry; it needs no datagrams to itself.
    pub addr: Option<SocketAddr>,
    pub role: NodeRole,
    pub kind: PlayerType,
    pub score: u32,
}

impl Player {
    pub fn new(id: PlayerId, name: &str, addr: Option<SocketAddr>, role: NodeRole) -> Player {
        Player {
            id,
            name: name.to_string(),
            addr,
            role,
            kind: PlayerType::Human,
            score: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnakeState {
    Alive,
    /// A snake whose owner left the session but that is still on the wire.
    Zombie,
}

/// A snake body stored as its absolute head plus key deltas.
///
/// `points[0]` is the head cell. Every following point is a key delta: a
/// vector with exactly one non-zero axis whose magnitude is the length of a
/// straight run, walked from the head toward the tail. Wire size is
/// proportional to the number of turns, not to snake length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snake {
    pub player_id: PlayerId,
    pub state: SnakeState,
    pub head_direction: Direction,
    pub points: Vec<Coord>,
}

impl Snake {
    /// A freshly placed two-cell snake: head plus one body cell behind it.
    pub fn spawn(player_id: PlayerId, head: Coord, direction: Direction) -> Snake {
        Snake {
            player_id,
            state: SnakeState::Alive,
            head_direction: direction,
            points: vec![head, direction.tailward()],
        }
    }

    /// The absolute head coordinate.
    pub fn head(&self) -> Coord {
        self.points[0]
    }

    /// The absolute tail coordinate, walking the key-delta chain with
    /// wraparound.
    pub fn tail(&self, width: i32, height: i32) -> Coord {
        let mut cell = self.points[0];
        for key in &self.points[1..] {
            cell.x = (cell.x + key.x).rem_euclid(width);
            cell.y = (cell.y + key.y).rem_euclid(height);
        }
        cell
    }

    /// Every cell the snake occupies, head first.
    pub fn cells(&self, width: i32, height: i32) -> Vec<Coord> {
        let mut out = Vec::new();
        let Some(&head) = self.points.first() else {
            return out;
        };
        let mut cell = head;
        out.push(cell);
        for key in &self.points[1..] {
            // a run longer than the whole grid means a corrupt chain; clamp
            let run = key.x.abs().max(key.y.abs()).min(width * height);
            let (sx, sy) = (key.x.signum(), key.y.signum());
            for _ in 0..run {
                cell.x = (cell.x + sx).rem_euclid(width);
                cell.y = (cell.y + sy).rem_euclid(height);
                out.push(cell);
            }
        }
        out
    }

    /// Record a head move onto `new_head`. A straight continuation
    /// stretches the first key delta; a turn inserts a fresh unit delta
    /// behind the head.
    pub fn advance_head(&mut self, new_head: Coord, direction: Direction) {
        self.points[0] = new_head;
        if direction == self.head_direction && self.points.len() > 1 {
            let first = &mut self.points[1];
            if first.x == 0 {
                first.y += first.y.signum();
            } else {
                first.x += first.x.signum();
            }
        } else {
            self.points.insert(1, direction.tailward());
            self.head_direction = direction;
        }
    }

    /// Drop one cell from the tail end of the chain. The last key delta
    /// shrinks toward zero and is removed when both axes collapse.
    pub fn shrink_tail(&mut self) {
        let last = self.points.len() - 1;
        if last == 0 {
            return;
        }
        let point = &mut self.points[last];
        if point.x == 0 {
            point.y -= point.y.signum();
        } else {
            point.x -= point.x.signum();
        }
        if point.x == 0 && point.y == 0 {
            self.points.pop();
        }
    }

    /// Re-encode an absolute head-first cell walk back into a key-delta
    /// chain. Expanding with [`Snake::cells`] and compressing again yields
    /// the original chain.
    pub fn compress(
        player_id: PlayerId,
        direction: Direction,
        cells: &[Coord],
        width: i32,
        height: i32,
    ) -> Snake {
        let mut points = match cells.first() {
            Some(&head) => vec![head],
            None => Vec::new(),
        };
        let mut run: Option<Coord> = None;
        for pair in cells.windows(2) {
            let step = unit_step(pair[0], pair[1], width, height);
            match &mut run {
                Some(delta)
                    if (step.x != 0 && delta.y == 0 && delta.x.signum() == step.x)
                        || (step.y != 0 && delta.x == 0 && delta.y.signum() == step.y) =>
                {
                    delta.x += step.x;
                    delta.y += step.y;
                }
                _ => {
                    if let Some(done) = run.replace(step) {
                        points.push(done);
                    }
                }
            }
        }
        if let Some(done) = run {
            points.push(done);
        }
        Snake {
            player_id,
            state: SnakeState::Alive,
            head_direction: direction,
            points,
        }
    }
}

/// Unit vector from `from` to its grid neighbour `to`, undoing torus wrap.
fn unit_step(from: Coord, to: Coord, width: i32, height: i32) -> Coord {
    let mut dx = to.x - from.x;
    let mut dy = to.y - from.y;
    if dx > 1 {
        dx -= width;
    }
    if dx < -1 {
        dx += width;
    }
    if dy > 1 {
        dy -= height;
    }
    if dy < -1 {
        dy += height;
    }
    Coord::new(dx, dy)
}

/// One full authoritative snapshot. Receivers keep only the highest
/// `order` seen and ignore anything not strictly newer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub order: u32,
    pub snakes: Vec<Snake>,
    pub food: Vec<Coord>,
    pub players: Vec<Player>,
    pub config: GameConfig,
}
