//! The cell grid and its invariant-preserving mutators.
//!
//! Exactly one owner (the master's simulation engine) mutates an arena;
//! everything else only observes the occupancy view. Coordinates wrap:
//! a step off one edge reappears on the opposite edge.

use crate::types::{Coord, Direction, PlayerId};
use crate::SPAWN_BASE_SIZE;
use rand::Rng;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    Empty,
    Food,
    SnakeBody { owner: PlayerId },
    SnakeHead { direction: Direction, owner: PlayerId },
}

impl Cell {
    pub fn is_snake(self) -> bool {
        matches!(self, Cell::SnakeBody { .. } | Cell::SnakeHead { .. })
    }

    pub fn is_food(self) -> bool {
        matches!(self, Cell::Food)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ArenaError {
    /// The field has no free spawn square left. Expected when the grid is
    /// crowded; callers surface it to the requester and move on.
    #[error("Lack of space on the field.")]
    NoSpaceAvailable,
    /// Every placement direction around a spawn center was blocked by
    /// food. The spawn-base search excludes this, so hitting it means the
    /// grid state is corrupt.
    #[error("no free body cell around spawn center")]
    SpawnConflict,
}

#[derive(Debug, Clone)]
pub struct Arena {
    width: i32,
    height: i32,
    base_size: i32,
    cells: Vec<Cell>,
}

impl Arena {
    pub fn new(width: i32, height: i32) -> Arena {
        Arena {
            width,
            height,
            base_size: SPAWN_BASE_SIZE,
            cells: vec![Cell::Empty; (width * height) as usize],
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Per-cell occupancy view for painting.
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn get(&self, index: usize) -> Cell {
        self.cells[index]
    }

    pub fn set_empty(&mut self, index: usize) {
        self.cells[index] = Cell::Empty;
    }

    pub fn set_food(&mut self, index: usize) {
        self.cells[index] = Cell::Food;
    }

    pub fn set_snake_body(&mut self, index: usize, owner: PlayerId) {
        self.cells[index] = Cell::SnakeBody { owner };
    }

    pub fn set_snake_head(&mut self, index: usize, direction: Direction, owner: PlayerId) {
        self.cells[index] = Cell::SnakeHead { direction, owner };
    }

    /// Reset every cell to empty.
    pub fn clear(&mut self) {
        self.cells.fill(Cell::Empty);
    }

    /// Row-major index of a coordinate, normalized onto the torus first so
    /// wire-supplied coordinates cannot index out of bounds.
    pub fn index_of(&self, coord: Coord) -> usize {
        let x = coord.x.rem_euclid(self.width);
        let y = coord.y.rem_euclid(self.height);
        (y * self.width + x) as usize
    }

    pub fn coord_of(&self, index: usize) -> Coord {
        Coord::new(index as i32 % self.width, index as i32 / self.width)
    }

    /// One wrapped step from `coord`.
    pub fn step(&self, coord: Coord, direction: Direction) -> Coord {
        coord.step(direction, self.width, self.height)
    }

    /// Indices of all currently empty cells.
    pub fn empty_indices(&self) -> Vec<usize> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| **cell == Cell::Empty)
            .map(|(index, _)| index)
            .collect()
    }

    /// Row-major scan for a `base_size` square free of snake cells whose
    /// center neither sits on food nor has its full cross (center ± 1 on
    /// each axis) saturated with food. Returns the square's top-left index.
    pub fn find_spawn_base(&self) -> Result<usize, ArenaError> {
        for y in 0..=(self.height - self.base_size) {
            'candidate: for x in 0..=(self.width - self.base_size) {
                for dy in 0..self.base_size {
                    for dx in 0..self.base_size {
                        if self.cells[((y + dy) * self.width + x + dx) as usize].is_snake() {
                            continue 'candidate;
                        }
                    }
                }
                let base = (y * self.width + x) as usize;
                let center = self.base_center(base);
                let cross_full = [
                    center - 1,
                    center + 1,
                    center - self.width as usize,
                    center + self.width as usize,
                ]
                .iter()
                .all(|&index| self.cells[index].is_food());
                if !cross_full && !self.cells[center].is_food() {
                    return Ok(base);
                }
            }
        }
        Err(ArenaError::NoSpaceAvailable)
    }

    /// Center cell index of the spawn square starting at `base`.
    pub fn base_center(&self, base: usize) -> usize {
        base + (self.base_size / 2 * (self.width + 1)) as usize
    }

    /// Place a two-cell snake at the center of the square at `base`,
    /// trying the four headings in a randomized rotation and taking the
    /// first whose body cell is not food. Returns the head index and the
    /// chosen heading.
    pub fn position_new_snake<R: Rng>(
        &mut self,
        base: usize,
        owner: PlayerId,
        rng: &mut R,
    ) -> Result<(usize, Direction), ArenaError> {
        const ROTATION: [Direction; 4] = [
            Direction::Up,
            Direction::Right,
            Direction::Down,
            Direction::Left,
        ];
        let center_index = self.base_center(base);
        let center = self.coord_of(center_index);
        let start = rng.gen_range(0..4);
        for turn in 0..4 {
            let direction = ROTATION[(start + turn) % 4];
            let body = self.step(center, direction.opposite());
            let body_index = self.index_of(body);
            if !self.cells[body_index].is_food() {
                self.set_snake_head(center_index, direction, owner);
                self.set_snake_body(body_index, owner);
                return Ok((center_index, direction));
            }
        }
        Err(ArenaError::SpawnConflict)
    }
}
