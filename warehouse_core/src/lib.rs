use serde::{Deserialize, Serialize};

pub mod agent;
pub mod config;
pub mod environment;
pub mod hazard;
pub mod map;
pub mod planner;
pub mod search;
pub mod session;
pub mod simulation;

/// Unique identifier for entities (agents, customers, intruders).
pub type EntityId = usize;

/// Represents a 2D coordinate on the warehouse floor.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Position {
    pub x: usize,
    pub y: usize,
}

impl Position {
    pub const fn new(x: usize, y: usize) -> Self {
        Position { x, y }
    }

    /// Returns the neighbouring coordinate in `direction`, or `None` when it
    /// would underflow. Upper bounds are checked by the caller against its grid.
    pub fn step(self, direction: Direction) -> Option<Position> {
        let (dx, dy) = direction.offset();
        Some(Position {
            x: self.x.checked_add_signed(dx)?,
            y: self.y.checked_add_signed(dy)?,
        })
    }

    /// The four cardinal neighbours that do not underflow, in `Direction::ALL` order.
    pub fn neighbors(self) -> impl Iterator<Item = Position> {
        Direction::ALL.into_iter().filter_map(move |d| self.step(d))
    }
}

/// Cardinal movement directions. North is towards `y = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    North,
    South,
    West,
    East,
}

impl Direction {
    /// Expansion order used everywhere a neighbourhood is enumerated.
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::South,
        Direction::West,
        Direction::East,
    ];

    #[inline]
    pub fn offset(self) -> (isize, isize) {
        match self {
            Direction::North => (0, -1),
            Direction::South => (0, 1),
            Direction::West => (-1, 0),
            Direction::East => (1, 0),
        }
    }

    /// The direction that moves from `src` to the adjacent `dst`, if they are
    /// cardinal neighbours.
    pub fn between(src: Position, dst: Position) -> Option<Direction> {
        Direction::ALL
            .into_iter()
            .find(|d| src.step(*d) == Some(dst))
    }
}
