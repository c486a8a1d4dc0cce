use std::collections::HashSet;
use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

use crate::Position;

/// Represents errors that can occur within the grid operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("Coordinates ({x}, {y}) are out of bounds for grid size ({width}, {height})")]
    OutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    },
    #[error("Grid size ({width}, {height}) is empty or overflows")]
    InvalidSize { width: usize, height: usize },
}

/// Width and height of the warehouse floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub width: usize,
    pub height: usize,
}

impl Bounds {
    pub const fn new(width: usize, height: usize) -> Self {
        Bounds { width, height }
    }

    /// A cell is valid iff `x < width` and `y < height`.
    #[inline]
    pub fn contains(&self, position: Position) -> bool {
        position.x < self.width && position.y < self.height
    }

    /// In-bounds cardinal neighbours of `position`.
    pub fn neighbors(self, position: Position) -> impl Iterator<Item = Position> {
        position.neighbors().filter(move |p| self.contains(*p))
    }
}

/// Static kind of a floor cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Tile {
    #[default]
    Floor,
    /// Storage cell. Blocks traversal except when it is the active target.
    Shelf,
    /// Recharge station for the survival variant.
    Charger,
    /// Radioactive cell: traversable, but expensive to cross.
    Penalty,
}

/// A generic 2D grid structure.
///
/// Stores elements of type `T` in a flat vector using row-major order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid<T> {
    bounds: Bounds,
    cells: Vec<T>,
}

impl<T> Grid<T> {
    /// Creates a new grid with the specified dimensions, filled with default values.
    pub fn new(width: usize, height: usize) -> Result<Self, GridError>
    where
        T: Default + Clone,
    {
        let size = width
            .checked_mul(height)
            .filter(|size| *size > 0)
            .ok_or(GridError::InvalidSize { width, height })?;
        Ok(Grid {
            bounds: Bounds::new(width, height),
            cells: vec![T::default(); size],
        })
    }

    #[inline]
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.bounds.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.bounds.height
    }

    #[inline]
    fn index_of(&self, position: Position) -> Option<usize> {
        self.bounds
            .contains(position)
            .then(|| position.y * self.bounds.width + position.x)
    }

    /// Gets an immutable reference to the cell at `position`, `None` if out of bounds.
    pub fn get(&self, position: Position) -> Option<&T> {
        self.index_of(position).and_then(|i| self.cells.get(i))
    }

    /// Sets the value of the cell at `position`.
    pub fn set(&mut self, position: Position, value: T) -> Result<(), GridError> {
        let index = self.index_of(position).ok_or(GridError::OutOfBounds {
            x: position.x,
            y: position.y,
            width: self.bounds.width,
            height: self.bounds.height,
        })?;
        self.cells[index] = value;
        Ok(())
    }

    /// Returns an iterator that yields `(Position, &T)` for each cell in row-major order.
    pub fn enumerate(&self) -> impl Iterator<Item = (Position, &T)> {
        let width = self.bounds.width;
        self.cells
            .iter()
            .enumerate()
            .map(move |(index, cell)| (Position::new(index % width, index / width), cell))
    }
}

impl<T> Index<Position> for Grid<T> {
    type Output = T;

    #[inline]
    fn index(&self, position: Position) -> &Self::Output {
        match self.index_of(position) {
            Some(idx) => &self.cells[idx],
            None => panic!(
                "Grid index ({}, {}) out of bounds for grid size ({}, {})",
                position.x, position.y, self.bounds.width, self.bounds.height
            ),
        }
    }
}

impl<T> IndexMut<Position> for Grid<T> {
    #[inline]
    fn index_mut(&mut self, position: Position) -> &mut Self::Output {
        let Bounds { width, height } = self.bounds;
        match self.index_of(position) {
            Some(idx) => &mut self.cells[idx],
            None => panic!(
                "Grid index ({}, {}) out of bounds for grid size ({}, {})",
                position.x, position.y, width, height
            ),
        }
    }
}

/// Cells that block traversal for one particular search.
///
/// The set may legally contain the search target: a cell can be a shelf and
/// the thing being walked up to at the same time, so the target is always
/// enterable regardless of membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObstacleSet {
    bounds: Bounds,
    blocked: HashSet<Position>,
}

impl ObstacleSet {
    pub fn new(bounds: Bounds) -> Self {
        ObstacleSet {
            bounds,
            blocked: HashSet::new(),
        }
    }

    #[inline]
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn block(&mut self, position: Position) {
        self.blocked.insert(position);
    }

    pub fn unblock(&mut self, position: Position) {
        self.blocked.remove(&position);
    }

    pub fn contains(&self, position: Position) -> bool {
        self.blocked.contains(&position)
    }

    /// Whether `position` may be entered by a search heading for `target`.
    #[inline]
    pub fn is_enterable(&self, position: Position, target: Position) -> bool {
        self.bounds.contains(position) && (position == target || !self.blocked.contains(&position))
    }

    /// In-bounds cardinal neighbours of `position` that are not blocked.
    pub fn free_neighbors(&self, position: Position) -> Vec<Position> {
        self.bounds
            .neighbors(position)
            .filter(|p| !self.blocked.contains(p))
            .collect()
    }
}

impl Extend<Position> for ObstacleSet {
    fn extend<I: IntoIterator<Item = Position>>(&mut self, iter: I) {
        self.blocked.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_rejects_empty_dimensions() {
        assert_eq!(
            Grid::<Tile>::new(0, 4),
            Err(GridError::InvalidSize {
                width: 0,
                height: 4
            })
        );
    }

    #[test]
    fn grid_set_and_enumerate_row_major() {
        let mut grid: Grid<Tile> = Grid::new(3, 2).unwrap();
        grid.set(Position::new(2, 1), Tile::Shelf).unwrap();
        assert_eq!(grid[Position::new(2, 1)], Tile::Shelf);
        assert!(grid.set(Position::new(3, 0), Tile::Shelf).is_err());

        let shelves: Vec<Position> = grid
            .enumerate()
            .filter(|(_, t)| **t == Tile::Shelf)
            .map(|(p, _)| p)
            .collect();
        assert_eq!(shelves, vec![Position::new(2, 1)]);
    }

    #[test]
    fn target_is_enterable_even_when_blocked() {
        let mut obstacles = ObstacleSet::new(Bounds::new(5, 5));
        let shelf = Position::new(2, 2);
        obstacles.block(shelf);

        assert!(!obstacles.is_enterable(shelf, Position::new(4, 4)));
        assert!(obstacles.is_enterable(shelf, shelf));
        assert!(!obstacles.is_enterable(Position::new(5, 0), Position::new(5, 0)));
    }

    #[test]
    fn free_neighbors_skip_blocked_and_out_of_bounds() {
        let mut obstacles = ObstacleSet::new(Bounds::new(3, 3));
        obstacles.block(Position::new(1, 0));
        let free = obstacles.free_neighbors(Position::new(0, 0));
        assert_eq!(free, vec![Position::new(0, 1)]);
    }
}
