//! Navigation formulated as a search problem.
//!
//! The planner only knows about cardinal moves. Interaction actions (pick,
//! deliver) are appended by the caller once a route exists, since modelling
//! them in the search would duplicate every state without helping route-finding.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{
    Direction, Position,
    map::ObstacleSet,
    search::{SearchProblem, astar_search},
};

/// Cost of a move that lands in a penalty cell, unless configured otherwise.
pub const DEFAULT_PENALTY_COST: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PlannerError {
    /// The planner was asked to search without an installed goal test. This is
    /// a caller bug and is never reported as "no path".
    #[error("route planner invoked without a goal test")]
    MissingGoalTest,
}

/// Payload carried through the search unchanged, for the caller's benefit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CarryStatus {
    Seeking,
    Carrying,
}

/// Search state: where the agent is, plus what it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlannerState {
    pub position: Position,
    pub status: CarryStatus,
}

impl PlannerState {
    pub fn new(position: Position, status: CarryStatus) -> Self {
        PlannerState { position, status }
    }
}

/// Returns manhattan distance between two positions
#[inline]
pub fn manhattan_distance(a: Position, b: Position) -> u32 {
    let distance = a.x.abs_diff(b.x) + a.y.abs_diff(b.y);
    u32::try_from(distance).unwrap_or(u32::MAX)
}

/// One routing query: start configuration, blocking cells, optional penalty
/// cells, and a goal cell installed through [`RoutePlanner::with_goal`].
#[derive(Debug, Clone)]
pub struct RoutePlanner {
    start: PlannerState,
    obstacles: ObstacleSet,
    penalty_zones: HashSet<Position>,
    penalty_cost: u32,
    goal: Option<Position>,
}

impl RoutePlanner {
    pub fn new(start: PlannerState, obstacles: ObstacleSet) -> Self {
        RoutePlanner {
            start,
            obstacles,
            penalty_zones: HashSet::new(),
            penalty_cost: DEFAULT_PENALTY_COST,
            goal: None,
        }
    }

    /// Moves landing in any of `cells` cost `cost` instead of 1.
    pub fn with_penalty_zones<I>(mut self, cells: I, cost: u32) -> Self
    where
        I: IntoIterator<Item = Position>,
    {
        self.penalty_zones = cells.into_iter().collect();
        self.penalty_cost = cost.max(1);
        self
    }

    /// Installs the goal test "(x, y) equals `target`".
    pub fn with_goal(mut self, target: Position) -> Self {
        self.goal = Some(target);
        self
    }

    /// Solves the query.
    ///
    /// `Ok(Some(moves))` is an optimal route (empty when already at the goal),
    /// `Ok(None)` proves the goal unreachable, and `Err` flags a missing goal test.
    pub fn plan(&self) -> Result<Option<Vec<Direction>>, PlannerError> {
        let goal = self.goal.ok_or(PlannerError::MissingGoalTest)?;
        let problem = NavigationProblem {
            planner: self,
            goal,
        };
        Ok(astar_search(&problem))
    }

    /// Total cost of following `moves` from the start state under this query's cost model.
    pub fn route_cost(&self, moves: &[Direction]) -> Option<u32> {
        let mut position = self.start.position;
        let mut total = 0u32;
        for direction in moves {
            position = position.step(*direction)?;
            total = total.saturating_add(self.cost_of_entering(position));
        }
        Some(total)
    }

    #[inline]
    fn cost_of_entering(&self, position: Position) -> u32 {
        if self.penalty_zones.contains(&position) {
            self.penalty_cost
        } else {
            1
        }
    }
}

struct NavigationProblem<'a> {
    planner: &'a RoutePlanner,
    goal: Position,
}

impl SearchProblem for NavigationProblem<'_> {
    type State = PlannerState;
    type Action = Direction;

    fn initial(&self) -> PlannerState {
        self.planner.start
    }

    fn actions(&self, state: &PlannerState) -> Vec<Direction> {
        Direction::ALL
            .into_iter()
            .filter(|direction| {
                state
                    .position
                    .step(*direction)
                    .is_some_and(|next| self.planner.obstacles.is_enterable(next, self.goal))
            })
            .collect()
    }

    fn result(&self, state: &PlannerState, action: &Direction) -> PlannerState {
        // `actions` only yields directions whose step exists.
        let position = state.position.step(*action).unwrap_or(state.position);
        PlannerState {
            position,
            status: state.status,
        }
    }

    fn goal_test(&self, state: &PlannerState) -> bool {
        state.position == self.goal
    }

    fn step_cost(&self, _from: &PlannerState, _action: &Direction, to: &PlannerState) -> u32 {
        self.planner.cost_of_entering(to.position)
    }

    fn heuristic(&self, state: &PlannerState) -> u32 {
        manhattan_distance(state.position, self.goal)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use rand::{Rng, SeedableRng, rngs::StdRng};

    use super::*;
    use crate::map::Bounds;

    fn seeking(x: usize, y: usize) -> PlannerState {
        PlannerState::new(Position::new(x, y), CarryStatus::Seeking)
    }

    /// Reference breadth-first distance honouring the same enterability rule.
    fn bfs_distance(obstacles: &ObstacleSet, start: Position, goal: Position) -> Option<usize> {
        let mut seen = HashSet::from([start]);
        let mut queue = VecDeque::from([(start, 0usize)]);
        while let Some((current, distance)) = queue.pop_front() {
            if current == goal {
                return Some(distance);
            }
            for next in current.neighbors() {
                if obstacles.is_enterable(next, goal) && seen.insert(next) {
                    queue.push_back((next, distance + 1));
                }
            }
        }
        None
    }

    #[test]
    fn missing_goal_fails_loudly() {
        let planner = RoutePlanner::new(seeking(0, 0), ObstacleSet::new(Bounds::new(4, 4)));
        assert_eq!(planner.plan(), Err(PlannerError::MissingGoalTest));
    }

    #[test]
    fn already_at_goal_is_empty_plan() {
        let planner = RoutePlanner::new(seeking(2, 2), ObstacleSet::new(Bounds::new(4, 4)))
            .with_goal(Position::new(2, 2));
        assert_eq!(planner.plan(), Ok(Some(vec![])));
    }

    #[test]
    fn routes_around_wall_into_blocked_target() {
        // Wall at (1,0),(1,1),(1,2); target shelf (2,2) is itself in the obstacle set.
        let mut obstacles = ObstacleSet::new(Bounds::new(10, 10));
        obstacles.extend([
            Position::new(1, 0),
            Position::new(1, 1),
            Position::new(1, 2),
            Position::new(2, 2),
        ]);
        let planner = RoutePlanner::new(seeking(0, 0), obstacles).with_goal(Position::new(2, 2));
        let moves = planner.plan().unwrap().expect("route exists");
        // Down to (0,3), across to (2,3), up into (2,2).
        assert_eq!(moves.len(), 6);
        assert_eq!(moves.first(), Some(&Direction::South));
        assert_eq!(moves.last(), Some(&Direction::North));
    }

    #[test]
    fn sealed_target_is_unreachable() {
        let mut obstacles = ObstacleSet::new(Bounds::new(5, 5));
        let target = Position::new(2, 2);
        obstacles.extend(target.neighbors());
        let planner = RoutePlanner::new(seeking(0, 0), obstacles).with_goal(target);
        assert_eq!(planner.plan(), Ok(None));
    }

    #[test]
    fn heuristic_is_consistent_across_adjacent_states() {
        let goal = Position::new(3, 4);
        let obstacles = ObstacleSet::new(Bounds::new(8, 8));
        let planner = RoutePlanner::new(seeking(0, 0), obstacles).with_goal(goal);
        let problem = NavigationProblem {
            planner: &planner,
            goal,
        };
        for y in 0..8 {
            for x in 0..8 {
                let state = seeking(x, y);
                let h = problem.heuristic(&state);
                assert_eq!(h == 0, state.position == goal);
                for action in problem.actions(&state) {
                    let next = problem.result(&state, &action);
                    let cost = problem.step_cost(&state, &action, &next);
                    assert!(h <= cost + problem.heuristic(&next));
                }
            }
        }
        assert!(problem.heuristic(&seeking(0, 0)) > problem.heuristic(&seeking(1, 1)));
    }

    #[test]
    fn matches_breadth_first_distance_on_random_maps() {
        let mut rng = StdRng::seed_from_u64(7);
        let bounds = Bounds::new(9, 7);
        for _ in 0..200 {
            let mut obstacles = ObstacleSet::new(bounds);
            for y in 0..bounds.height {
                for x in 0..bounds.width {
                    if rng.random_bool(0.3) {
                        obstacles.block(Position::new(x, y));
                    }
                }
            }
            let start = Position::new(
                rng.random_range(0..bounds.width),
                rng.random_range(0..bounds.height),
            );
            let goal = Position::new(
                rng.random_range(0..bounds.width),
                rng.random_range(0..bounds.height),
            );
            obstacles.unblock(start);

            let state = PlannerState::new(start, CarryStatus::Carrying);
            let planner = RoutePlanner::new(state, obstacles.clone()).with_goal(goal);
            let expected = bfs_distance(&obstacles, start, goal);
            let found = planner.plan().unwrap();
            assert_eq!(found.as_ref().map(Vec::len), expected);

            if let Some(moves) = found {
                // The route is walkable and ends on the goal.
                let mut at = start;
                for m in &moves {
                    at = at.step(*m).unwrap();
                    assert!(obstacles.is_enterable(at, goal));
                }
                assert_eq!(at, goal);
            }
        }
    }

    #[test]
    fn identical_queries_give_identical_routes() {
        let mut obstacles = ObstacleSet::new(Bounds::new(6, 6));
        obstacles.extend([Position::new(2, 1), Position::new(2, 2), Position::new(3, 4)]);
        let build = || {
            RoutePlanner::new(seeking(0, 0), obstacles.clone())
                .with_penalty_zones([Position::new(1, 3)], DEFAULT_PENALTY_COST)
                .with_goal(Position::new(5, 5))
        };
        assert_eq!(build().plan(), build().plan());
    }

    #[test]
    fn penalty_cell_avoided_when_detour_is_cheaper() {
        // Corridor row y=0 from (0,0) to (4,0); penalty at (2,0). Detour via y=1 costs 6 < 8.
        let obstacles = ObstacleSet::new(Bounds::new(5, 2));
        let planner = RoutePlanner::new(seeking(0, 0), obstacles)
            .with_penalty_zones([Position::new(2, 0)], DEFAULT_PENALTY_COST)
            .with_goal(Position::new(4, 0));
        let moves = planner.plan().unwrap().unwrap();
        assert_eq!(planner.route_cost(&moves), Some(6));
        assert_eq!(moves.len(), 6);
    }
}
