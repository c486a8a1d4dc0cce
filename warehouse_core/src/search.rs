//! Generic best-first (A*) search over an explicit state graph.
//!
//! A [`SearchProblem`] describes the graph implicitly through its actions and
//! transition function. [`astar_search`] explores it exhaustively, so a `None`
//! result proves the goal is unreachable.

use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap},
    hash::Hash,
};

/// A search problem in the classic initial-state / actions / result / goal-test shape.
pub trait SearchProblem {
    type State: Clone + Eq + Hash;
    type Action: Clone;

    fn initial(&self) -> Self::State;

    fn actions(&self, state: &Self::State) -> Vec<Self::Action>;

    fn result(&self, state: &Self::State, action: &Self::Action) -> Self::State;

    fn goal_test(&self, state: &Self::State) -> bool;

    /// Cost of reaching `to` from `from` through `action`. Must be positive.
    fn step_cost(&self, _from: &Self::State, _action: &Self::Action, _to: &Self::State) -> u32 {
        1
    }

    /// Estimated remaining cost. Must never overestimate for the result to be optimal.
    fn heuristic(&self, _state: &Self::State) -> u32 {
        0
    }
}

struct Node<S, A> {
    state: S,
    parent: Option<usize>,
    action: Option<A>,
    cost: u32,
}

// For priority queue
#[derive(Clone, Copy, Eq, PartialEq)]
struct Frontier {
    priority: u32,
    heuristic: u32,
    sequence: usize,
    node: usize,
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap behavior; ties prefer the node closer
        // to the goal, then the one discovered first.
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.heuristic.cmp(&self.heuristic))
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Runs A* on `problem` and returns the action sequence of a cheapest path
/// to a goal state, or `None` once the reachable space has been exhausted.
///
/// An empty sequence means the initial state already satisfies the goal test.
pub fn astar_search<P: SearchProblem>(problem: &P) -> Option<Vec<P::Action>> {
    let start = problem.initial();
    let mut nodes: Vec<Node<P::State, P::Action>> = Vec::new();
    let mut best_cost: HashMap<P::State, u32> = HashMap::new();
    let mut frontier = BinaryHeap::new();
    let mut sequence = 0usize;

    let h = problem.heuristic(&start);
    best_cost.insert(start.clone(), 0);
    nodes.push(Node {
        state: start,
        parent: None,
        action: None,
        cost: 0,
    });
    frontier.push(Frontier {
        priority: h,
        heuristic: h,
        sequence,
        node: 0,
    });

    while let Some(Frontier { node: current, .. }) = frontier.pop() {
        let (state, cost) = {
            let node = &nodes[current];
            (node.state.clone(), node.cost)
        };

        // Skip stale entries superseded by a cheaper route.
        if best_cost.get(&state).is_some_and(|best| *best < cost) {
            continue;
        }

        if problem.goal_test(&state) {
            return Some(reconstruct(&nodes, current));
        }

        for action in problem.actions(&state) {
            let next = problem.result(&state, &action);
            let new_cost = cost.saturating_add(problem.step_cost(&state, &action, &next));

            if best_cost.get(&next).is_none_or(|known| new_cost < *known) {
                best_cost.insert(next.clone(), new_cost);
                let h = problem.heuristic(&next);
                sequence += 1;
                nodes.push(Node {
                    state: next,
                    parent: Some(current),
                    action: Some(action),
                    cost: new_cost,
                });
                frontier.push(Frontier {
                    priority: new_cost.saturating_add(h),
                    heuristic: h,
                    sequence,
                    node: nodes.len() - 1,
                });
            }
        }
    }

    None
}

fn reconstruct<S, A: Clone>(nodes: &[Node<S, A>], goal: usize) -> Vec<A> {
    let mut actions = Vec::new();
    let mut current = goal;
    while let Some(parent) = nodes[current].parent {
        if let Some(action) = &nodes[current].action {
            actions.push(action.clone());
        }
        current = parent;
    }
    actions.reverse();
    actions
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Walk along a number line from `start` to `goal`, with an optional wall.
    struct Line {
        start: i32,
        goal: i32,
        wall: Option<i32>,
    }

    impl SearchProblem for Line {
        type State = i32;
        type Action = i32;

        fn initial(&self) -> i32 {
            self.start
        }

        fn actions(&self, state: &i32) -> Vec<i32> {
            [-1, 1]
                .into_iter()
                .filter(|d| (-10..=10).contains(&(state + d)) && Some(state + d) != self.wall)
                .collect()
        }

        fn result(&self, state: &i32, action: &i32) -> i32 {
            state + action
        }

        fn goal_test(&self, state: &i32) -> bool {
            *state == self.goal
        }

        fn heuristic(&self, state: &i32) -> u32 {
            state.abs_diff(self.goal)
        }
    }

    #[test]
    fn finds_straight_line() {
        let path = astar_search(&Line {
            start: 0,
            goal: 3,
            wall: None,
        });
        assert_eq!(path, Some(vec![1, 1, 1]));
    }

    #[test]
    fn start_at_goal_yields_empty_plan() {
        let path = astar_search(&Line {
            start: 4,
            goal: 4,
            wall: None,
        });
        assert_eq!(path, Some(vec![]));
    }

    #[test]
    fn exhausts_space_before_failing() {
        let path = astar_search(&Line {
            start: 0,
            goal: 5,
            wall: Some(2),
        });
        assert_eq!(path, None);
    }
}
