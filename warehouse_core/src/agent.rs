use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    Direction, EntityId, Position,
    hazard::hazard_zone,
    map::{Bounds, ObstacleSet},
    planner::{
        CarryStatus, DEFAULT_PENALTY_COST, PlannerError, PlannerState, RoutePlanner,
        manhattan_distance,
    },
};

/// Represents actions an agent can decide to take. Exactly one per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// No-op.
    Wait,
    Move(Direction),
    Pick,
    Deliver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryReading {
    pub level: u32,
    pub capacity: u32,
}

/// What the environment shows the agent at the start of a tick.
///
/// Everything is an owned copy: the agent may keep it, but it goes stale as
/// soon as the tick completes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Perception {
    pub position: Position,
    pub carrying: bool,
    pub battery: Option<BatteryReading>,
    /// Every shelf cell with its stock. Zero-stock shelves are walls.
    pub shelves: BTreeMap<Position, u32>,
    pub hazards: Vec<Position>,
    pub chargers: Vec<Position>,
    pub penalty_zones: Vec<Position>,
}

/// Trait defining the behavior of an agent.
/// Agents decide which action to take based on the latest perception.
pub trait Agent {
    /// Returns the unique ID of this agent.
    fn id(&self) -> EntityId;

    /// Determines the action the agent wants to perform this tick.
    ///
    /// Errors are contract violations only; an unreachable goal is handled
    /// internally.
    fn get_action(&mut self, perception: &Perception) -> Result<Action, PlannerError>;

    /// Points the agent at a new delivery destination (or none). Any
    /// in-flight plan is discarded so the next tick replans.
    fn assign_target(&mut self, target: Option<Position>);

    /// Whether the agent has proven it can make no further progress.
    fn mission_impossible(&self) -> bool {
        false
    }
}

/// When the agent goes looking for stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dispatch {
    /// Always fetch while stock remains; deliver to a fixed point.
    Continuous,
    /// Fetch only once a delivery target has been assigned; otherwise head home.
    OnDemand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdleReason {
    NoWork,
    /// Terminal: a target was proven sealed. No further work is attempted.
    MissionImpossible,
}

/// Controller mode, evaluated once per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Idle(IdleReason),
    SeekingItem { shelf: Position },
    Delivering { target: Position },
    Recharging { station: Position },
    Returning { home: Position },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    pub dispatch: Dispatch,
    /// Home base for the `Returning` mode.
    pub home: Option<Position>,
    /// Battery level at or below which work is abandoned to recharge.
    pub battery_critical: u32,
    pub penalty_cost: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            dispatch: Dispatch::Continuous,
            home: None,
            battery_critical: 0,
            penalty_cost: DEFAULT_PENALTY_COST,
        }
    }
}

/// Goal-directed picking agent: fetches stock and brings it to the delivery
/// target, replanning whenever the world invalidates its plan.
#[derive(Debug)]
pub struct PickerAgent {
    id: EntityId,
    bounds: Bounds,
    config: ControllerConfig,
    mode: Mode,
    plan: VecDeque<Action>,
    shelf_memory: BTreeMap<Position, u32>,
    delivery_target: Option<Position>,
    unreachable: BTreeSet<Position>,
}

impl PickerAgent {
    pub fn new(
        id: EntityId,
        bounds: Bounds,
        delivery_target: Option<Position>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            id,
            bounds,
            config,
            mode: Mode::Idle(IdleReason::NoWork),
            plan: VecDeque::new(),
            shelf_memory: BTreeMap::new(),
            delivery_target,
            unreachable: BTreeSet::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn plan(&self) -> &VecDeque<Action> {
        &self.plan
    }

    pub fn delivery_target(&self) -> Option<Position> {
        self.delivery_target
    }

    /// Shelves proven unreachable for the rest of the run.
    pub fn unreachable_shelves(&self) -> &BTreeSet<Position> {
        &self.unreachable
    }

    fn battery_critical(&self, perception: &Perception) -> bool {
        perception
            .battery
            .is_some_and(|b| b.level <= self.config.battery_critical)
    }

    /// Shelf cells (minus `except`) plus the hazard zone.
    fn obstacles(&self, except: Option<Position>, zone: &HashSet<Position>) -> ObstacleSet {
        let mut obstacles = ObstacleSet::new(self.bounds);
        obstacles.extend(self.shelf_memory.keys().copied().filter(|p| Some(*p) != except));
        obstacles.extend(zone.iter().copied());
        obstacles
    }

    fn plan_route(
        &self,
        perception: &Perception,
        obstacles: ObstacleSet,
        target: Position,
        status: CarryStatus,
    ) -> Result<Option<Vec<Direction>>, PlannerError> {
        RoutePlanner::new(PlannerState::new(perception.position, status), obstacles)
            .with_penalty_zones(perception.penalty_zones.iter().copied(), self.config.penalty_cost)
            .with_goal(target)
            .plan()
    }

    /// Replaces the plan with `moves` (plus an optional closing interaction)
    /// and returns its first action.
    fn adopt(&mut self, moves: Vec<Direction>, finish: Option<Action>) -> Action {
        self.plan = moves.into_iter().map(Action::Move).collect();
        self.plan.extend(finish);
        debug!(agent = self.id, steps = self.plan.len(), mode = ?self.mode, "adopted plan");
        self.plan.pop_front().unwrap_or(Action::Wait)
    }

    /// Step 1: whether the queued plan must be dropped before executing it.
    fn should_abort(
        &self,
        next: Action,
        perception: &Perception,
        zone: &HashSet<Position>,
    ) -> bool {
        if let Action::Move(direction) = next {
            if perception
                .position
                .step(direction)
                .is_some_and(|p| zone.contains(&p))
            {
                debug!(agent = self.id, ?direction, "next step enters hazard zone; dropping plan");
                return true;
            }
        }
        let recharging = matches!(self.mode, Mode::Recharging { .. });
        if !recharging && self.battery_critical(perception) && !perception.chargers.is_empty() {
            debug!(agent = self.id, "battery critical; dropping plan");
            return true;
        }
        false
    }

    /// Step 3: route to the nearest charger when the battery demands it.
    fn recharge(
        &mut self,
        perception: &Perception,
        zone: &HashSet<Position>,
    ) -> Result<Option<Action>, PlannerError> {
        let Some(battery) = perception.battery else {
            return Ok(None);
        };
        let recharging = matches!(self.mode, Mode::Recharging { .. });
        if perception.chargers.is_empty() || !(recharging || self.battery_critical(perception)) {
            return Ok(None);
        }

        if perception.chargers.contains(&perception.position) {
            if battery.level < battery.capacity {
                self.mode = Mode::Recharging {
                    station: perception.position,
                };
                return Ok(Some(Action::Wait));
            }
            info!(agent = self.id, level = battery.level, "battery full; resuming work");
            self.mode = Mode::Idle(IdleReason::NoWork);
            return Ok(None);
        }

        let Some(station) = perception
            .chargers
            .iter()
            .copied()
            .min_by_key(|c| (manhattan_distance(perception.position, *c), *c))
        else {
            return Ok(None);
        };
        let status = if perception.carrying {
            CarryStatus::Carrying
        } else {
            CarryStatus::Seeking
        };
        match self.plan_route(perception, self.obstacles(None, zone), station, status)? {
            Some(moves) => {
                self.mode = Mode::Recharging { station };
                Ok(Some(self.adopt(moves, None)))
            }
            None => {
                warn!(agent = self.id, x = station.x, y = station.y, "charger unreachable");
                Ok(None)
            }
        }
    }

    /// Step 4: carry the held item to the delivery target.
    fn deliver(
        &mut self,
        perception: &Perception,
        zone: &HashSet<Position>,
    ) -> Result<Action, PlannerError> {
        let Some(target) = self.delivery_target else {
            return self.return_home(perception, zone);
        };

        let obstacles = self.obstacles(None, zone);
        if let Some(moves) =
            self.plan_route(perception, obstacles.clone(), target, CarryStatus::Carrying)?
        {
            self.mode = Mode::Delivering { target };
            return Ok(self.adopt(moves, Some(Action::Deliver)));
        }

        // Target sealed: head for an open cardinal neighbour and wait there.
        let mut statics = ObstacleSet::new(self.bounds);
        statics.extend(self.shelf_memory.keys().copied());
        let mut docks = statics.free_neighbors(target);
        docks.sort_by_key(|p| (manhattan_distance(perception.position, *p), *p));

        for dock in docks {
            if let Some(moves) =
                self.plan_route(perception, obstacles.clone(), dock, CarryStatus::Carrying)?
            {
                warn!(
                    agent = self.id,
                    target = ?target,
                    dock = ?dock,
                    "delivery target sealed; routing to free neighbour"
                );
                self.mode = Mode::Delivering { target };
                return Ok(self.adopt(moves, None));
            }
        }

        warn!(agent = self.id, target = ?target, "delivery target unreachable; mission impossible");
        self.mode = Mode::Idle(IdleReason::MissionImpossible);
        self.plan.clear();
        Ok(Action::Wait)
    }

    /// Step 5/6: pick the nearest reachable stocked shelf.
    fn seek(
        &mut self,
        perception: &Perception,
        zone: &HashSet<Position>,
    ) -> Result<Action, PlannerError> {
        if self.config.dispatch == Dispatch::OnDemand && self.delivery_target.is_none() {
            return self.return_home(perception, zone);
        }

        let mut candidates: Vec<Position> = self
            .shelf_memory
            .iter()
            .filter(|(pos, qty)| **qty > 0 && !self.unreachable.contains(pos))
            .map(|(pos, _)| *pos)
            .collect();
        if candidates.is_empty() {
            self.mode = Mode::Idle(IdleReason::NoWork);
            return Ok(Action::Wait);
        }
        candidates.sort_by_key(|p| (manhattan_distance(perception.position, *p), *p));

        for shelf in candidates {
            let obstacles = self.obstacles(Some(shelf), zone);
            match self.plan_route(perception, obstacles, shelf, CarryStatus::Seeking)? {
                Some(moves) => {
                    self.mode = Mode::SeekingItem { shelf };
                    return Ok(self.adopt(moves, Some(Action::Pick)));
                }
                None => {
                    warn!(agent = self.id, shelf = ?shelf, "shelf unreachable; ignoring it");
                    self.unreachable.insert(shelf);
                }
            }
        }

        warn!(agent = self.id, "no stocked shelf is reachable; mission impossible");
        self.mode = Mode::Idle(IdleReason::MissionImpossible);
        Ok(Action::Wait)
    }

    /// Between jobs: walk back to the home base, then idle.
    fn return_home(
        &mut self,
        perception: &Perception,
        zone: &HashSet<Position>,
    ) -> Result<Action, PlannerError> {
        let Some(home) = self.config.home.filter(|h| *h != perception.position) else {
            self.mode = Mode::Idle(IdleReason::NoWork);
            return Ok(Action::Wait);
        };
        let status = if perception.carrying {
            CarryStatus::Carrying
        } else {
            CarryStatus::Seeking
        };
        match self.plan_route(perception, self.obstacles(None, zone), home, status)? {
            Some(moves) => {
                self.mode = Mode::Returning { home };
                Ok(self.adopt(moves, None))
            }
            None => {
                self.mode = Mode::Idle(IdleReason::NoWork);
                Ok(Action::Wait)
            }
        }
    }
}

impl Agent for PickerAgent {
    fn id(&self) -> EntityId {
        self.id
    }

    fn get_action(&mut self, perception: &Perception) -> Result<Action, PlannerError> {
        // Refresh memory of stock; may already be stale by the time we act on it.
        self.shelf_memory = perception.shelves.clone();

        if self.mode == Mode::Idle(IdleReason::MissionImpossible) {
            return Ok(Action::Wait);
        }

        let zone = hazard_zone(&perception.hazards, self.bounds);

        // 1. Drop a plan the world has invalidated
        if let Some(next) = self.plan.front().copied() {
            if self.should_abort(next, perception, &zone) {
                self.plan.clear();
            }
        }

        // 2. Follow existing plan if available
        if let Some(action) = self.plan.pop_front() {
            return Ok(action);
        }

        // 3. Survive first
        if let Some(action) = self.recharge(perception, &zone)? {
            return Ok(action);
        }

        // 4. Deliver what we hold, 5. otherwise fetch
        if perception.carrying {
            self.deliver(perception, &zone)
        } else {
            self.seek(perception, &zone)
        }
    }

    fn assign_target(&mut self, target: Option<Position>) {
        info!(agent = self.id, target = ?target, "delivery target reassigned");
        self.delivery_target = target;
        self.plan.clear();
    }

    fn mission_impossible(&self) -> bool {
        self.mode == Mode::Idle(IdleReason::MissionImpossible)
    }
}
