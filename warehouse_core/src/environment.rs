use std::collections::BTreeMap;

use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    EntityId, Position,
    agent::{Action, BatteryReading, Perception},
    config::{BatteryConfig, CustomerConfig, SimConfig},
    hazard::{Crowd, Customer},
    map::{Bounds, Grid, GridError, Tile},
    session::Session,
};

/// Errors raised while building or parsing a warehouse layout.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("Map string is empty.")]
    Empty,
    #[error("Inconsistent width at row {row}: expected {expected}, found {found}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Unknown map code '{code}' at position ({x}, {y}).")]
    UnknownCode { code: String, x: usize, y: usize },
    #[error("Multiple start positions ('ST') found.")]
    MultipleStarts,
    #[error("No start position ('ST') found in map.")]
    MissingStart,
    #[error("Multiple delivery points ('DP') found.")]
    MultipleDeliveryPoints,
    #[error("Cannot place {what} at ({x}, {y}): {reason}")]
    Placement {
        what: &'static str,
        x: usize,
        y: usize,
        reason: &'static str,
    },
    #[error(transparent)]
    Grid(#[from] GridError),
}

/// Static description of a run: floor plan, initial stock, start and delivery point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    tiles: Grid<Tile>,
    stock: BTreeMap<Position, u32>,
    start: Position,
    delivery: Option<Position>,
}

impl Layout {
    /// An empty floor of the given size with the agent starting at `start`.
    pub fn new(width: usize, height: usize, start: Position) -> Result<Self, LayoutError> {
        let tiles = Grid::new(width, height)?;
        if !tiles.bounds().contains(start) {
            return Err(placement("start", start, "out of bounds"));
        }
        Ok(Layout {
            tiles,
            stock: BTreeMap::new(),
            start,
            delivery: None,
        })
    }

    /// Places a shelf holding `quantity` items. A zero-quantity shelf is a wall.
    pub fn add_shelf(&mut self, position: Position, quantity: u32) -> Result<(), LayoutError> {
        self.check_free(position, "shelf")?;
        self.tiles.set(position, Tile::Shelf)?;
        self.stock.insert(position, quantity);
        Ok(())
    }

    pub fn add_charger(&mut self, position: Position) -> Result<(), LayoutError> {
        self.check_free(position, "charger")?;
        self.tiles.set(position, Tile::Charger)?;
        Ok(())
    }

    pub fn add_penalty(&mut self, position: Position) -> Result<(), LayoutError> {
        self.check_free(position, "penalty cell")?;
        self.tiles.set(position, Tile::Penalty)?;
        Ok(())
    }

    pub fn set_delivery(&mut self, position: Position) -> Result<(), LayoutError> {
        if !self.tiles.bounds().contains(position) {
            return Err(placement("delivery point", position, "out of bounds"));
        }
        self.delivery = Some(position);
        Ok(())
    }

    fn check_free(&self, position: Position, what: &'static str) -> Result<(), LayoutError> {
        match self.tiles.get(position) {
            None => Err(placement(what, position, "out of bounds")),
            Some(_) if position == self.start => Err(placement(what, position, "agent start cell")),
            Some(Tile::Floor) => Ok(()),
            Some(_) => Err(placement(what, position, "cell already occupied")),
        }
    }

    pub fn bounds(&self) -> Bounds {
        self.tiles.bounds()
    }

    pub fn tiles(&self) -> &Grid<Tile> {
        &self.tiles
    }

    pub fn stock(&self) -> &BTreeMap<Position, u32> {
        &self.stock
    }

    pub fn start(&self) -> Position {
        self.start
    }

    pub fn delivery(&self) -> Option<Position> {
        self.delivery
    }
}

fn placement(what: &'static str, position: Position, reason: &'static str) -> LayoutError {
    LayoutError::Placement {
        what,
        x: position.x,
        y: position.y,
        reason,
    }
}

/// Loads a layout from a whitespace-separated token grid, one row per line.
///
/// `BL` floor, `ST` start / home base, `WL` empty shelf, `S1`..`S9` stocked
/// shelf, `DP` delivery point, `RC` recharge cell, `RZ` penalty cell.
pub fn load_layout_from_string(map_string: &str) -> Result<Layout, LayoutError> {
    let lines: Vec<&str> = map_string
        .trim()
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.is_empty() {
        return Err(LayoutError::Empty);
    }

    let rows: Vec<Vec<&str>> = lines.iter().map(|l| l.split_whitespace().collect()).collect();
    let width = rows[0].len();
    for (y, row) in rows.iter().enumerate() {
        if row.len() != width {
            return Err(LayoutError::RaggedRow {
                row: y,
                expected: width,
                found: row.len(),
            });
        }
    }

    let mut start = None;
    for (y, row) in rows.iter().enumerate() {
        for (x, token) in row.iter().enumerate() {
            if *token == "ST" {
                if start.is_some() {
                    return Err(LayoutError::MultipleStarts);
                }
                start = Some(Position::new(x, y));
            }
        }
    }
    let start = start.ok_or(LayoutError::MissingStart)?;

    let mut layout = Layout::new(width, rows.len(), start)?;
    for (y, row) in rows.iter().enumerate() {
        for (x, token) in row.iter().enumerate() {
            let pos = Position::new(x, y);
            match *token {
                "ST" | "BL" => {}
                "WL" => layout.add_shelf(pos, 0)?,
                "DP" => {
                    if layout.delivery.is_some() {
                        return Err(LayoutError::MultipleDeliveryPoints);
                    }
                    layout.set_delivery(pos)?;
                }
                "RC" => layout.add_charger(pos)?,
                "RZ" => layout.add_penalty(pos)?,
                shelf if shelf.len() == 2 && shelf.starts_with('S') => {
                    let quantity = shelf[1..]
                        .parse::<u32>()
                        .ok()
                        .filter(|q| *q > 0)
                        .ok_or_else(|| LayoutError::UnknownCode {
                            code: shelf.to_string(),
                            x,
                            y,
                        })?;
                    layout.add_shelf(pos, quantity)?;
                }
                unknown => {
                    return Err(LayoutError::UnknownCode {
                        code: unknown.to_string(),
                        x,
                        y,
                    });
                }
            }
        }
    }

    Ok(layout)
}

/// Physical condition of the agent. Anything but `Active` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentStatus {
    Active,
    Destroyed,
    Trapped,
    Depleted,
}

/// Holds the physical state of the agent within the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentState {
    pub id: EntityId,
    pub position: Position,
    pub carrying: bool,
    pub delivered: u32,
    pub battery: Option<u32>,
    pub status: AgentStatus,
}

/// Represents the outcome of processing an agent's action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionResult {
    Success,
    Picked { shelf: Position },
    Delivered { served: Option<EntityId> },
    /// The action did not apply; the tick passes without effect.
    Failure(String),
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// All inventory delivered, nothing in transit.
    Success,
    /// A hazard reached the agent's cell.
    Destroyed,
    /// No free neighbour left and at least one hazard adjacent.
    Trapped,
    ReputationExhausted,
    BatteryDepleted,
    /// The controller proved the remaining work unreachable.
    MissionImpossible,
}

impl Outcome {
    pub fn is_success(self) -> bool {
        self == Outcome::Success
    }

    pub fn describe(self) -> &'static str {
        match self {
            Outcome::Success => "all inventory delivered",
            Outcome::Destroyed => "destroyed by intruders",
            Outcome::Trapped => "trapped by intruders",
            Outcome::ReputationExhausted => "reputation exhausted",
            Outcome::BatteryDepleted => "battery depleted",
            Outcome::MissionImpossible => "remaining work is unreachable",
        }
    }
}

/// Things that happened earlier in a tick, folded into the session during
/// terminal detection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickEvents {
    pub spawned: Option<Position>,
    pub expired: Vec<EntityId>,
    pub delivered: bool,
    pub served: Option<EntityId>,
    /// The delivery target was withdrawn this tick.
    pub target_cleared: bool,
}

/// Ground truth of the warehouse. The only writer of stock and agent physical state.
#[derive(Debug)]
pub struct Environment {
    tiles: Grid<Tile>,
    stock: BTreeMap<Position, u32>,
    home: Position,
    delivery_target: Option<Position>,
    agent: AgentState,
    crowd: Crowd,
    battery: Option<BatteryConfig>,
    customers: Option<CustomerConfig>,
    rng: StdRng,
}

impl Environment {
    pub fn new(layout: Layout, agent_id: EntityId, config: &SimConfig) -> Self {
        let Layout {
            tiles,
            stock,
            start,
            delivery,
        } = layout;
        Environment {
            tiles,
            stock,
            home: start,
            delivery_target: delivery,
            agent: AgentState {
                id: agent_id,
                position: start,
                carrying: false,
                delivered: 0,
                battery: config.battery.as_ref().map(|b| b.capacity),
                status: AgentStatus::Active,
            },
            crowd: Crowd::new(),
            battery: config.battery.clone(),
            customers: config.customers.clone(),
            rng: StdRng::seed_from_u64(config.seed),
        }
    }

    pub fn bounds(&self) -> Bounds {
        self.tiles.bounds()
    }

    pub fn tiles(&self) -> &Grid<Tile> {
        &self.tiles
    }

    pub fn stock(&self) -> &BTreeMap<Position, u32> {
        &self.stock
    }

    pub fn agent(&self) -> &AgentState {
        &self.agent
    }

    pub fn crowd(&self) -> &Crowd {
        &self.crowd
    }

    /// Direct access to customers and intruders, for scripted scenarios.
    pub fn crowd_mut(&mut self) -> &mut Crowd {
        &mut self.crowd
    }

    pub fn home(&self) -> Position {
        self.home
    }

    pub fn delivery_target(&self) -> Option<Position> {
        self.delivery_target
    }

    pub fn set_delivery_target(&mut self, target: Option<Position>) {
        self.delivery_target = target;
    }

    /// Customers queue here; intruders never step onto it.
    pub fn counter_row(&self) -> usize {
        self.bounds().height - 1
    }

    pub fn is_shelf(&self, position: Position) -> bool {
        self.tiles.get(position) == Some(&Tile::Shelf)
    }

    pub fn remaining_stock(&self) -> u32 {
        self.stock.values().sum()
    }

    pub fn chargers(&self) -> Vec<Position> {
        self.cells_of(Tile::Charger)
    }

    pub fn penalty_zones(&self) -> Vec<Position> {
        self.cells_of(Tile::Penalty)
    }

    fn cells_of(&self, tile: Tile) -> Vec<Position> {
        self.tiles
            .enumerate()
            .filter(|(_, t)| **t == tile)
            .map(|(p, _)| p)
            .collect()
    }

    /// Builds the agent's view of the world for this tick.
    pub fn perceive(&self) -> Perception {
        Perception {
            position: self.agent.position,
            carrying: self.agent.carrying,
            battery: self
                .agent
                .battery
                .zip(self.battery.as_ref())
                .map(|(level, config)| BatteryReading {
                    level,
                    capacity: config.capacity,
                }),
            shelves: self.stock.clone(),
            hazards: self.crowd.hazard_cells(),
            chargers: self.chargers(),
            penalty_zones: self.penalty_zones(),
        }
    }

    /// Phase (a): spawn and tick waiting customers. Expired customers become
    /// intruders and lose any delivery assignment pointing at them.
    pub fn advance_customers(
        &mut self,
        difficulty: u32,
        events: &mut TickEvents,
    ) -> Vec<Customer> {
        let Some(config) = self.customers.as_ref() else {
            return Vec::new();
        };
        let width = self.bounds().width;
        let counter_row = self.counter_row();
        events.spawned =
            self.crowd.spawn_customer(counter_row, width, difficulty, config, &mut self.rng);
        if let Some(spawned) = events.spawned {
            info!(x = spawned.x, y = spawned.y, "customer joined the queue");
        }

        let expired = self.crowd.tick_customers();
        events.expired.extend(expired.iter().map(|c| c.id));
        if expired
            .iter()
            .any(|c| Some(c.position) == self.delivery_target)
        {
            self.delivery_target = None;
            events.target_cleared = true;
        }
        expired
    }

    /// Phase (b): intruders take a biased step towards the agent on their period.
    pub fn advance_intruders(&mut self, tick: u64, difficulty: u32) {
        let Some(config) = self.customers.as_ref() else {
            return;
        };
        if self.crowd.intruders.is_empty() || tick % config.intruder_period(difficulty) != 0 {
            return;
        }

        let bounds = self.tiles.bounds();
        let counter_row = self.counter_row();
        let tiles = &self.tiles;
        let walkable = |p: Position| {
            bounds.contains(p) && p.y != counter_row && tiles.get(p) != Some(&Tile::Shelf)
        };
        let agent = self.agent.position;
        for intruder in &mut self.crowd.intruders {
            intruder.advance(agent, &walkable, config.intruder_chase_chance, &mut self.rng);
        }
    }

    /// Whether a hazard occupies the agent's cell.
    pub fn agent_hit(&self) -> bool {
        self.crowd.intruder_at(self.agent.position)
    }

    /// Zero free neighbours combined with at least one adjacent hazard.
    pub fn agent_trapped(&self) -> bool {
        let mut free = 0;
        let mut hostile = false;
        for neighbor in self.bounds().neighbors(self.agent.position) {
            if self.crowd.intruder_at(neighbor) {
                hostile = true;
            } else if !self.is_shelf(neighbor) {
                free += 1;
            }
        }
        free == 0 && hostile
    }

    /// Phase (c): applies the agent's single action for this tick.
    ///
    /// Inapplicable actions are absorbed as [`ActionResult::Failure`].
    pub fn apply_action(&mut self, action: Action) -> ActionResult {
        if self.agent.status != AgentStatus::Active {
            return ActionResult::Failure("Agent is no longer active.".to_string());
        }

        let result = match action {
            Action::Wait => ActionResult::Success,
            Action::Move(direction) => match self
                .agent
                .position
                .step(direction)
                .filter(|p| self.bounds().contains(*p))
            {
                Some(target) => {
                    self.agent.position = target;
                    ActionResult::Success
                }
                None => ActionResult::Failure("Target position is out of bounds.".to_string()),
            },
            Action::Pick => {
                let position = self.agent.position;
                match self.stock.get_mut(&position) {
                    _ if self.agent.carrying => {
                        ActionResult::Failure("Agent already carries an item.".to_string())
                    }
                    Some(quantity) if *quantity > 0 => {
                        *quantity -= 1;
                        self.agent.carrying = true;
                        ActionResult::Picked { shelf: position }
                    }
                    _ => ActionResult::Failure("No stock at agent position.".to_string()),
                }
            }
            Action::Deliver => {
                if !self.agent.carrying {
                    ActionResult::Failure("Agent is not carrying anything.".to_string())
                } else if Some(self.agent.position) != self.delivery_target {
                    ActionResult::Failure("Agent is not at the delivery target.".to_string())
                } else {
                    self.agent.carrying = false;
                    self.agent.delivered += 1;
                    let served = self.crowd.serve_at(self.agent.position).map(|c| c.id);
                    if served.is_some() {
                        self.delivery_target = None;
                    }
                    ActionResult::Delivered { served }
                }
            }
        };

        self.update_battery(action, &result);
        result
    }

    fn update_battery(&mut self, action: Action, result: &ActionResult) {
        let (Some(level), Some(config)) = (self.agent.battery, self.battery.as_ref()) else {
            return;
        };
        let position = self.agent.position;
        let level = if self.tiles.get(position) == Some(&Tile::Charger) {
            level.saturating_add(config.charge_per_tick).min(config.capacity)
        } else {
            let moved = matches!(action, Action::Move(_)) && *result == ActionResult::Success;
            let extra = if moved && self.tiles.get(position) == Some(&Tile::Penalty) {
                config.penalty_drain
            } else {
                0
            };
            level.saturating_sub(config.drain_per_tick.saturating_add(extra))
        };
        self.agent.battery = Some(level);
    }

    /// Phase (d): folds the tick's events into the session and checks whether
    /// the run is over. Once an outcome is returned the agent is frozen.
    pub fn detect_terminal(
        &mut self,
        session: &mut Session,
        events: &TickEvents,
        mission_impossible: bool,
    ) -> Option<Outcome> {
        for _ in &events.expired {
            session.record_expiry();
        }
        if events.delivered {
            session.record_delivery();
        }

        let outcome = if self.agent_hit() {
            Some(Outcome::Destroyed)
        } else if self.agent_trapped() {
            Some(Outcome::Trapped)
        } else if self.customers.is_some() && session.reputation() <= 0 {
            Some(Outcome::ReputationExhausted)
        } else if self.agent.battery == Some(0) {
            Some(Outcome::BatteryDepleted)
        } else if mission_impossible {
            Some(Outcome::MissionImpossible)
        } else if self.remaining_stock() == 0 && !self.agent.carrying {
            Some(Outcome::Success)
        } else {
            None
        };

        if let Some(outcome) = outcome {
            self.agent.status = match outcome {
                Outcome::Destroyed => AgentStatus::Destroyed,
                Outcome::Trapped => AgentStatus::Trapped,
                Outcome::BatteryDepleted => AgentStatus::Depleted,
                _ => self.agent.status,
            };
            session.finish(outcome);
            info!(
                outcome = ?outcome,
                delivered = self.agent.delivered,
                score = session.score(),
                "run finished: {}",
                outcome.describe()
            );
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Direction;

    const MAP: &str = "
        ST BL WL BL
        BL S2 BL RC
        RZ BL BL DP
    ";

    fn env_from(map: &str, config: &SimConfig) -> Environment {
        Environment::new(load_layout_from_string(map).unwrap(), 0, config)
    }

    #[test]
    fn loads_every_token() {
        let layout = load_layout_from_string(MAP).unwrap();
        assert_eq!(layout.bounds(), Bounds::new(4, 3));
        assert_eq!(layout.start(), Position::new(0, 0));
        assert_eq!(layout.delivery(), Some(Position::new(3, 2)));
        assert_eq!(layout.stock().get(&Position::new(2, 0)), Some(&0));
        assert_eq!(layout.stock().get(&Position::new(1, 1)), Some(&2));
        assert_eq!(layout.tiles()[Position::new(3, 1)], Tile::Charger);
        assert_eq!(layout.tiles()[Position::new(0, 2)], Tile::Penalty);
    }

    #[test]
    fn rejects_malformed_maps() {
        assert_eq!(load_layout_from_string("  \n "), Err(LayoutError::Empty));
        assert_eq!(
            load_layout_from_string("ST BL\nBL"),
            Err(LayoutError::RaggedRow {
                row: 1,
                expected: 2,
                found: 1
            })
        );
        assert_eq!(load_layout_from_string("BL BL"), Err(LayoutError::MissingStart));
        assert_eq!(load_layout_from_string("ST ST"), Err(LayoutError::MultipleStarts));
        assert_eq!(
            load_layout_from_string("ST XX"),
            Err(LayoutError::UnknownCode {
                code: "XX".into(),
                x: 1,
                y: 0
            })
        );
        assert!(matches!(
            load_layout_from_string("ST S0"),
            Err(LayoutError::UnknownCode { .. })
        ));
    }

    #[test]
    fn out_of_bounds_move_is_absorbed() {
        let mut env = env_from(MAP, &SimConfig::default());
        let result = env.apply_action(Action::Move(Direction::North));
        assert!(matches!(result, ActionResult::Failure(_)));
        assert_eq!(env.agent().position, Position::new(0, 0));

        assert_eq!(env.apply_action(Action::Move(Direction::South)), ActionResult::Success);
        assert_eq!(env.agent().position, Position::new(0, 1));
    }

    #[test]
    fn pick_never_drives_stock_negative() {
        let mut env = env_from(MAP, &SimConfig::default());
        env.apply_action(Action::Move(Direction::East));
        env.apply_action(Action::Move(Direction::South));
        assert_eq!(env.agent().position, Position::new(1, 1));

        assert!(matches!(env.apply_action(Action::Pick), ActionResult::Picked { .. }));
        // Already carrying: a second pick must not touch the stock.
        assert!(matches!(env.apply_action(Action::Pick), ActionResult::Failure(_)));
        assert_eq!(env.stock()[&Position::new(1, 1)], 1);

        // Drop the item somewhere valid, then empty the shelf.
        env.set_delivery_target(Some(Position::new(1, 1)));
        assert!(matches!(env.apply_action(Action::Deliver), ActionResult::Delivered { .. }));
        assert!(!env.agent().carrying);
        assert!(matches!(env.apply_action(Action::Pick), ActionResult::Picked { .. }));
        env.apply_action(Action::Deliver);
        assert!(matches!(env.apply_action(Action::Pick), ActionResult::Failure(_)));
        assert_eq!(env.stock()[&Position::new(1, 1)], 0);
        assert_eq!(env.agent().delivered, 2);
    }

    #[test]
    fn deliver_requires_target_and_item() {
        let mut env = env_from(MAP, &SimConfig::default());
        assert!(matches!(env.apply_action(Action::Deliver), ActionResult::Failure(_)));
        assert_eq!(env.agent().delivered, 0);
    }

    #[test]
    fn battery_drains_and_recharges() {
        let config = SimConfig {
            battery: Some(BatteryConfig::default()),
            ..SimConfig::default()
        };
        let mut env = env_from(MAP, &config);
        env.apply_action(Action::Move(Direction::South));
        assert_eq!(env.agent().battery, Some(99));
        // Landing on the penalty cell costs extra.
        env.apply_action(Action::Move(Direction::South));
        assert_eq!(env.agent().battery, Some(94));

        env.apply_action(Action::Move(Direction::East));
        env.apply_action(Action::Move(Direction::East));
        env.apply_action(Action::Move(Direction::East));
        env.apply_action(Action::Move(Direction::North));
        assert_eq!(env.agent().position, Position::new(3, 1));
        assert_eq!(env.agent().battery, Some(100));
    }

    #[test]
    fn trapped_needs_an_adjacent_hazard() {
        let mut env = env_from("ST WL\nWL BL", &SimConfig::default());
        // Walled in, but no hazard: not trapped.
        assert!(!env.agent_trapped());
        env.crowd_mut().add_intruder(Position::new(1, 1));
        assert!(!env.agent_trapped());

        let mut env = env_from("ST BL\nWL BL", &SimConfig::default());
        env.crowd_mut().add_intruder(Position::new(1, 0));
        assert!(env.agent_trapped());
        assert!(!env.agent_hit());
    }

    #[test]
    fn shipped_maps_load() {
        for map in [
            include_str!("../../maps/warehouse.txt"),
            include_str!("../../maps/shop.txt"),
            include_str!("../../maps/survival.txt"),
        ] {
            let layout = load_layout_from_string(map).unwrap();
            assert_eq!(layout.bounds(), Bounds::new(14, 11));
            assert_eq!(layout.start(), Position::new(7, 1));
            assert_eq!(layout.stock().values().sum::<u32>(), 175);
        }
    }

    #[test]
    fn random_actions_keep_inventory_and_carrying_consistent() {
        use rand::{Rng, SeedableRng, rngs::StdRng};

        let mut env = env_from(MAP, &SimConfig::default());
        env.set_delivery_target(Some(Position::new(1, 0)));
        let initial = env.remaining_stock();
        let mut rng = StdRng::seed_from_u64(99);
        let actions = [
            Action::Wait,
            Action::Pick,
            Action::Deliver,
            Action::Move(Direction::North),
            Action::Move(Direction::South),
            Action::Move(Direction::West),
            Action::Move(Direction::East),
        ];

        for _ in 0..2_000 {
            let was_carrying = env.agent().carrying;
            let action = actions[rng.random_range(0..actions.len())];
            match env.apply_action(action) {
                ActionResult::Picked { .. } => {
                    assert!(!was_carrying);
                    assert!(env.agent().carrying);
                }
                ActionResult::Delivered { .. } => assert!(!env.agent().carrying),
                _ => assert_eq!(env.agent().carrying, was_carrying),
            }
            let in_transit = u32::from(env.agent().carrying);
            assert_eq!(env.remaining_stock() + env.agent().delivered + in_transit, initial);
        }
    }

    #[test]
    fn intruders_keep_off_the_counter_and_shelves() {
        let config = SimConfig {
            seed: 17,
            customers: Some(CustomerConfig {
                spawn_chance_base: 0.0,
                spawn_chance_step: 0.0,
                intruder_period_base: 1,
                intruder_period_min: 1,
                intruder_chase_chance: 0.3,
                ..CustomerConfig::default()
            }),
            ..SimConfig::default()
        };
        let mut env = env_from(include_str!("../../maps/warehouse.txt"), &config);
        let starts = [
            Position::new(0, 9),
            Position::new(13, 9),
            Position::new(7, 7),
            Position::new(4, 1),
        ];
        for start in starts {
            env.crowd_mut().add_intruder(start);
        }

        let counter_row = env.counter_row();
        let mut moved = false;
        for tick in 1..=500 {
            env.advance_intruders(tick, 0);
            for intruder in &env.crowd().intruders {
                assert_ne!(intruder.position.y, counter_row, "tick {tick}");
                assert!(!env.is_shelf(intruder.position), "tick {tick}");
                assert!(env.bounds().contains(intruder.position));
            }
            moved |= env.crowd().hazard_cells() != starts;
        }
        assert!(moved);
    }
}
