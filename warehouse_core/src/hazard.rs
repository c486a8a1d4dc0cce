//! Adversarial actors: waiting customers and the intruders they turn into.

use std::collections::HashSet;

use rand::{Rng, seq::IndexedRandom};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{EntityId, Position, config::CustomerConfig, map::Bounds, planner::manhattan_distance};

/// Lifecycle of a customer at the counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomerState {
    Waiting,
    Served,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: EntityId,
    pub position: Position,
    pub patience: u32,
    pub max_patience: u32,
    pub state: CustomerState,
}

impl Customer {
    pub fn new(id: EntityId, position: Position, patience: u32) -> Self {
        let patience = patience.max(1);
        Customer {
            id,
            position,
            patience,
            max_patience: patience,
            state: CustomerState::Waiting,
        }
    }

    /// Counts one tick of waiting down. Reaching zero expires the customer.
    pub fn tick(&mut self) -> CustomerState {
        if self.state == CustomerState::Waiting {
            self.patience = self.patience.saturating_sub(1);
            if self.patience == 0 {
                self.state = CustomerState::Expired;
            }
        }
        self.state
    }

    pub fn serve(&mut self) {
        if self.state == CustomerState::Waiting {
            self.state = CustomerState::Served;
        }
    }

    /// Remaining patience in `[0, 1]`.
    pub fn patience_ratio(&self) -> f32 {
        self.patience as f32 / self.max_patience as f32
    }
}

/// A hostile entity. Never removed within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intruder {
    pub id: EntityId,
    pub position: Position,
}

impl Intruder {
    /// Moves one cell, biased towards `agent`.
    ///
    /// With probability `chase_chance` the walkable neighbour nearest to the
    /// agent is taken, otherwise a uniformly random walkable neighbour. Stays
    /// put when boxed in.
    pub fn advance<R, F>(&mut self, agent: Position, walkable: F, chase_chance: f64, rng: &mut R)
    where
        R: Rng + ?Sized,
        F: Fn(Position) -> bool,
    {
        let mut candidates: Vec<Position> =
            self.position.neighbors().filter(|p| walkable(*p)).collect();
        if candidates.is_empty() {
            return;
        }
        candidates.sort_by_key(|p| manhattan_distance(*p, agent));

        let next = if rng.random_bool(chase_chance) {
            candidates.first()
        } else {
            candidates.choose(rng)
        };
        if let Some(next) = next {
            self.position = *next;
        }
    }
}

/// Cells occupied by hazards plus their immediate 4-neighbourhood.
pub fn hazard_zone(hazards: &[Position], bounds: Bounds) -> HashSet<Position> {
    hazards
        .iter()
        .filter(|p| bounds.contains(**p))
        .flat_map(|p| std::iter::once(*p).chain(bounds.neighbors(*p)))
        .collect()
}

/// The counter queue and the intruders roaming the floor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Crowd {
    pub customers: Vec<Customer>,
    pub intruders: Vec<Intruder>,
    next_entity_id: EntityId,
}

impl Crowd {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates a unique entity ID.
    pub fn reserve_entity_id(&mut self) -> EntityId {
        let id = self.next_entity_id;
        self.next_entity_id += 1;
        id
    }

    /// Maybe spawns a customer on the counter row.
    pub fn spawn_customer<R: Rng + ?Sized>(
        &mut self,
        counter_row: usize,
        width: usize,
        difficulty: u32,
        config: &CustomerConfig,
        rng: &mut R,
    ) -> Option<Position> {
        if self.customers.len() >= config.max_queue(difficulty)
            || !rng.random_bool(config.spawn_chance(difficulty))
        {
            return None;
        }
        let occupied: HashSet<usize> = self.customers.iter().map(|c| c.position.x).collect();
        let free: Vec<usize> = (1..width.saturating_sub(1))
            .filter(|x| !occupied.contains(x))
            .filter(|x| !self.intruder_at(Position::new(*x, counter_row)))
            .collect();
        let x = *free.choose(rng)?;

        let jitter = i64::from(config.patience_jitter);
        let patience =
            i64::from(config.base_patience(difficulty)) + rng.random_range(-jitter..=jitter);
        let position = Position::new(x, counter_row);
        let id = self.reserve_entity_id();
        self.customers.push(Customer::new(
            id,
            position,
            u32::try_from(patience.max(1)).unwrap_or(1),
        ));
        Some(position)
    }

    /// Adds a customer directly, bypassing the spawn roll.
    pub fn add_customer(&mut self, position: Position, patience: u32) -> EntityId {
        let id = self.reserve_entity_id();
        self.customers.push(Customer::new(id, position, patience));
        id
    }

    pub fn add_intruder(&mut self, position: Position) -> EntityId {
        let id = self.reserve_entity_id();
        self.intruders.push(Intruder { id, position });
        id
    }

    /// Ticks every waiting customer. Those that run out of patience leave the
    /// queue and become intruders on the cell they stood on; they are returned.
    pub fn tick_customers(&mut self) -> Vec<Customer> {
        let mut expired = Vec::new();
        for customer in &mut self.customers {
            if customer.tick() == CustomerState::Expired {
                expired.push(customer.clone());
            }
        }
        self.customers.retain(|c| c.state == CustomerState::Waiting);
        for customer in &expired {
            let intruder = self.add_intruder(customer.position);
            info!(
                customer = customer.id,
                intruder,
                x = customer.position.x,
                y = customer.position.y,
                "customer ran out of patience and turned intruder"
            );
        }
        expired
    }

    /// Serves the waiting customer standing on `position`, if any.
    pub fn serve_at(&mut self, position: Position) -> Option<Customer> {
        let index = self
            .customers
            .iter()
            .position(|c| c.position == position && c.state == CustomerState::Waiting)?;
        let mut customer = self.customers.remove(index);
        customer.serve();
        Some(customer)
    }

    pub fn customer_at(&self, position: Position) -> Option<&Customer> {
        self.customers.iter().find(|c| c.position == position)
    }

    pub fn intruder_at(&self, position: Position) -> bool {
        self.intruders.iter().any(|i| i.position == position)
    }

    pub fn hazard_cells(&self) -> Vec<Position> {
        self.intruders.iter().map(|i| i.position).collect()
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn customer_expires_after_patience() {
        let mut customer = Customer::new(0, Position::new(3, 9), 2);
        assert_eq!(customer.tick(), CustomerState::Waiting);
        assert_eq!(customer.tick(), CustomerState::Expired);
        // Terminal: further ticks change nothing.
        assert_eq!(customer.tick(), CustomerState::Expired);
        assert_eq!(customer.patience, 0);
    }

    #[test]
    fn served_customer_stops_waiting() {
        let mut customer = Customer::new(0, Position::new(3, 9), 5);
        customer.serve();
        assert_eq!(customer.tick(), CustomerState::Served);
        assert_eq!(customer.patience, 5);
    }

    #[test]
    fn expiry_spawns_intruder_in_place() {
        let mut crowd = Crowd::new();
        crowd.add_customer(Position::new(4, 9), 1);
        crowd.add_customer(Position::new(6, 9), 10);

        let expired = crowd.tick_customers();
        assert_eq!(expired.len(), 1);
        assert_eq!(crowd.customers.len(), 1);
        assert!(crowd.intruder_at(Position::new(4, 9)));
    }

    #[test]
    fn hazard_zone_covers_neighbourhood() {
        let zone = hazard_zone(&[Position::new(0, 0)], Bounds::new(4, 4));
        let expected: HashSet<Position> =
            [Position::new(0, 0), Position::new(0, 1), Position::new(1, 0)].into();
        assert_eq!(zone, expected);
    }

    #[test]
    fn chasing_intruder_closes_distance() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut intruder = Intruder {
            id: 0,
            position: Position::new(0, 0),
        };
        let agent = Position::new(5, 0);
        intruder.advance(agent, |p| p.x < 8 && p.y < 8, 1.0, &mut rng);
        assert_eq!(intruder.position, Position::new(1, 0));
    }

    #[test]
    fn boxed_in_intruder_stays_put() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut intruder = Intruder {
            id: 0,
            position: Position::new(2, 2),
        };
        intruder.advance(Position::new(0, 0), |_| false, 0.5, &mut rng);
        assert_eq!(intruder.position, Position::new(2, 2));
    }

    #[test]
    fn spawn_respects_queue_cap_and_columns() {
        let mut rng = StdRng::seed_from_u64(3);
        let config = CustomerConfig {
            spawn_chance_base: 1.0,
            max_queue_base: 2,
            ..CustomerConfig::default()
        };
        let mut crowd = Crowd::new();
        for _ in 0..10 {
            crowd.spawn_customer(9, 6, 0, &config, &mut rng);
        }
        assert_eq!(crowd.customers.len(), 2);
        for customer in &crowd.customers {
            assert_eq!(customer.position.y, 9);
            assert!((1..5).contains(&customer.position.x));
        }
        assert_ne!(crowd.customers[0].position, crowd.customers[1].position);
    }

    #[test]
    fn customers_never_spawn_under_an_intruder() {
        let config = CustomerConfig {
            spawn_chance_base: 1.0,
            ..CustomerConfig::default()
        };
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut crowd = Crowd::new();
            crowd.add_intruder(Position::new(2, 4));
            let spawned = crowd.spawn_customer(4, 4, 0, &config, &mut rng);
            assert_eq!(spawned, Some(Position::new(1, 4)));
        }
    }

    #[test]
    fn counter_full_of_intruders_spawns_nobody() {
        let mut rng = StdRng::seed_from_u64(5);
        let config = CustomerConfig {
            spawn_chance_base: 1.0,
            ..CustomerConfig::default()
        };
        let mut crowd = Crowd::new();
        crowd.add_intruder(Position::new(1, 4));
        crowd.add_intruder(Position::new(2, 4));
        assert_eq!(crowd.spawn_customer(4, 4, 0, &config, &mut rng), None);
        assert!(crowd.customers.is_empty());
    }
}
