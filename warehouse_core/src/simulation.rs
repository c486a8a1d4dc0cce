//! Tick orchestration: customer timers, hazards, the agent, then terminal checks.

use tracing::{debug, info};

use crate::{
    EntityId, Position,
    agent::{Action, Agent, ControllerConfig, Dispatch, PickerAgent},
    config::{ConfigError, SimConfig},
    environment::{ActionResult, Environment, Layout, LayoutError},
    planner::PlannerError,
    session::Session,
};

pub use crate::environment::{Outcome, TickEvents};

const AGENT_ID: EntityId = 0;

#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error(transparent)]
    Planner(#[from] PlannerError),
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Delivery target ({x}, {y}) is outside the warehouse.")]
    TargetOutOfBounds { x: usize, y: usize },
    #[error("Layout has no delivery point ('DP') and customers are disabled.")]
    NoDeliveryPoint,
}

/// What a single call to [`Simulation::step`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub tick: u64,
    /// `None` when the run was already over or a hazard reached the agent first.
    pub action: Option<Action>,
    pub result: Option<ActionResult>,
    pub events: TickEvents,
    pub outcome: Option<Outcome>,
}

/// One run of the warehouse: ground truth, the controller and the session.
#[derive(Debug)]
pub struct Simulation<A: Agent = PickerAgent> {
    environment: Environment,
    agent: A,
    session: Session,
    tick: u64,
    outcome: Option<Outcome>,
}

impl Simulation<PickerAgent> {
    /// Starts a run with the built-in picking controller.
    ///
    /// Without customers the controller works continuously towards the
    /// layout's delivery point; with customers it fetches on demand.
    pub fn start(
        layout: Layout,
        config: &SimConfig,
        player: impl Into<String>,
    ) -> Result<Self, SimError> {
        let dispatch = if config.customers.is_some() {
            Dispatch::OnDemand
        } else {
            Dispatch::Continuous
        };
        let controller = ControllerConfig {
            dispatch,
            home: Some(layout.start()),
            battery_critical: config.battery.as_ref().map_or(0, |b| b.critical),
            penalty_cost: config.planner.penalty_cost,
        };
        let target = match dispatch {
            Dispatch::Continuous => layout.delivery(),
            Dispatch::OnDemand => None,
        };
        let agent = PickerAgent::new(AGENT_ID, layout.bounds(), target, controller);
        Self::with_agent(layout, config, player, agent)
    }
}

impl<A: Agent> Simulation<A> {
    /// Starts a run driven by an arbitrary controller.
    pub fn with_agent(
        layout: Layout,
        config: &SimConfig,
        player: impl Into<String>,
        agent: A,
    ) -> Result<Self, SimError> {
        config.validate()?;
        if config.customers.is_none() && layout.delivery().is_none() {
            return Err(SimError::NoDeliveryPoint);
        }

        let mut environment = Environment::new(layout, agent.id(), config);
        if config.customers.is_some() {
            // Customers pick the destination; the fixed point is not used.
            environment.set_delivery_target(None);
        }
        let session = Session::new(player, &config.scoring, config.customers.as_ref());
        info!(
            player = session.player(),
            seed = config.seed,
            width = environment.bounds().width,
            height = environment.bounds().height,
            stock = environment.remaining_stock(),
            customers = config.customers.is_some(),
            battery = config.battery.is_some(),
            "run started"
        );

        Ok(Simulation {
            environment,
            agent,
            session,
            tick: 0,
            outcome: None,
        })
    }

    /// Advances the world by one tick.
    ///
    /// Once an outcome has been reached this is a no-op that keeps reporting it.
    pub fn step(&mut self) -> Result<StepReport, SimError> {
        if let Some(outcome) = self.outcome {
            return Ok(StepReport {
                tick: self.tick,
                action: None,
                result: None,
                events: TickEvents::default(),
                outcome: Some(outcome),
            });
        }

        self.tick += 1;
        let difficulty = self.session.difficulty();
        let mut events = TickEvents::default();

        // (a) waiting-entity timers
        self.environment.advance_customers(difficulty, &mut events);
        if events.target_cleared {
            info!(tick = self.tick, "assigned customer left; target withdrawn");
            self.agent.assign_target(None);
        }

        // (b) hazards
        self.environment.advance_intruders(self.tick, difficulty);

        // (c) the agent acts, unless a hazard got there first
        let (action, result) = if self.environment.agent_hit() {
            (None, None)
        } else {
            let perception = self.environment.perceive();
            let action = self.agent.get_action(&perception)?;
            let result = self.environment.apply_action(action);
            match &result {
                ActionResult::Delivered { served } => {
                    events.delivered = true;
                    events.served = *served;
                    if served.is_some() {
                        events.target_cleared = true;
                        self.agent.assign_target(None);
                    }
                }
                ActionResult::Failure(reason) => {
                    debug!(tick = self.tick, ?action, %reason, "action had no effect");
                }
                ActionResult::Success | ActionResult::Picked { .. } => {}
            }
            (Some(action), Some(result))
        };

        // (d) session and terminal check
        self.outcome = self.environment.detect_terminal(
            &mut self.session,
            &events,
            self.agent.mission_impossible(),
        );

        Ok(StepReport {
            tick: self.tick,
            action,
            result,
            events,
            outcome: self.outcome,
        })
    }

    /// Steps until the run ends or `max_ticks` more ticks have passed.
    pub fn run(&mut self, max_ticks: u64) -> Result<Option<Outcome>, SimError> {
        for _ in 0..max_ticks {
            if self.step()?.outcome.is_some() {
                break;
            }
        }
        Ok(self.outcome)
    }

    /// Points both the environment and the controller at `target`. The
    /// controller's plan is discarded, so the next tick replans.
    pub fn assign_target(&mut self, target: Position) -> Result<(), SimError> {
        if !self.environment.bounds().contains(target) {
            return Err(SimError::TargetOutOfBounds {
                x: target.x,
                y: target.y,
            });
        }
        info!(tick = self.tick, x = target.x, y = target.y, "delivery target assigned");
        self.environment.set_delivery_target(Some(target));
        self.agent.assign_target(Some(target));
        Ok(())
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Mutable ground truth, for scripted scenarios.
    pub fn environment_mut(&mut self) -> &mut Environment {
        &mut self.environment
    }

    pub fn agent(&self) -> &A {
        &self.agent
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Direction, environment::load_layout_from_string};

    const CORRIDOR: &str = "
        ST BL S1 BL DP
    ";

    #[test]
    fn base_run_delivers_everything() {
        let layout = load_layout_from_string(CORRIDOR).unwrap();
        let mut sim = Simulation::start(layout, &SimConfig::default(), "tester").unwrap();

        let outcome = sim.run(50).unwrap();
        assert_eq!(outcome, Some(Outcome::Success));
        assert_eq!(sim.session().deliveries(), 1);
        assert_eq!(sim.session().score(), 100);
        assert_eq!(sim.environment().remaining_stock(), 0);
        assert!(!sim.environment().agent().carrying);
    }

    #[test]
    fn finished_run_is_frozen() {
        let layout = load_layout_from_string(CORRIDOR).unwrap();
        let mut sim = Simulation::start(layout, &SimConfig::default(), "tester").unwrap();
        sim.run(50).unwrap();
        let tick = sim.tick();
        let position = sim.environment().agent().position;

        let report = sim.step().unwrap();
        assert_eq!(report.action, None);
        assert_eq!(report.outcome, Some(Outcome::Success));
        assert_eq!(sim.tick(), tick);
        assert_eq!(sim.environment().agent().position, position);
    }

    #[test]
    fn missing_delivery_point_is_rejected() {
        let layout = load_layout_from_string("ST S1").unwrap();
        let err = Simulation::start(layout, &SimConfig::default(), "tester").unwrap_err();
        assert!(matches!(err, SimError::NoDeliveryPoint));
    }

    #[test]
    fn out_of_bounds_assignment_is_rejected() {
        let layout = load_layout_from_string(CORRIDOR).unwrap();
        let mut sim = Simulation::start(layout, &SimConfig::default(), "tester").unwrap();
        assert!(matches!(
            sim.assign_target(Position::new(9, 0)),
            Err(SimError::TargetOutOfBounds { x: 9, y: 0 })
        ));
    }

    #[test]
    fn first_tick_moves_towards_stock() {
        let layout = load_layout_from_string(CORRIDOR).unwrap();
        let mut sim = Simulation::start(layout, &SimConfig::default(), "tester").unwrap();
        let report = sim.step().unwrap();
        assert_eq!(report.tick, 1);
        assert_eq!(report.action, Some(Action::Move(Direction::East)));
        assert_eq!(sim.environment().agent().position, Position::new(1, 0));
    }
}
