//! Typed simulation configuration.
//!
//! Every field has a default, so an empty TOML document is a valid config for
//! the base warehouse variant. The optional `[battery]` and `[customers]`
//! tables switch on the survival and adversarial variants.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::planner::DEFAULT_PENALTY_COST;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level simulation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Seeds the environment's random number generator.
    pub seed: u64,
    pub planner: PlannerConfig,
    /// Present in the survival variant.
    pub battery: Option<BatteryConfig>,
    /// Present in the adversarial (customer / intruder) variant.
    pub customers: Option<CustomerConfig>,
    pub scoring: ScoringConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            seed: 0,
            planner: PlannerConfig::default(),
            battery: None,
            customers: None,
            scoring: ScoringConfig::default(),
        }
    }
}

impl SimConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(battery) = &self.battery {
            if battery.capacity == 0 {
                return Err(ConfigError::Invalid("battery.capacity must be positive".into()));
            }
            if battery.critical >= battery.capacity {
                return Err(ConfigError::Invalid(format!(
                    "battery.critical ({}) must be below battery.capacity ({})",
                    battery.critical, battery.capacity
                )));
            }
        }
        if let Some(customers) = &self.customers {
            for (name, value) in [
                ("customers.spawn_chance_base", customers.spawn_chance_base),
                ("customers.spawn_chance_step", customers.spawn_chance_step),
                ("customers.intruder_chase_chance", customers.intruder_chase_chance),
            ] {
                if !(0.0..=1.0).contains(&value) {
                    return Err(ConfigError::Invalid(format!(
                        "{name} must be within [0, 1], got {value}"
                    )));
                }
            }
            if customers.reputation_penalty < 0 || customers.reputation_bonus < 0 {
                return Err(ConfigError::Invalid(
                    "customers reputation penalty and bonus must not be negative".into(),
                ));
            }
            if customers.deliveries_per_level == 0 {
                return Err(ConfigError::Invalid(
                    "customers.deliveries_per_level must be positive".into(),
                ));
            }
            if customers.intruder_period_min == 0 {
                return Err(ConfigError::Invalid(
                    "customers.intruder_period_min must be positive".into(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Cost of a move that lands in a penalty cell.
    pub penalty_cost: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig {
            penalty_cost: DEFAULT_PENALTY_COST,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatteryConfig {
    pub capacity: u32,
    /// At or below this level the agent abandons work to recharge.
    pub critical: u32,
    pub drain_per_tick: u32,
    pub charge_per_tick: u32,
    /// Extra drain for a move that lands in a penalty cell.
    pub penalty_drain: u32,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        BatteryConfig {
            capacity: 100,
            critical: 25,
            drain_per_tick: 1,
            charge_per_tick: 10,
            penalty_drain: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomerConfig {
    pub max_queue_base: usize,
    pub max_queue_cap: usize,
    pub spawn_chance_base: f64,
    pub spawn_chance_step: f64,
    pub patience_base: u32,
    pub patience_step: u32,
    pub patience_floor: u32,
    pub patience_jitter: u32,
    pub deliveries_per_level: u32,
    pub reputation_penalty: i32,
    pub reputation_bonus: i32,
    pub intruder_period_base: u64,
    pub intruder_period_min: u64,
    pub intruder_chase_chance: f64,
}

impl Default for CustomerConfig {
    fn default() -> Self {
        CustomerConfig {
            max_queue_base: 4,
            max_queue_cap: 10,
            spawn_chance_base: 0.03,
            spawn_chance_step: 0.01,
            patience_base: 250,
            patience_step: 15,
            patience_floor: 60,
            patience_jitter: 20,
            deliveries_per_level: 4,
            reputation_penalty: 12,
            reputation_bonus: 5,
            intruder_period_base: 4,
            intruder_period_min: 2,
            intruder_chase_chance: 0.6,
        }
    }
}

impl CustomerConfig {
    pub fn max_queue(&self, difficulty: u32) -> usize {
        (self.max_queue_base + difficulty as usize).min(self.max_queue_cap)
    }

    pub fn spawn_chance(&self, difficulty: u32) -> f64 {
        (self.spawn_chance_base + f64::from(difficulty) * self.spawn_chance_step).clamp(0.0, 1.0)
    }

    /// Patience before jitter is applied.
    pub fn base_patience(&self, difficulty: u32) -> u32 {
        self.patience_base
            .saturating_sub(difficulty.saturating_mul(self.patience_step))
            .max(self.patience_floor)
    }

    /// Intruders move on ticks divisible by this period.
    pub fn intruder_period(&self, difficulty: u32) -> u64 {
        self.intruder_period_base
            .saturating_sub(u64::from(difficulty))
            .max(self.intruder_period_min)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub delivery_points: u64,
    pub level_bonus: u64,
    pub starting_reputation: i32,
    pub leaderboard_capacity: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        ScoringConfig {
            delivery_points: 100,
            level_bonus: 20,
            starting_reputation: 100,
            leaderboard_capacity: 50,
        }
    }
}
