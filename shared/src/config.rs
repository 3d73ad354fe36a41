//! Session configuration value object.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("grid width {0} outside 10..=100")]
    Width(i32),
    #[error("grid height {0} outside 10..=100")]
    Height(i32),
    #[error("static food count {0} outside 0..=100")]
    FoodStatic(i32),
    #[error("food per player {0} must be non-negative")]
    FoodPerPlayer(f32),
    #[error("tick period {0} ms outside 1..=10000")]
    StateDelay(u64),
    #[error("dead cell food probability {0} outside 0..=1")]
    DeadFoodProb(f64),
    #[error("ping period {0} ms outside 1..=10000")]
    PingDelay(u64),
    #[error("node timeout {0} ms outside 1..=10000")]
    NodeTimeout(u64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameConfig {
    pub width: i32,
    pub height: i32,
    /// Food kept on the field regardless of player count.
    pub food_static: i32,
    /// Extra food per online non-viewer player.
    pub food_per_player: f32,
    /// Tick period.
    pub state_delay_ms: u64,
    /// Probability a dead snake cell turns into food.
    pub dead_food_prob: f64,
    pub ping_delay_ms: u64,
    pub node_timeout_ms: u64,
}

impl Default for GameConfig {
    fn default() -> GameConfig {
        GameConfig {
            width: 40,
            height: 30,
            food_static: 1,
            food_per_player: 1.0,
            state_delay_ms: 1000,
            dead_food_prob: 0.1,
            ping_delay_ms: 100,
            node_timeout_ms: 800,
        }
    }
}

impl GameConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(10..=100).contains(&self.width) {
            return Err(ConfigError::Width(self.width));
        }
        if !(10..=100).contains(&self.height) {
            return Err(ConfigError::Height(self.height));
        }
        if !(0..=100).contains(&self.food_static) {
            return Err(ConfigError::FoodStatic(self.food_static));
        }
        if self.food_per_player < 0.0 {
            return Err(ConfigError::FoodPerPlayer(self.food_per_player));
        }
        if !(1..=10_000).contains(&self.state_delay_ms) {
            return Err(ConfigError::StateDelay(self.state_delay_ms));
        }
        if !(0.0..=1.0).contains(&self.dead_food_prob) {
            return Err(ConfigError::DeadFoodProb(self.dead_food_prob));
        }
        if !(1..=10_000).contains(&self.ping_delay_ms) {
            return Err(ConfigError::PingDelay(self.ping_delay_ms));
        }
        if !(1..=10_000).contains(&self.node_timeout_ms) {
            return Err(ConfigError::NodeTimeout(self.node_timeout_ms));
        }
        Ok(())
    }

    pub fn state_delay(&self) -> Duration {
        Duration::from_millis(self.state_delay_ms)
    }

    pub fn ping_delay(&self) -> Duration {
        Duration::from_millis(self.ping_delay_ms)
    }

    pub fn node_timeout(&self) -> Duration {
        Duration::from_millis(self.node_timeout_ms)
    }

    /// Food the field should carry for `online` non-viewer players.
    pub fn food_target(&self, online: usize) -> usize {
        self.food_static as usize + (online as f32 * self.food_per_player) as usize
    }
}
