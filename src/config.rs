// src/config.rs

use serde::{Deserialize, Serialize};

use crate::error::{BacktestError, Result};

pub const DEFAULT_INITIAL_BALANCE: f64 = 10_000.0;
/// 0.1% of executed notional, charged on entry and on exit separately
pub const DEFAULT_COMMISSION_RATE: f64 = 0.001;
pub const DEFAULT_RISK_PCT: f64 = 0.02;
pub const DEFAULT_REWARD_PCT: f64 = 0.05;

fn default_initial_balance() -> f64 {
    DEFAULT_INITIAL_BALANCE
}

fn default_commission_rate() -> f64 {
    DEFAULT_COMMISSION_RATE
}

fn default_risk_pct() -> f64 {
    DEFAULT_RISK_PCT
}

fn default_reward_pct() -> f64 {
    DEFAULT_REWARD_PCT
}

/// Run-level settings shared by the engine and the driver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    /// Starting cash
    #[serde(default = "default_initial_balance")]
    pub initial_balance: f64,

    /// Fraction of notional charged per fill (e.g. 0.001 = 0.1%)
    #[serde(default = "default_commission_rate")]
    pub commission_rate: f64,

    /// Stop distance from entry as a fraction of entry price
    #[serde(default = "default_risk_pct")]
    pub risk_pct: f64,

    /// Target distance from entry as a fraction of entry price
    #[serde(default = "default_reward_pct")]
    pub reward_pct: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_balance: DEFAULT_INITIAL_BALANCE,
            commission_rate: DEFAULT_COMMISSION_RATE,
            risk_pct: DEFAULT_RISK_PCT,
            reward_pct: DEFAULT_REWARD_PCT,
        }
    }
}

impl BacktestConfig {
    pub fn with_initial_balance(mut self, initial_balance: f64) -> Self {
        self.initial_balance = initial_balance;
        self
    }

    pub fn with_commission_rate(mut self, commission_rate: f64) -> Self {
        self.commission_rate = commission_rate;
        self
    }

    pub fn with_risk_reward(mut self, risk_pct: f64, reward_pct: f64) -> Self {
        self.risk_pct = risk_pct;
        self.reward_pct = reward_pct;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.initial_balance.is_finite() || self.initial_balance <= 0.0 {
            return Err(BacktestError::InvalidConfig(format!(
                "initial_balance must be positive, got {}",
                self.initial_balance
            )));
        }
        if !self.commission_rate.is_finite() || self.commission_rate < 0.0 {
            return Err(BacktestError::InvalidConfig(format!(
                "commission_rate must be >= 0, got {}",
                self.commission_rate
            )));
        }
        // a 100% stop would put a long's stop at zero
        if !self.risk_pct.is_finite() || self.risk_pct < 0.0 || self.risk_pct >= 1.0 {
            return Err(BacktestError::InvalidConfig(format!(
                "risk_pct must be in [0, 1), got {}",
                self.risk_pct
            )));
        }
        if !self.reward_pct.is_finite() || self.reward_pct < 0.0 {
            return Err(BacktestError::InvalidConfig(format!(
                "reward_pct must be >= 0, got {}",
                self.reward_pct
            )));
        }
        Ok(())
    }
}
