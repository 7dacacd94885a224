// src/strategy/mod.rs
//
// Signal generators: anything that turns a price feed into a signal feed the
// driver can replay.

pub mod cci_obv_atr;
pub mod rsi;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::engine::feeds::{PriceFeed, SignalFeed};
use crate::error::{BacktestError, Result};

pub use cci_obv_atr::{CciObvAtrConfig, CciObvAtrStrategy};
pub use rsi::{RsiConfig, RsiStrategy};

/// Produces a signal per bar (-1 sell, 0 hold, +1 buy) with its trade weight.
///
/// Implementations must only look at bars up to and including the one they
/// emit a signal for.
pub trait SignalGenerator: Send + Sync {
    fn name(&self) -> &str;

    fn generate_signals(&self, prices: &PriceFeed) -> Result<SignalFeed>;
}

/// Name -> strategy lookup table.
#[derive(Default, Clone)]
pub struct StrategyRegistry {
    strategies: HashMap<String, Arc<dyn SignalGenerator>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `rsi` and `cci_obv_atr` with their default parameters.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(RsiStrategy::default()));
        registry.register(Arc::new(CciObvAtrStrategy::default()));
        registry
    }

    /// Register under `strategy.name()`, replacing any previous entry.
    pub fn register(&mut self, strategy: Arc<dyn SignalGenerator>) {
        let name = strategy.name().to_string();
        if self.strategies.contains_key(&name) {
            warn!(strategy = %name, "strategy already registered, replacing");
        }
        debug!(strategy = %name, "strategy registered");
        self.strategies.insert(name, strategy);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn SignalGenerator>> {
        self.strategies
            .get(name)
            .cloned()
            .ok_or_else(|| BacktestError::UnknownStrategy(name.to_string()))
    }

    /// Registered names, sorted.
    pub fn list_strategies(&self) -> Vec<String> {
        let mut names: Vec<String> = self.strategies.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn count(&self) -> usize {
        self.strategies.len()
    }
}
