// src/runner.rs

use rayon::prelude::*;
use tracing::info;

use crate::config::BacktestConfig;
use crate::engine::{events::EventSink, events::TracingSink, feeds::PriceFeed, run_backtest, BacktestReport};
use crate::error::Result;
use crate::strategy::{SignalGenerator, StrategyRegistry};

/// Generate signals with `strategy` and replay them against `prices`.
pub fn run_strategy(
    strategy: &dyn SignalGenerator,
    prices: &PriceFeed,
    config: BacktestConfig,
    sink: &dyn EventSink,
) -> Result<BacktestReport> {
    info!(strategy = strategy.name(), bars = prices.len(), "running strategy");
    let signals = strategy.generate_signals(prices)?;
    run_backtest(prices, &signals, config, sink)
}

/// Backtest several registered strategies over the same prices.
///
/// Every run gets its own engine and a [`TracingSink`]; runs execute on the
/// rayon pool and results come back in the order of `names`. Fails on the
/// first unknown name before anything runs.
pub fn run_strategies(
    registry: &StrategyRegistry,
    names: &[&str],
    prices: &PriceFeed,
    config: BacktestConfig,
) -> Result<Vec<(String, BacktestReport)>> {
    let strategies = names
        .iter()
        .map(|name| registry.get(name))
        .collect::<Result<Vec<_>>>()?;

    strategies
        .par_iter()
        .map(|strategy| {
            let sink = TracingSink;
            let report = run_strategy(strategy.as_ref(), prices, config, &sink)?;
            Ok((strategy.name().to_string(), report))
        })
        .collect()
}
