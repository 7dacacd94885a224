// src/engine/mod.rs

pub mod events;
pub mod exposure;
pub mod feeds;
pub mod lifecycle;
pub mod metrics;
pub mod position;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::BacktestConfig;
use crate::engine::{
    events::EventSink,
    exposure::{snapshot, EquitySnapshot},
    feeds::{PriceFeed, SignalFeed},
    lifecycle::Engine,
    metrics::{compute_metrics, Metrics},
    position::{CloseReason, Direction, Position},
};
use crate::error::{BacktestError, Result};

/// Everything a run produces
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestReport {
    /// Closed positions in the order they were closed
    pub trades:       Vec<Position>,
    /// Still-open positions; empty after the end-of-run force close
    pub positions:    Vec<Position>,
    pub balance:      f64,
    pub metrics:      Metrics,
    /// One snapshot per bar, taken after that bar's exits and entries
    pub equity_curve: Vec<EquitySnapshot>,
}

/// Act on one bar's signal: +1 opens a long with `weight`, -1 closes the
/// oldest positions up to `weight`, anything else does nothing.
fn dispatch_signal(
    engine: &mut Engine<'_>,
    signal: i8,
    weight: f64,
    price: f64,
    timestamp: DateTime<Utc>,
) -> Result<()> {
    if !(weight > 0.0) {
        return Ok(());
    }
    match signal {
        1 => {
            engine.enter(Direction::Long, price, timestamp, weight)?;
        }
        -1 => {
            engine.close_oldest(price, timestamp, weight, CloseReason::Signal);
        }
        _ => {}
    }
    Ok(())
}

/// Replay `signals` against `prices` bar by bar.
///
/// Both feeds must share the same index; only their lengths are checked
/// here. Each bar runs stop/target checks at the close, then the bar's
/// signal. Whatever is still open after the last bar is closed at its close
/// with [`CloseReason::BacktestEnd`].
pub fn run_backtest(
    prices: &PriceFeed,
    signals: &SignalFeed,
    config: BacktestConfig,
    sink: &dyn EventSink,
) -> Result<BacktestReport> {
    let n = prices.len();
    if signals.len() != n {
        return Err(BacktestError::LengthMismatch {
            name: "signals".to_string(),
            actual: signals.len(),
            expected: n,
        });
    }

    let mut engine = Engine::new(config, sink)?;
    let mut equity_curve = Vec::with_capacity(n);
    info!(bars = n, initial_balance = config.initial_balance, "backtest started");

    let index = prices.index();
    let close = prices.close();
    let signal = signals.signal();
    let weight = signals.trade_weight();

    for i in 0..n {
        let (ts, price) = (index[i], close[i]);
        let stopped = engine.update(price, ts);
        if !stopped.is_empty() {
            debug!(bar = i, closed = stopped.len(), "stop/target exits");
        }
        dispatch_signal(&mut engine, signal[i], weight[i], price, ts)?;
        equity_curve.push(snapshot(ts, engine.balance(), engine.open_positions(), price));
    }

    if n > 0 {
        let (last_ts, last_price) = (index[n - 1], close[n - 1]);
        let closed = engine.close_all(last_price, last_ts, CloseReason::BacktestEnd);
        if !closed.is_empty() {
            debug!(closed = closed.len(), price = last_price, "force-closed at end of backtest");
            if let Some(last) = equity_curve.last_mut() {
                *last = snapshot(last_ts, engine.balance(), engine.open_positions(), last_price);
            }
        }
    }

    let commission_rate = engine.config().commission_rate;
    let (balance, positions, trades) = engine.into_parts();
    let metrics = compute_metrics(config.initial_balance, balance, &trades, commission_rate);
    info!(
        trades = metrics.total_trades,
        final_balance = balance,
        win_rate = metrics.win_rate,
        max_drawdown = metrics.max_drawdown,
        "backtest finished"
    );

    Ok(BacktestReport {
        trades,
        positions,
        balance,
        metrics,
        equity_curve,
    })
}
