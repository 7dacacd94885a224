// src/engine/lifecycle.rs

use chrono::{DateTime, Utc};

use crate::config::BacktestConfig;
use crate::engine::events::{EventSink, TradeEvent};
use crate::engine::position::{CloseReason, Direction, Position, PositionId};
use crate::error::{BacktestError, Result};

/// Owns the cash balance, the open positions and the closed-trade history.
///
/// Open positions sit in `open` in the order they were entered. Closing one
/// removes it from `open` and pushes it onto `history`; a position is never
/// in both.
pub struct Engine<'s> {
    config:  BacktestConfig,
    balance: f64,
    open:    Vec<Position>,
    history: Vec<Position>,
    next_id: u64,
    sink:    &'s dyn EventSink,
}

impl<'s> Engine<'s> {
    pub fn new(config: BacktestConfig, sink: &'s dyn EventSink) -> Result<Self> {
        config.validate()?;
        Ok(Engine {
            config,
            balance: config.initial_balance,
            open: Vec::new(),
            history: Vec::new(),
            next_id: 0,
            sink,
        })
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn open_positions(&self) -> &[Position] {
        &self.open
    }

    pub fn trade_history(&self) -> &[Position] {
        &self.history
    }

    pub fn is_open(&self, id: PositionId) -> bool {
        self.open.iter().any(|p| p.id == id)
    }

    /// Enter with the configured risk/reward distances.
    pub fn enter(
        &mut self,
        direction: Direction,
        price: f64,
        timestamp: DateTime<Utc>,
        weight: f64,
    ) -> Result<Option<PositionId>> {
        let (risk_pct, reward_pct) = (self.config.risk_pct, self.config.reward_pct);
        self.enter_with_levels(direction, price, timestamp, weight, risk_pct, reward_pct)
    }

    /// Commit `weight` of the current balance to a new position.
    ///
    /// Returns `Ok(None)` when the allotment buys no shares; nothing is
    /// created or debited in that case. `risk_pct` and `reward_pct` are taken
    /// as given, so inverted levels are possible here.
    pub(crate) fn enter_with_levels(
        &mut self,
        direction: Direction,
        price: f64,
        timestamp: DateTime<Utc>,
        weight: f64,
        risk_pct: f64,
        reward_pct: f64,
    ) -> Result<Option<PositionId>> {
        if !price.is_finite() || price <= 0.0 {
            return Err(BacktestError::InvalidOrder(format!(
                "entry price must be positive, got {}",
                price
            )));
        }
        if !(weight > 0.0 && weight <= 1.0) {
            return Err(BacktestError::InvalidOrder(format!(
                "weight must be in (0, 1], got {}",
                weight
            )));
        }

        let rate = self.config.commission_rate;
        let available = self.balance * weight;
        let mut shares = available / price;
        if shares * price * (1.0 + rate) > available {
            shares = (available / (1.0 + rate)) / price;
        }
        // debit is exactly `available`; sizing round-off goes to the commission
        let commission = (available - shares * price).max(0.0);

        if !(shares > 0.0) || !shares.is_finite() {
            self.sink.emit(&TradeEvent::EntrySkipped {
                timestamp,
                direction,
                price,
                weight,
                balance: self.balance,
            });
            return Ok(None);
        }

        let id = PositionId(self.next_id);
        self.next_id += 1;
        self.open.push(Position::open(
            id, direction, timestamp, price, shares, weight, risk_pct, reward_pct,
        ));
        self.balance -= available;

        self.sink.emit(&TradeEvent::Enter {
            id,
            timestamp,
            direction,
            shares,
            price,
            weight,
            commission,
        });
        Ok(Some(id))
    }

    /// Close an open position and return its realized P&L.
    ///
    /// Ids that are not open (never existed or already closed) are ignored
    /// and yield `None`.
    pub fn exit(
        &mut self,
        id: PositionId,
        price: f64,
        timestamp: DateTime<Utc>,
        reason: CloseReason,
    ) -> Option<f64> {
        let idx = self.open.iter().position(|p| p.id == id)?;
        let mut position = self.open.remove(idx);

        let rate = self.config.commission_rate;
        let entry_commission = position.commission_at(position.entry_price, rate);
        let exit_commission = position.commission_at(price, rate);

        position.close(timestamp, price, reason);
        let pnl = position.realized_pnl(rate).unwrap_or(0.0);

        // entry commission was already taken at entry
        self.balance += match position.direction {
            Direction::Long => position.shares * price - exit_commission,
            // collateral back plus the short's gross move
            Direction::Short => {
                position.shares * (2.0 * position.entry_price - price) - exit_commission
            }
        };

        self.sink.emit(&TradeEvent::Exit {
            id,
            timestamp,
            direction: position.direction,
            shares: position.shares,
            price,
            reason,
            pnl,
            entry_commission,
            exit_commission,
        });
        self.history.push(position);
        Some(pnl)
    }

    /// Apply stop-loss and target checks to every open position at `price`.
    ///
    /// Fills happen at the stop or target level, not at `price`. When both
    /// levels are crossed the stop wins. Returns the ids closed this step.
    pub fn update(&mut self, price: f64, timestamp: DateTime<Utc>) -> Vec<PositionId> {
        let triggered: Vec<(PositionId, f64, CloseReason)> = self
            .open
            .iter()
            .filter_map(|p| {
                let (hit_stop, hit_target) = match p.direction {
                    Direction::Long => (price <= p.stop_loss, price >= p.target_price),
                    Direction::Short => (price >= p.stop_loss, price <= p.target_price),
                };
                if hit_stop {
                    Some((p.id, p.stop_loss, CloseReason::StopLoss))
                } else if hit_target {
                    Some((p.id, p.target_price, CloseReason::Target))
                } else {
                    None
                }
            })
            .collect();

        let mut closed = Vec::with_capacity(triggered.len());
        for (id, fill, reason) in triggered {
            if self.exit(id, fill, timestamp, reason).is_some() {
                closed.push(id);
            }
        }
        closed
    }

    /// Close oldest-first (by entry date, ties in open order) until the
    /// closed positions' summed entry weight reaches `weight`. At least one
    /// position is closed if any is open.
    pub fn close_oldest(
        &mut self,
        price: f64,
        timestamp: DateTime<Utc>,
        weight: f64,
        reason: CloseReason,
    ) -> Vec<PositionId> {
        let mut order: Vec<(DateTime<Utc>, PositionId, f64)> = self
            .open
            .iter()
            .map(|p| (p.entry_date, p.id, p.position_weight))
            .collect();
        // stable: equal entry dates keep open-set order
        order.sort_by(|a, b| a.0.cmp(&b.0));

        let mut released = 0.0;
        let mut closed = Vec::new();
        for (_, id, position_weight) in order {
            if !closed.is_empty() && released >= weight {
                break;
            }
            if self.exit(id, price, timestamp, reason).is_some() {
                released += position_weight;
                closed.push(id);
            }
        }
        closed
    }

    /// Close everything still open, in open-set order.
    pub fn close_all(&mut self, price: f64, timestamp: DateTime<Utc>, reason: CloseReason) -> Vec<PositionId> {
        let ids: Vec<PositionId> = self.open.iter().map(|p| p.id).collect();
        ids.into_iter()
            .filter(|&id| self.exit(id, price, timestamp, reason).is_some())
            .collect()
    }

    /// Summed mark-to-market P&L of the open set at `price`.
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.open.iter().map(|p| p.unrealized_pnl(price)).sum()
    }

    /// Hand back balance, still-open positions and history.
    pub fn into_parts(self) -> (f64, Vec<Position>, Vec<Position>) {
        (self.balance, self.open, self.history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::events::MemorySink;
    use crate::engine::position::PositionStatus;
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 0).unwrap()
    }

    fn engine(sink: &MemorySink) -> Engine<'_> {
        Engine::new(BacktestConfig::default(), sink).unwrap()
    }

    #[test]
    fn entry_never_spends_more_than_allotted() {
        let sink = MemorySink::new();
        let mut e = engine(&sink);
        let id = e.enter(Direction::Long, 100.0, ts(1), 0.5).unwrap().unwrap();
        let p = &e.open_positions()[0];
        assert_eq!(p.id, id);
        let spent = 10_000.0 - e.balance();
        assert!(spent <= 5_000.0 + 1e-9);
        assert_relative_eq!(spent, 5_000.0, max_relative = 1e-12);
        assert_relative_eq!(p.shares, 5_000.0 / 1.001 / 100.0, max_relative = 1e-12);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn full_weight_entry_spends_whole_balance() {
        let sink = MemorySink::new();
        let mut e = engine(&sink);
        e.enter(Direction::Long, 37.13, ts(1), 1.0).unwrap().unwrap();
        assert_eq!(e.balance(), 0.0);
        let p = &e.open_positions()[0];
        assert!(p.shares * 37.13 * 1.001 <= 10_000.0 + 1e-9);
    }

    #[test]
    fn repeated_full_weight_entries_open_one_position() {
        let sink = MemorySink::new();
        let mut e = engine(&sink);
        assert!(e.enter(Direction::Long, 19.87, ts(1), 1.0).unwrap().is_some());
        assert!(e.enter(Direction::Long, 19.87, ts(2), 1.0).unwrap().is_none());
        assert!(e.enter(Direction::Long, 19.87, ts(3), 1.0).unwrap().is_none());
        assert_eq!(e.open_positions().len(), 1);
        assert!(matches!(sink.events().last(), Some(TradeEvent::EntrySkipped { .. })));
    }

    #[test]
    fn partial_weight_leaves_the_rest() {
        let sink = MemorySink::new();
        let mut e = engine(&sink);
        e.enter(Direction::Long, 42.0, ts(1), 0.25).unwrap().unwrap();
        assert_relative_eq!(e.balance(), 7_500.0, max_relative = 1e-15);
    }

    #[test]
    fn empty_balance_skips_entry() {
        let sink = MemorySink::new();
        let mut e = engine(&sink);
        e.enter(Direction::Long, 10.0, ts(1), 1.0).unwrap();
        // whatever dust is left cannot be negative; drain it completely
        e.balance = 0.0;
        let skipped = e.enter(Direction::Long, 10.0, ts(2), 1.0).unwrap();
        assert!(skipped.is_none());
        assert_eq!(e.open_positions().len(), 1);
        assert!(matches!(sink.events().last(), Some(TradeEvent::EntrySkipped { .. })));
    }

    #[test]
    fn rejects_bad_orders() {
        let sink = MemorySink::new();
        let mut e = engine(&sink);
        assert!(matches!(
            e.enter(Direction::Long, 0.0, ts(1), 0.5),
            Err(BacktestError::InvalidOrder(_))
        ));
        assert!(e.enter(Direction::Long, 10.0, ts(1), 0.0).is_err());
        assert!(e.enter(Direction::Long, 10.0, ts(1), 1.5).is_err());
        assert!(e.enter(Direction::Long, f64::NAN, ts(1), 0.5).is_err());
        assert!(sink.is_empty());
    }

    #[test]
    fn second_exit_is_ignored() {
        let sink = MemorySink::new();
        let mut e = engine(&sink);
        let id = e.enter(Direction::Long, 100.0, ts(1), 0.5).unwrap().unwrap();
        assert!(e.exit(id, 101.0, ts(2), CloseReason::Signal).is_some());
        let balance = e.balance();
        assert!(e.exit(id, 150.0, ts(3), CloseReason::Signal).is_none());
        assert_eq!(e.balance(), balance);
        assert_eq!(e.trade_history().len(), 1);
        assert_eq!(e.trade_history()[0].status, PositionStatus::Closed);
        assert!(!e.is_open(id));
    }

    #[test]
    fn long_stop_fills_at_stop_level() {
        let sink = MemorySink::new();
        let mut e = engine(&sink);
        e.enter(Direction::Long, 100.0, ts(1), 1.0).unwrap();
        assert!(e.update(99.0, ts(2)).is_empty());
        let closed = e.update(90.0, ts(3));
        assert_eq!(closed.len(), 1);
        let p = &e.trade_history()[0];
        assert_eq!(p.close_reason, Some(CloseReason::StopLoss));
        assert_relative_eq!(p.exit_price.unwrap(), 98.0);
    }

    #[test]
    fn short_target_fills_at_target_level() {
        let sink = MemorySink::new();
        let mut e = engine(&sink);
        e.enter(Direction::Short, 100.0, ts(1), 1.0).unwrap();
        e.update(94.0, ts(2));
        let p = &e.trade_history()[0];
        assert_eq!(p.close_reason, Some(CloseReason::Target));
        assert_relative_eq!(p.exit_price.unwrap(), 95.0);
    }

    #[test]
    fn stop_wins_when_levels_cross() {
        let sink = MemorySink::new();
        let mut e = engine(&sink);
        // risk beyond reward puts the stop above the target for a long
        e.enter_with_levels(Direction::Long, 100.0, ts(1), 1.0, -0.10, -0.05)
            .unwrap()
            .unwrap();
        let p = &e.open_positions()[0];
        assert!(102.0 <= p.stop_loss && 102.0 >= p.target_price);
        e.update(102.0, ts(2));
        assert_eq!(e.trade_history()[0].close_reason, Some(CloseReason::StopLoss));
    }

    #[test]
    fn short_stop_fills_at_stop_level() {
        let sink = MemorySink::new();
        let mut e = engine(&sink);
        e.enter(Direction::Short, 100.0, ts(1), 1.0).unwrap();
        assert!(e.update(101.5, ts(2)).is_empty());
        assert_eq!(e.update(103.0, ts(3)).len(), 1);
        let p = &e.trade_history()[0];
        assert_eq!(p.close_reason, Some(CloseReason::StopLoss));
        assert_relative_eq!(p.exit_price.unwrap(), 102.0, max_relative = 1e-12);
        assert!(p.realized_pnl(0.001).unwrap() < 0.0);
    }

    #[test]
    fn short_stop_wins_when_levels_cross() {
        let sink = MemorySink::new();
        let mut e = engine(&sink);
        // stop at 95 and target at 103: 98 is past both for a short
        e.enter_with_levels(Direction::Short, 100.0, ts(1), 1.0, -0.05, -0.03)
            .unwrap()
            .unwrap();
        let p = &e.open_positions()[0];
        assert!(98.0 >= p.stop_loss && 98.0 <= p.target_price);
        e.update(98.0, ts(2));
        let p = &e.trade_history()[0];
        assert_eq!(p.close_reason, Some(CloseReason::StopLoss));
        assert_relative_eq!(p.exit_price.unwrap(), 95.0, max_relative = 1e-12);
    }

    #[test]
    fn short_loss_past_collateral_goes_negative() {
        let sink = MemorySink::new();
        let config = BacktestConfig::default();
        let mut e = Engine::new(config, &sink).unwrap();
        let id = e.enter(Direction::Short, 10.0, ts(1), 1.0).unwrap().unwrap();
        let pnl = e.exit(id, 25.0, ts(2), CloseReason::Signal).unwrap();
        // loss is uncapped: 1.5x the collateral
        assert!(e.balance() < 0.0);
        assert_relative_eq!(e.balance(), config.initial_balance + pnl, max_relative = 1e-9);
    }

    #[test]
    fn close_oldest_respects_weight() {
        let sink = MemorySink::new();
        let mut e = engine(&sink);
        let a = e.enter(Direction::Long, 10.0, ts(1), 0.2).unwrap().unwrap();
        let b = e.enter(Direction::Long, 10.0, ts(2), 0.2).unwrap().unwrap();
        let c = e.enter(Direction::Long, 10.0, ts(3), 0.2).unwrap().unwrap();

        assert_eq!(e.close_oldest(10.0, ts(4), 0.2, CloseReason::Signal), vec![a]);
        assert_eq!(e.close_oldest(10.0, ts(5), 1.0, CloseReason::Signal), vec![b, c]);
        assert!(e.open_positions().is_empty());
    }

    #[test]
    fn unrealized_pnl_is_not_persisted() {
        let sink = MemorySink::new();
        let mut e = engine(&sink);
        e.enter(Direction::Long, 100.0, ts(1), 0.5).unwrap();
        let shares = e.open_positions()[0].shares;
        assert_relative_eq!(e.unrealized_pnl(101.0), shares);
        assert!(e.trade_history().is_empty());
    }
}
