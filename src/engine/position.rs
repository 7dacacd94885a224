// src/engine/position.rs

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Per-engine sequence number standing in for object identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PositionId(pub u64);

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionStatus {
    Open,
    Closed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CloseReason {
    Signal,
    StopLoss,
    Target,
    BacktestEnd,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Signal => "SIGNAL",
            CloseReason::StopLoss => "STOP_LOSS",
            CloseReason::Target => "TARGET",
            CloseReason::BacktestEnd => "BACKTEST_END",
        }
    }
}

/// One open-to-close exposure.
///
/// Only the engine creates positions and only [`Position::close`] fills the
/// exit fields, so `exit_date`, `exit_price` and `close_reason` are `Some`
/// exactly when `status == Closed`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Position {
    pub id:              PositionId,
    pub direction:       Direction,
    pub entry_date:      DateTime<Utc>,
    pub entry_price:     f64,
    pub shares:          f64,          // fractional units
    pub position_weight: f64,          // share of balance committed at entry
    pub stop_loss:       f64,
    pub target_price:    f64,
    pub status:          PositionStatus,
    pub exit_date:       Option<DateTime<Utc>>,
    pub exit_price:      Option<f64>,
    pub close_reason:    Option<CloseReason>,
}

impl Position {
    pub(crate) fn open(
        id: PositionId,
        direction: Direction,
        entry_date: DateTime<Utc>,
        entry_price: f64,
        shares: f64,
        position_weight: f64,
        risk_pct: f64,
        reward_pct: f64,
    ) -> Self {
        let (stop_loss, target_price) = match direction {
            Direction::Long => (entry_price * (1.0 - risk_pct), entry_price * (1.0 + reward_pct)),
            Direction::Short => (entry_price * (1.0 + risk_pct), entry_price * (1.0 - reward_pct)),
        };
        Position {
            id,
            direction,
            entry_date,
            entry_price,
            shares,
            position_weight,
            stop_loss,
            target_price,
            status: PositionStatus::Open,
            exit_date: None,
            exit_price: None,
            close_reason: None,
        }
    }

    pub(crate) fn close(&mut self, exit_date: DateTime<Utc>, exit_price: f64, reason: CloseReason) {
        debug_assert!(self.is_open(), "position {} closed twice", self.id);
        self.status = PositionStatus::Closed;
        self.exit_date = Some(exit_date);
        self.exit_price = Some(exit_price);
        self.close_reason = Some(reason);
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// Commission charged on a fill of this position's size at `price`.
    pub fn commission_at(&self, price: f64, commission_rate: f64) -> f64 {
        self.shares * price * commission_rate
    }

    /// Price move in the position's favour times size, before commissions.
    pub fn gross_pnl_at(&self, price: f64) -> f64 {
        match self.direction {
            Direction::Long => (price - self.entry_price) * self.shares,
            Direction::Short => (self.entry_price - price) * self.shares,
        }
    }

    /// Mark-to-market P&L of an open position, commissions excluded.
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.gross_pnl_at(price)
    }

    /// Commission-adjusted P&L of a closed position; `None` while open.
    ///
    /// The engine logs this at exit and the metrics recompute it from the
    /// history, so both read the same number.
    pub fn realized_pnl(&self, commission_rate: f64) -> Option<f64> {
        let exit_price = self.exit_price?;
        let entry_commission = self.commission_at(self.entry_price, commission_rate);
        let exit_commission = self.commission_at(exit_price, commission_rate);
        Some(self.gross_pnl_at(exit_price) - (entry_commission + exit_commission))
    }

    /// Seconds between entry and exit; `None` while open.
    pub fn holding_seconds(&self) -> Option<f64> {
        self.exit_date
            .map(|exit| (exit - self.entry_date).num_milliseconds() as f64 / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    #[test]
    fn long_levels_bracket_entry() {
        let p = Position::open(PositionId(0), Direction::Long, ts(1), 100.0, 10.0, 1.0, 0.02, 0.05);
        assert_relative_eq!(p.stop_loss, 98.0);
        assert_relative_eq!(p.target_price, 105.0);
        assert!(p.is_open());
        assert!(p.exit_date.is_none() && p.exit_price.is_none() && p.close_reason.is_none());
    }

    #[test]
    fn short_levels_are_mirrored() {
        let p = Position::open(PositionId(0), Direction::Short, ts(1), 100.0, 10.0, 1.0, 0.02, 0.05);
        assert_relative_eq!(p.stop_loss, 102.0);
        assert_relative_eq!(p.target_price, 95.0);
    }

    #[test]
    fn closing_fills_all_exit_fields() {
        let mut p = Position::open(PositionId(3), Direction::Long, ts(1), 100.0, 10.0, 0.5, 0.02, 0.05);
        assert_eq!(p.realized_pnl(0.001), None);
        p.close(ts(3), 110.0, CloseReason::Signal);
        assert_eq!(p.status, PositionStatus::Closed);
        assert_eq!(p.exit_date, Some(ts(3)));
        assert_eq!(p.exit_price, Some(110.0));
        assert_eq!(p.close_reason, Some(CloseReason::Signal));
        // 100 gross - 1.0 entry - 1.1 exit
        assert_relative_eq!(p.realized_pnl(0.001).unwrap(), 97.9, epsilon = 1e-9);
        assert_relative_eq!(p.holding_seconds().unwrap(), 2.0 * 86_400.0);
    }

    #[test]
    fn short_pnl_gains_when_price_falls() {
        let mut p = Position::open(PositionId(1), Direction::Short, ts(1), 50.0, 4.0, 1.0, 0.02, 0.05);
        assert_relative_eq!(p.unrealized_pnl(45.0), 20.0);
        p.close(ts(2), 45.0, CloseReason::Target);
        assert_relative_eq!(p.realized_pnl(0.0).unwrap(), 20.0);
    }
}
