// src/engine/exposure.rs

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::engine::position::{Direction, Position};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EquitySnapshot {
    pub timestamp:      DateTime<Utc>,
    pub balance:        f64,   // free cash
    pub open_positions: usize,
    pub long_exposure:  f64,   // sum of open long shares
    pub short_exposure: f64,   // sum of open short shares
    pub floating_pnl:   f64,   // unrealized, commissions excluded
    pub total_equity:   f64,   // balance + cost basis of open positions + floating_pnl
}

/// Mark the open set at `price` on top of the free balance.
pub fn snapshot(
    timestamp: DateTime<Utc>,
    balance: f64,
    open: &[Position],
    price: f64,
) -> EquitySnapshot {
    let mut long_units  = 0.0;
    let mut short_units = 0.0;
    let mut float_pnl   = 0.0;
    let mut cost_basis  = 0.0;

    for pos in open {
        match pos.direction {
            Direction::Long => long_units += pos.shares,
            Direction::Short => short_units += pos.shares,
        }
        float_pnl  += pos.unrealized_pnl(price);
        cost_basis += pos.shares * pos.entry_price;
    }

    EquitySnapshot {
        timestamp,
        balance,
        open_positions: open.len(),
        long_exposure:  long_units,
        short_exposure: short_units,
        floating_pnl:   float_pnl,
        total_equity:   balance + cost_basis + float_pnl,
    }
}
