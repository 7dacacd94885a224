// src/engine/events.rs

use std::cell::RefCell;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::engine::position::{CloseReason, Direction, PositionId};

/// Structured record of something the engine did to a position.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeEvent {
    Enter {
        id:         PositionId,
        timestamp:  DateTime<Utc>,
        direction:  Direction,
        shares:     f64,
        price:      f64,
        weight:     f64,
        commission: f64,
    },
    Exit {
        id:               PositionId,
        timestamp:        DateTime<Utc>,
        direction:        Direction,
        shares:           f64,
        price:            f64,
        reason:           CloseReason,
        pnl:              f64,
        entry_commission: f64,
        exit_commission:  f64,
    },
    /// Entry discarded because the allotted capital bought no shares
    EntrySkipped {
        timestamp: DateTime<Utc>,
        direction: Direction,
        price:     f64,
        weight:    f64,
        balance:   f64,
    },
}

/// Destination for engine events. The driver owns the sink and lends it to
/// the engine for the duration of a run.
pub trait EventSink {
    fn emit(&self, event: &TradeEvent);
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &TradeEvent) {
        match event {
            TradeEvent::Enter { id, timestamp, direction, shares, price, weight, commission } => {
                tracing::info!(
                    id = id.0,
                    %timestamp,
                    direction = direction.as_str(),
                    shares,
                    price,
                    weight,
                    commission,
                    "ENTER"
                );
            }
            TradeEvent::Exit {
                id,
                timestamp,
                direction,
                shares,
                price,
                reason,
                pnl,
                entry_commission,
                exit_commission,
            } => {
                tracing::info!(
                    id = id.0,
                    %timestamp,
                    direction = direction.as_str(),
                    shares,
                    price,
                    reason = reason.as_str(),
                    pnl,
                    entry_commission,
                    exit_commission,
                    "EXIT"
                );
            }
            TradeEvent::EntrySkipped { timestamp, direction, price, weight, balance } => {
                tracing::warn!(
                    %timestamp,
                    direction = direction.as_str(),
                    price,
                    weight,
                    balance,
                    "entry skipped: insufficient capital"
                );
            }
        }
    }
}

/// Keeps every event in emission order.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: RefCell<Vec<TradeEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TradeEvent> {
        self.events.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &TradeEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}
