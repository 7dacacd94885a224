// src/engine/metrics.rs

use serde::Serialize;

use crate::engine::position::{Direction, Position};

/// Trade-level statistics for one slice of the history (all, longs, shorts)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeStats {
    pub number_of_trades:  usize,
    pub win_rate:          f64,
    pub loss_rate:         f64,
    pub average_trade_pnl: f64,
    pub profit_factor:     f64,
    pub average_duration:  f64, // seconds
}

/// Run summary handed back with the trade ledger
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metrics {
    pub initial_balance: f64,
    pub final_balance:   f64,
    pub total_trades:    usize,
    pub win_rate:        f64,
    pub profit_factor:   f64,
    pub max_drawdown:    f64,
    pub total_pnl:       f64,
    pub total_return:    f64,
    pub longs:           TradeStats,
    pub shorts:          TradeStats,
}

/// Commission-adjusted P&L of each closed trade, in history order.
///
/// Goes through [`Position::realized_pnl`], the same computation the engine
/// logs at exit. Open positions are skipped.
pub fn realized_pnls(trades: &[Position], commission_rate: f64) -> Vec<f64> {
    trades
        .iter()
        .filter_map(|t| t.realized_pnl(commission_rate))
        .collect()
}

pub fn win_rate(pnls: &[f64]) -> f64 {
    if pnls.is_empty() {
        return 0.0;
    }
    let wins = pnls.iter().filter(|&&pnl| pnl > 0.0).count();
    wins as f64 / pnls.len() as f64
}

/// Summed gains over summed absolute losses.
///
/// `+inf` with gains and no losses, `0.0` for no trades or nothing won or lost.
pub fn profit_factor(pnls: &[f64]) -> f64 {
    let (mut gains, mut losses) = (0.0_f64, 0.0_f64);
    for &pnl in pnls {
        if pnl > 0.0 {
            gains += pnl;
        } else if pnl < 0.0 {
            losses += -pnl;
        }
    }
    if losses > 0.0 {
        gains / losses
    } else if gains > 0.0 {
        f64::INFINITY
    } else {
        0.0
    }
}

/// Largest peak-to-trough fall of the equity obtained by adding each trade's
/// P&L, in order, to `initial_balance`.
pub fn max_drawdown(initial_balance: f64, pnls: &[f64]) -> f64 {
    let mut equity = initial_balance;
    let mut peak   = initial_balance;
    let mut max_dd = 0.0_f64;
    for &pnl in pnls {
        equity += pnl;
        peak = peak.max(equity);
        if equity < peak && peak > 0.0 {
            max_dd = max_dd.max((peak - equity) / peak);
        }
    }
    max_dd
}

fn trade_stats<'a>(trades: impl Iterator<Item = &'a Position>, commission_rate: f64) -> TradeStats {
    let mut pnls      = Vec::new();
    let mut durations = Vec::new();
    for t in trades {
        if let (Some(pnl), Some(secs)) = (t.realized_pnl(commission_rate), t.holding_seconds()) {
            pnls.push(pnl);
            durations.push(secs);
        }
    }

    let n  = pnls.len();
    let nf = n as f64;
    let losses    = pnls.iter().filter(|&&pnl| pnl < 0.0).count();
    let loss_rate = if n > 0 { losses as f64 / nf } else { 0.0 };
    let avg_pnl   = if n > 0 { pnls.iter().sum::<f64>() / nf } else { 0.0 };
    let avg_dur   = if n > 0 { durations.iter().sum::<f64>() / nf } else { 0.0 };

    TradeStats {
        number_of_trades:  n,
        win_rate:          win_rate(&pnls),
        loss_rate,
        average_trade_pnl: avg_pnl,
        profit_factor:     profit_factor(&pnls),
        average_duration:  avg_dur,
    }
}

/// Top-level summary over the closed-trade history.
///
/// Depends only on the history and the balances; open positions play no part.
pub fn compute_metrics(
    initial_balance: f64,
    final_balance: f64,
    trades: &[Position],
    commission_rate: f64,
) -> Metrics {
    let pnls = realized_pnls(trades, commission_rate);
    let total_return = if initial_balance != 0.0 {
        final_balance / initial_balance - 1.0
    } else {
        0.0
    };

    Metrics {
        initial_balance,
        final_balance,
        total_trades:  pnls.len(),
        win_rate:      win_rate(&pnls),
        profit_factor: profit_factor(&pnls),
        max_drawdown:  max_drawdown(initial_balance, &pnls),
        total_pnl:     pnls.iter().sum(),
        total_return,
        longs:  trade_stats(trades.iter().filter(|t| t.direction == Direction::Long), commission_rate),
        shorts: trade_stats(trades.iter().filter(|t| t.direction == Direction::Short), commission_rate),
    }
}
