// src/python.rs

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use numpy::PyArray1;
use pyo3::exceptions::{PyKeyError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

use crate::config::BacktestConfig;
use crate::engine::{
    events::TracingSink,
    feeds::{PriceFeed, SignalFeed},
    metrics::{Metrics, TradeStats},
    position::Position,
    run_backtest as run_engine,
    BacktestReport,
};
use crate::error::BacktestError;
use crate::runner;
use crate::strategy::StrategyRegistry;

impl From<BacktestError> for PyErr {
    fn from(err: BacktestError) -> PyErr {
        match err {
            BacktestError::UnknownStrategy(_) => PyKeyError::new_err(err.to_string()),
            _ => PyValueError::new_err(err.to_string()),
        }
    }
}

/// Epoch nanoseconds (what `DatetimeIndex.asi8` gives) to UTC timestamps
fn to_index(timestamps: &PyArray1<i64>) -> PyResult<Vec<DateTime<Utc>>> {
    let ns = timestamps.to_vec()?;
    Ok(ns.into_iter().map(|t| Utc.timestamp_nanos(t)).collect())
}

/// `{name: array}` to owned float columns; integer arrays are widened.
fn to_columns(columns: &PyDict) -> PyResult<HashMap<String, Vec<f64>>> {
    let mut out = HashMap::with_capacity(columns.len());
    for (key, value) in columns.iter() {
        let name: String = key.extract()?;
        let data = match value.downcast::<PyArray1<f64>>() {
            Ok(arr) => arr.to_vec()?,
            Err(_) => value.extract::<Vec<f64>>()?,
        };
        out.insert(name, data);
    }
    Ok(out)
}

fn config_from(
    initial_balance: f64,
    commission_rate: f64,
    risk_pct: f64,
    reward_pct: f64,
) -> BacktestConfig {
    BacktestConfig::default()
        .with_initial_balance(initial_balance)
        .with_commission_rate(commission_rate)
        .with_risk_reward(risk_pct, reward_pct)
}

fn position_to_py<'py>(py: Python<'py>, pos: &Position) -> PyResult<&'py PyDict> {
    let pd = PyDict::new(py);
    pd.set_item("id",              pos.id.0)?;
    pd.set_item("direction",       pos.direction.as_str())?;
    pd.set_item("entry_date",      pos.entry_date.timestamp_nanos_opt())?;
    pd.set_item("entry_price",     pos.entry_price)?;
    pd.set_item("shares",          pos.shares)?;
    pd.set_item("position_weight", pos.position_weight)?;
    pd.set_item("stop_loss",       pos.stop_loss)?;
    pd.set_item("target_price",    pos.target_price)?;
    pd.set_item("status",          if pos.is_open() { "OPEN" } else { "CLOSED" })?;
    pd.set_item("exit_date",       pos.exit_date.and_then(|t| t.timestamp_nanos_opt()))?;
    pd.set_item("exit_price",      pos.exit_price)?;
    pd.set_item("close_reason",    pos.close_reason.map(|r| r.as_str()))?;
    Ok(pd)
}

fn stats_to_py<'py>(py: Python<'py>, st: &TradeStats) -> PyResult<&'py PyDict> {
    let d = PyDict::new(py);
    d.set_item("number_of_trades",  st.number_of_trades)?;
    d.set_item("win_rate",          st.win_rate)?;
    d.set_item("loss_rate",         st.loss_rate)?;
    d.set_item("average_trade_pnl", st.average_trade_pnl)?;
    d.set_item("profit_factor",     st.profit_factor)?;
    d.set_item("average_duration",  st.average_duration)?;
    Ok(d)
}

fn metrics_to_py<'py>(py: Python<'py>, m: &Metrics) -> PyResult<&'py PyDict> {
    let d = PyDict::new(py);
    d.set_item("initial_balance", m.initial_balance)?;
    d.set_item("final_balance",   m.final_balance)?;
    d.set_item("total_trades",    m.total_trades)?;
    d.set_item("win_rate",        m.win_rate)?;
    d.set_item("profit_factor",   m.profit_factor)?;
    d.set_item("max_drawdown",    m.max_drawdown)?;
    d.set_item("total_pnl",       m.total_pnl)?;
    d.set_item("total_return",    m.total_return)?;
    d.set_item("long",            stats_to_py(py, &m.longs)?)?;
    d.set_item("short",           stats_to_py(py, &m.shorts)?)?;
    Ok(d)
}

fn report_to_py(py: Python<'_>, report: &BacktestReport) -> PyResult<PyObject> {
    let out = PyDict::new(py);

    let py_trades = PyList::empty(py);
    for pos in &report.trades {
        py_trades.append(position_to_py(py, pos)?)?;
    }
    out.set_item("trades", py_trades)?;

    let py_open = PyList::empty(py);
    for pos in &report.positions {
        py_open.append(position_to_py(py, pos)?)?;
    }
    out.set_item("positions", py_open)?;

    out.set_item("balance", report.balance)?;
    out.set_item("metrics", metrics_to_py(py, &report.metrics)?)?;

    let py_curve = PyList::empty(py);
    for snap in &report.equity_curve {
        let pd = PyDict::new(py);
        pd.set_item("timestamp",      snap.timestamp.timestamp_nanos_opt())?;
        pd.set_item("balance",        snap.balance)?;
        pd.set_item("open_positions", snap.open_positions)?;
        pd.set_item("long_exposure",  snap.long_exposure)?;
        pd.set_item("short_exposure", snap.short_exposure)?;
        pd.set_item("floating_pnl",   snap.floating_pnl)?;
        pd.set_item("total_equity",   snap.total_equity)?;
        py_curve.append(pd)?;
    }
    out.set_item("equity_curve", py_curve)?;

    Ok(out.into())
}

/// Replay a signal frame (`signal`, `trade_weight`) against an OHLCV frame.
#[pyfunction]
#[pyo3(signature = (
    timestamps, prices, signals,
    initial_balance = 10_000.0, commission_rate = 0.001,
    risk_pct = 0.02, reward_pct = 0.05
))]
pub fn run_backtest(
    py: Python<'_>,
    timestamps:      &PyArray1<i64>,
    prices:          &PyDict,
    signals:         &PyDict,
    initial_balance: f64,
    commission_rate: f64,
    risk_pct:        f64,
    reward_pct:      f64,
) -> PyResult<PyObject> {
    let index = to_index(timestamps)?;
    let price_feed = PriceFeed::from_columns(index.clone(), to_columns(prices)?)?;
    let signal_feed = SignalFeed::from_columns(index, to_columns(signals)?)?;
    let config = config_from(initial_balance, commission_rate, risk_pct, reward_pct);

    let report = py.allow_threads(|| run_engine(&price_feed, &signal_feed, config, &TracingSink))?;
    report_to_py(py, &report)
}

/// Generate signals with a registered strategy and backtest them.
#[pyfunction]
#[pyo3(signature = (
    name, timestamps, prices,
    initial_balance = 10_000.0, commission_rate = 0.001,
    risk_pct = 0.02, reward_pct = 0.05
))]
pub fn run_strategy(
    py: Python<'_>,
    name:            &str,
    timestamps:      &PyArray1<i64>,
    prices:          &PyDict,
    initial_balance: f64,
    commission_rate: f64,
    risk_pct:        f64,
    reward_pct:      f64,
) -> PyResult<PyObject> {
    let strategy = StrategyRegistry::with_defaults().get(name)?;
    let price_feed = PriceFeed::from_columns(to_index(timestamps)?, to_columns(prices)?)?;
    let config = config_from(initial_balance, commission_rate, risk_pct, reward_pct);

    let report = py.allow_threads(|| {
        runner::run_strategy(strategy.as_ref(), &price_feed, config, &TracingSink)
    })?;
    report_to_py(py, &report)
}

#[pyfunction]
pub fn list_strategies() -> Vec<String> {
    StrategyRegistry::with_defaults().list_strategies()
}

/// Install a stdout `tracing` subscriber filtered by `level` (e.g. "info",
/// "backtester=debug"). Fails if a subscriber is already installed.
#[pyfunction]
#[pyo3(signature = (level = "info"))]
pub fn init_logging(level: &str) -> PyResult<()> {
    let filter = tracing_subscriber::EnvFilter::try_new(level)
        .map_err(|e| PyValueError::new_err(e.to_string()))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| PyRuntimeError::new_err(e.to_string()))
}
