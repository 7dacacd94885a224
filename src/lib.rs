// src/lib.rs

pub mod config;
pub mod engine;
pub mod error;
pub mod runner;
pub mod strategy;

#[cfg(feature = "python")]
mod python;

pub use config::BacktestConfig;
pub use engine::{run_backtest, BacktestReport};
pub use error::{BacktestError, Result};

#[cfg(feature = "python")]
use pyo3::prelude::*;
#[cfg(feature = "python")]
use pyo3::wrap_pyfunction;

#[cfg(feature = "python")]
#[pymodule]
fn backtester(_py: Python<'_>, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(python::run_backtest, m)?)?;
    m.add_function(wrap_pyfunction!(python::run_strategy, m)?)?;
    m.add_function(wrap_pyfunction!(python::list_strategies, m)?)?;
    m.add_function(wrap_pyfunction!(python::init_logging, m)?)?;
    Ok(())
}
