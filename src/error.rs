// src/error.rs

use thiserror::Error;

/// Everything that can stop a backtest before or while it runs.
///
/// Insufficient capital and exits on already-closed positions are not
/// errors: the engine skips or ignores them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BacktestError {
    /// A feed was built from named columns and a required one is absent
    #[error("{feed} feed is missing required column '{column}'")]
    MissingColumn { feed: &'static str, column: String },

    /// Two series that must be aligned have different lengths
    #[error("'{name}' length {actual} != expected {expected}")]
    LengthMismatch {
        name: String,
        actual: usize,
        expected: usize,
    },

    /// A value violates the feed contract (NaN price, signal outside {-1,0,1}, ...)
    #[error("validation error: {0}")]
    Validation(String),

    /// `enter` called with a non-positive price or a weight outside (0, 1]
    #[error("invalid order: {0}")]
    InvalidOrder(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("unknown strategy '{0}'")]
    UnknownStrategy(String),

    /// Indicator construction failed inside a strategy
    #[error("indicator error: {0}")]
    Indicator(String),
}

impl From<ta::errors::TaError> for BacktestError {
    fn from(err: ta::errors::TaError) -> Self {
        BacktestError::Indicator(format!("{:?}", err))
    }
}

pub type Result<T> = std::result::Result<T, BacktestError>;
