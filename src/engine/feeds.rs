// src/engine/feeds.rs

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use ndarray::Array1;

use crate::error::{BacktestError, Result};

pub const PRICE_COLUMNS: [&str; 5] = ["open", "high", "low", "close", "volume"];
pub const SIGNAL_COLUMNS: [&str; 2] = ["signal", "trade_weight"];

/// One OHLCV row.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open:      f64,
    pub high:      f64,
    pub low:       f64,
    pub close:     f64,
    pub volume:    f64,
}

impl ta::Open for Bar {
    fn open(&self) -> f64 {
        self.open
    }
}

impl ta::High for Bar {
    fn high(&self) -> f64 {
        self.high
    }
}

impl ta::Low for Bar {
    fn low(&self) -> f64 {
        self.low
    }
}

impl ta::Close for Bar {
    fn close(&self) -> f64 {
        self.close
    }
}

impl ta::Volume for Bar {
    fn volume(&self) -> f64 {
        self.volume
    }
}

/// Timestamp-indexed OHLCV columns, validated on construction.
#[derive(Clone, Debug, PartialEq)]
pub struct PriceFeed {
    index:  Vec<DateTime<Utc>>,
    open:   Array1<f64>,
    high:   Array1<f64>,
    low:    Array1<f64>,
    close:  Array1<f64>,
    volume: Array1<f64>,
}

/// Timestamp-indexed `signal` / `trade_weight` columns, validated on construction.
#[derive(Clone, Debug, PartialEq)]
pub struct SignalFeed {
    index:        Vec<DateTime<Utc>>,
    signal:       Array1<i8>,
    trade_weight: Array1<f64>,
}

/// `arr.len() == expected`, otherwise LengthMismatch
fn validate_length(name: &str, actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        Err(BacktestError::LengthMismatch {
            name: name.to_string(),
            actual,
            expected,
        })
    } else {
        Ok(())
    }
}

fn take_column(
    feed: &'static str,
    columns: &mut HashMap<String, Vec<f64>>,
    name: &str,
) -> Result<Vec<f64>> {
    columns.remove(name).ok_or_else(|| BacktestError::MissingColumn {
        feed,
        column: name.to_string(),
    })
}

impl PriceFeed {
    pub fn new(
        index: Vec<DateTime<Utc>>,
        open: Vec<f64>,
        high: Vec<f64>,
        low: Vec<f64>,
        close: Vec<f64>,
        volume: Vec<f64>,
    ) -> Result<Self> {
        let n = index.len();
        for (name, col) in [("open", &open), ("high", &high), ("low", &low), ("close", &close)] {
            validate_length(name, col.len(), n)?;
            if let Some(i) = col.iter().position(|x| !x.is_finite() || *x <= 0.0) {
                return Err(BacktestError::Validation(format!(
                    "'{}' must be finite and positive, got {} at index {}",
                    name, col[i], i
                )));
            }
        }
        validate_length("volume", volume.len(), n)?;
        if let Some(i) = volume.iter().position(|x| !x.is_finite() || *x < 0.0) {
            return Err(BacktestError::Validation(format!(
                "'volume' must be finite and >= 0, got {} at index {}",
                volume[i], i
            )));
        }

        Ok(PriceFeed {
            index,
            open: Array1::from(open),
            high: Array1::from(high),
            low: Array1::from(low),
            close: Array1::from(close),
            volume: Array1::from(volume),
        })
    }

    /// Build from named columns; every name in [`PRICE_COLUMNS`] is required,
    /// extra columns are ignored.
    pub fn from_columns(index: Vec<DateTime<Utc>>, mut columns: HashMap<String, Vec<f64>>) -> Result<Self> {
        let [open, high, low, close, volume] = PRICE_COLUMNS;
        Self::new(
            index,
            take_column("price", &mut columns, open)?,
            take_column("price", &mut columns, high)?,
            take_column("price", &mut columns, low)?,
            take_column("price", &mut columns, close)?,
            take_column("price", &mut columns, volume)?,
        )
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn index(&self) -> &[DateTime<Utc>] {
        &self.index
    }

    pub fn close(&self) -> &Array1<f64> {
        &self.close
    }

    pub fn bar(&self, i: usize) -> Bar {
        Bar {
            timestamp: self.index[i],
            open: self.open[i],
            high: self.high[i],
            low: self.low[i],
            close: self.close[i],
            volume: self.volume[i],
        }
    }

    pub fn bars(&self) -> impl Iterator<Item = Bar> + '_ {
        (0..self.len()).map(move |i| self.bar(i))
    }
}

impl SignalFeed {
    pub fn new(index: Vec<DateTime<Utc>>, signal: Vec<i8>, trade_weight: Vec<f64>) -> Result<Self> {
        let n = index.len();
        validate_length("signal", signal.len(), n)?;
        validate_length("trade_weight", trade_weight.len(), n)?;
        if let Some(i) = signal.iter().position(|s| !(-1..=1).contains(s)) {
            return Err(BacktestError::Validation(format!(
                "'signal' must be -1, 0 or 1, got {} at index {}",
                signal[i], i
            )));
        }
        if let Some(i) = trade_weight.iter().position(|w| !(0.0..=1.0).contains(w)) {
            return Err(BacktestError::Validation(format!(
                "'trade_weight' must be in [0, 1], got {} at index {}",
                trade_weight[i], i
            )));
        }

        Ok(SignalFeed {
            index,
            signal: Array1::from(signal),
            trade_weight: Array1::from(trade_weight),
        })
    }

    /// Build from named float columns; `signal` values must be exactly
    /// -1.0, 0.0 or 1.0.
    pub fn from_columns(index: Vec<DateTime<Utc>>, mut columns: HashMap<String, Vec<f64>>) -> Result<Self> {
        let [signal_col, weight_col] = SIGNAL_COLUMNS;
        let raw_signal = take_column("signal", &mut columns, signal_col)?;
        let trade_weight = take_column("signal", &mut columns, weight_col)?;

        let mut signal = Vec::with_capacity(raw_signal.len());
        for (i, s) in raw_signal.iter().enumerate() {
            let v = if *s == -1.0 {
                -1
            } else if *s == 0.0 {
                0
            } else if *s == 1.0 {
                1
            } else {
                return Err(BacktestError::Validation(format!(
                    "'signal' must be -1, 0 or 1, got {} at index {}",
                    s, i
                )));
            };
            signal.push(v);
        }
        Self::new(index, signal, trade_weight)
    }

    /// Signals with `trade_weight` 1.0 on every non-zero row and 0.0 elsewhere.
    pub fn from_signals(index: Vec<DateTime<Utc>>, signal: Vec<i8>) -> Result<Self> {
        let weights = signal.iter().map(|&s| if s != 0 { 1.0 } else { 0.0 }).collect();
        Self::new(index, signal, weights)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn index(&self) -> &[DateTime<Utc>] {
        &self.index
    }

    pub fn signal(&self) -> &Array1<i8> {
        &self.signal
    }

    pub fn trade_weight(&self) -> &Array1<f64> {
        &self.trade_weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn index(n: usize) -> Vec<DateTime<Utc>> {
        let t0 = Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap();
        (0..n).map(|i| t0 + Duration::days(i as i64)).collect()
    }

    fn ohlcv(n: usize) -> HashMap<String, Vec<f64>> {
        PRICE_COLUMNS
            .iter()
            .map(|c| (c.to_string(), vec![10.0; n]))
            .collect()
    }

    #[test]
    fn price_feed_requires_every_column() {
        let mut cols = ohlcv(3);
        cols.remove("volume");
        let err = PriceFeed::from_columns(index(3), cols).unwrap_err();
        assert_eq!(
            err,
            BacktestError::MissingColumn { feed: "price", column: "volume".into() }
        );
    }

    #[test]
    fn price_feed_rejects_nan_and_non_positive() {
        let mut cols = ohlcv(3);
        cols.get_mut("close").unwrap()[1] = f64::NAN;
        assert!(matches!(
            PriceFeed::from_columns(index(3), cols),
            Err(BacktestError::Validation(_))
        ));

        let mut cols = ohlcv(3);
        cols.get_mut("low").unwrap()[2] = 0.0;
        assert!(PriceFeed::from_columns(index(3), cols).is_err());
    }

    #[test]
    fn zero_volume_is_fine() {
        let mut cols = ohlcv(2);
        cols.insert("volume".into(), vec![0.0, 0.0]);
        cols.insert("vwap".into(), vec![1.0, 1.0]);
        let feed = PriceFeed::from_columns(index(2), cols).unwrap();
        assert_eq!(feed.len(), 2);
        assert_eq!(feed.bar(1).volume, 0.0);
    }

    #[test]
    fn price_feed_length_mismatch() {
        let mut cols = ohlcv(3);
        cols.insert("high".into(), vec![10.0; 2]);
        assert!(matches!(
            PriceFeed::from_columns(index(3), cols),
            Err(BacktestError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn signal_feed_contract() {
        assert!(SignalFeed::new(index(2), vec![1, 2], vec![0.5, 0.5]).is_err());
        assert!(SignalFeed::new(index(2), vec![1, -1], vec![0.5, 1.5]).is_err());
        assert!(SignalFeed::new(index(2), vec![1, -1], vec![0.5, f64::NAN]).is_err());
        assert!(SignalFeed::new(index(2), vec![1, -1], vec![0.0, 1.0]).is_ok());
    }

    #[test]
    fn signal_columns_must_be_integral() {
        let mut cols = HashMap::new();
        cols.insert("signal".to_string(), vec![1.0, 0.5]);
        cols.insert("trade_weight".to_string(), vec![1.0, 1.0]);
        assert!(matches!(
            SignalFeed::from_columns(index(2), cols),
            Err(BacktestError::Validation(_))
        ));

        let mut cols = HashMap::new();
        cols.insert("signal".to_string(), vec![1.0, -1.0]);
        let err = SignalFeed::from_columns(index(2), cols).unwrap_err();
        assert!(matches!(err, BacktestError::MissingColumn { column, .. } if column == "trade_weight"));
    }

    #[test]
    fn from_signals_weights_active_rows() {
        let feed = SignalFeed::from_signals(index(3), vec![1, 0, -1]).unwrap();
        assert_eq!(feed.trade_weight().to_vec(), vec![1.0, 0.0, 1.0]);
    }
}
