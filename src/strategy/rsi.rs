// src/strategy/rsi.rs

use serde::{Deserialize, Serialize};
use ta::indicators::SimpleMovingAverage;
use ta::Next;

use crate::engine::feeds::{PriceFeed, SignalFeed};
use crate::error::{BacktestError, Result};
use crate::strategy::SignalGenerator;

fn default_period() -> usize {
    14
}

fn default_oversold() -> f64 {
    30.0
}

fn default_overbought() -> f64 {
    70.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RsiConfig {
    #[serde(default = "default_period")]
    pub period: usize,
    /// Buy below this RSI
    #[serde(default = "default_oversold")]
    pub oversold: f64,
    /// Sell above this RSI
    #[serde(default = "default_overbought")]
    pub overbought: f64,
}

impl Default for RsiConfig {
    fn default() -> Self {
        Self {
            period: default_period(),
            oversold: default_oversold(),
            overbought: default_overbought(),
        }
    }
}

/// Long-only RSI mean reversion: buy when flat and oversold, sell the whole
/// position when overbought.
#[derive(Debug, Clone, Default)]
pub struct RsiStrategy {
    config: RsiConfig,
}

impl RsiStrategy {
    pub fn new(config: RsiConfig) -> Self {
        Self { config }
    }

    /// RSI per bar from simple rolling means of gains and losses; `None`
    /// until `period` price changes are available.
    pub fn rsi_series(&self, prices: &PriceFeed) -> Result<Vec<Option<f64>>> {
        let period = self.config.period;
        let mut avg_gain = SimpleMovingAverage::new(period)?;
        let mut avg_loss = SimpleMovingAverage::new(period)?;

        let mut out = Vec::with_capacity(prices.len());
        let mut prev_close: Option<f64> = None;
        for (i, &close) in prices.close().iter().enumerate() {
            let delta = prev_close.map_or(0.0, |prev| close - prev);
            prev_close = Some(close);
            let gain = avg_gain.next(delta.max(0.0));
            let loss = avg_loss.next((-delta).max(0.0));

            if i < period {
                out.push(None);
            } else if loss == 0.0 {
                out.push(Some(100.0));
            } else {
                out.push(Some(100.0 - 100.0 / (1.0 + gain / loss)));
            }
        }
        Ok(out)
    }
}

impl SignalGenerator for RsiStrategy {
    fn name(&self) -> &str {
        "rsi"
    }

    fn generate_signals(&self, prices: &PriceFeed) -> Result<SignalFeed> {
        if self.config.oversold >= self.config.overbought {
            return Err(BacktestError::InvalidConfig(format!(
                "oversold {} must be below overbought {}",
                self.config.oversold, self.config.overbought
            )));
        }

        let mut signal = vec![0_i8; prices.len()];
        let mut holding = false;
        for (i, rsi) in self.rsi_series(prices)?.into_iter().enumerate() {
            let Some(rsi) = rsi else { continue };
            if !holding && rsi < self.config.oversold {
                signal[i] = 1;
                holding = true;
            } else if holding && rsi > self.config.overbought {
                signal[i] = -1;
                holding = false;
            }
        }
        SignalFeed::from_signals(prices.index().to_vec(), signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn feed(closes: &[f64]) -> PriceFeed {
        let t0 = Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap();
        let index: Vec<DateTime<Utc>> = (0..closes.len()).map(|i| t0 + Duration::days(i as i64)).collect();
        let c = closes.to_vec();
        PriceFeed::new(index, c.clone(), c.clone(), c.clone(), c, vec![1.0; closes.len()]).unwrap()
    }

    #[test]
    fn rsi_matches_hand_computation() {
        let strategy = RsiStrategy::new(RsiConfig { period: 2, ..RsiConfig::default() });
        // deltas: +2, -1, +1
        let rsi = strategy.rsi_series(&feed(&[10.0, 12.0, 11.0, 12.0])).unwrap();
        assert_eq!(rsi[0], None);
        assert_eq!(rsi[1], None);
        // gains (2+0)/2 = 1, losses (0+1)/2 = 0.5 -> RS 2
        assert_relative_eq!(rsi[2].unwrap(), 100.0 - 100.0 / 3.0, epsilon = 1e-9);
        // gains (0+1)/2, losses (1+0)/2 -> RS 1
        assert_relative_eq!(rsi[3].unwrap(), 50.0, epsilon = 1e-9);
    }

    #[test]
    fn only_rising_prices_pin_rsi_at_100() {
        let strategy = RsiStrategy::new(RsiConfig { period: 3, ..RsiConfig::default() });
        let rsi = strategy.rsi_series(&feed(&[1.0, 2.0, 3.0, 4.0, 5.0])).unwrap();
        assert_eq!(rsi[4], Some(100.0));
    }

    #[test]
    fn buys_the_dip_and_sells_the_rip() {
        let strategy = RsiStrategy::new(RsiConfig { period: 2, oversold: 30.0, overbought: 70.0 });
        let closes = [10.0, 9.0, 8.0, 7.0, 8.0, 9.0, 10.0];
        let signals = strategy.generate_signals(&feed(&closes)).unwrap();
        let s = signals.signal().to_vec();
        assert_eq!(s, vec![0, 0, 1, 0, 0, -1, 0]);
        assert_eq!(signals.trade_weight().to_vec(), vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        let strategy = RsiStrategy::new(RsiConfig { period: 2, oversold: 80.0, overbought: 20.0 });
        assert!(strategy.generate_signals(&feed(&[1.0, 2.0, 3.0])).is_err());
    }

    #[test]
    fn zero_period_is_an_indicator_error() {
        let strategy = RsiStrategy::new(RsiConfig { period: 0, ..RsiConfig::default() });
        assert!(matches!(
            strategy.rsi_series(&feed(&[1.0, 2.0])),
            Err(BacktestError::Indicator(_))
        ));
    }
}
