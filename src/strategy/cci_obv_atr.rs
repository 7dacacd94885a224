// src/strategy/cci_obv_atr.rs

use serde::{Deserialize, Serialize};
use ta::indicators::{CommodityChannelIndex, OnBalanceVolume, SimpleMovingAverage, TrueRange};
use ta::Next;

use crate::engine::feeds::{PriceFeed, SignalFeed};
use crate::error::Result;
use crate::strategy::SignalGenerator;

fn default_cci_threshold() -> f64 {
    100.0
}

fn default_cci_period() -> usize {
    20
}

fn default_atr_period() -> usize {
    14
}

fn default_atr_min() -> f64 {
    1.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CciObvAtrConfig {
    /// CCI above this (below its negative) triggers entries (exits)
    #[serde(default = "default_cci_threshold")]
    pub cci_threshold: f64,
    #[serde(default = "default_cci_period")]
    pub cci_period: usize,
    #[serde(default = "default_atr_period")]
    pub atr_period: usize,
    /// Bars with ATR below this are ignored
    #[serde(default = "default_atr_min")]
    pub atr_min: f64,
}

impl Default for CciObvAtrConfig {
    fn default() -> Self {
        Self {
            cci_threshold: default_cci_threshold(),
            cci_period: default_cci_period(),
            atr_period: default_atr_period(),
            atr_min: default_atr_min(),
        }
    }
}

/// Per-bar indicator readings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorRow {
    pub cci: f64,
    pub obv: f64,
    pub atr: f64,
}

/// CCI gives direction, a rising/falling OBV confirms it, ATR filters out
/// quiet bars. Long only.
#[derive(Debug, Clone, Default)]
pub struct CciObvAtrStrategy {
    config: CciObvAtrConfig,
}

impl CciObvAtrStrategy {
    pub fn new(config: CciObvAtrConfig) -> Self {
        Self { config }
    }

    /// CCI over typical price, cumulative OBV and ATR as the simple mean of
    /// true range, one row per bar.
    pub fn indicators(&self, prices: &PriceFeed) -> Result<Vec<IndicatorRow>> {
        let mut cci = CommodityChannelIndex::new(self.config.cci_period)?;
        let mut atr = SimpleMovingAverage::new(self.config.atr_period)?;
        let mut obv = OnBalanceVolume::new();
        let mut tr = TrueRange::new();

        Ok(prices
            .bars()
            .map(|bar| IndicatorRow {
                cci: cci.next(&bar),
                obv: obv.next(&bar),
                atr: atr.next(tr.next(&bar)),
            })
            .collect())
    }
}

impl SignalGenerator for CciObvAtrStrategy {
    fn name(&self) -> &str {
        "cci_obv_atr"
    }

    fn generate_signals(&self, prices: &PriceFeed) -> Result<SignalFeed> {
        let rows = self.indicators(prices)?;
        let warmup = self.config.cci_period.max(self.config.atr_period);
        let threshold = self.config.cci_threshold;

        let mut signal = vec![0_i8; prices.len()];
        let mut holding = false;
        for i in warmup.max(1)..rows.len() {
            let (now, prev) = (rows[i], rows[i - 1]);
            if !now.cci.is_finite() || !now.atr.is_finite() || now.atr < self.config.atr_min {
                continue;
            }
            let obv_diff = now.obv - prev.obv;

            if !holding && now.cci > threshold && obv_diff > 0.0 {
                signal[i] = 1;
                holding = true;
            } else if holding && now.cci < -threshold && obv_diff < 0.0 {
                signal[i] = -1;
                holding = false;
            }
        }
        SignalFeed::from_signals(prices.index().to_vec(), signal)
    }
}
