//! Transaction aggregation over a window of blocks.
//!
//! A transaction *qualifies* when at least one of its outputs is strictly
//! above the threshold. It is counted once, and only its qualifying outputs
//! contribute to the volume.

use bitcoin::{Amount, Block, Transaction};
use thiserror::Error;

/// Threshold rejected because it is negative, NaN or infinite.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("threshold must be a finite, non-negative BTC amount, got {0}")]
pub struct InvalidThreshold(pub f64);

/// Minimum output value, in BTC, an output must exceed to qualify.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Threshold(f64);

impl Threshold {
    /// Any positive output qualifies.
    pub const ZERO: Threshold = Threshold(0.0);

    pub fn from_btc(btc: f64) -> Result<Self, InvalidThreshold> {
        if btc.is_finite() && btc >= 0.0 {
            Ok(Self(btc))
        } else {
            Err(InvalidThreshold(btc))
        }
    }

    pub fn as_btc(&self) -> f64 {
        self.0
    }

    /// Strict comparison: an output equal to the threshold does not qualify.
    pub fn is_exceeded_by(&self, value: Amount) -> bool {
        value.to_btc() > self.0
    }
}

/// Count and volume of qualifying transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationResult {
    pub transaction_count: u64,
    pub total_volume: Amount,
}

impl Default for AggregationResult {
    fn default() -> Self {
        Self {
            transaction_count: 0,
            total_volume: Amount::ZERO,
        }
    }
}

impl AggregationResult {
    /// Volume in BTC, as exposed to callers and gauges.
    pub fn total_volume_btc(&self) -> f64 {
        self.total_volume.to_btc()
    }
}

/// Streaming accumulator: feed blocks as they are fetched, then [`finish`].
///
/// [`finish`]: TransactionAggregator::finish
#[derive(Debug, Clone)]
pub struct TransactionAggregator {
    threshold: Threshold,
    transaction_count: u64,
    total_sats: u64,
}

impl TransactionAggregator {
    pub fn new(threshold: Threshold) -> Self {
        Self {
            threshold,
            transaction_count: 0,
            total_sats: 0,
        }
    }

    pub fn add_block(&mut self, block: &Block) {
        for tx in &block.txdata {
            self.add_transaction(tx);
        }
    }

    pub fn add_transaction(&mut self, tx: &Transaction) {
        let qualifying: u64 = tx
            .output
            .iter()
            .filter(|out| self.threshold.is_exceeded_by(out.value))
            .fold(0u64, |acc, out| acc.saturating_add(out.value.to_sat()));

        if qualifying > 0 {
            self.transaction_count += 1;
            self.total_sats = self.total_sats.saturating_add(qualifying);
        }
    }

    pub fn finish(self) -> AggregationResult {
        AggregationResult {
            transaction_count: self.transaction_count,
            total_volume: Amount::from_sat(self.total_sats),
        }
    }
}

/// Aggregates `blocks` in one go.
pub fn aggregate<'a>(
    blocks: impl IntoIterator<Item = &'a Block>,
    threshold: Threshold,
) -> AggregationResult {
    let mut aggregator = TransactionAggregator::new(threshold);
    for block in blocks {
        aggregator.add_block(block);
    }
    aggregator.finish()
}
