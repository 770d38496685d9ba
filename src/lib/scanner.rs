//! Lazy, newest-first walk over the most recent blocks of the chain.
//!
//! The tip height is read once when the scan starts; every block in the window
//! is then fetched on demand (hash first, then block). A height whose hash or
//! block cannot be fetched is logged and skipped, so a window may come back
//! shorter than requested without that being an error.

use bitcoin::{Block, BlockHash};
use tracing::{debug, warn};

use crate::node::{NodeError, NodeRpc};

/// A block fetched by the scanner, with the height it was requested at.
#[derive(Debug, Clone)]
pub struct ScannedBlock {
    pub height: u64,
    pub hash: BlockHash,
    pub block: Block,
}

/// Fetches the last `window_size` blocks from a node.
pub struct BlockRangeScanner<'a> {
    node: &'a dyn NodeRpc,
    window_size: u64,
}

impl<'a> BlockRangeScanner<'a> {
    pub fn new(node: &'a dyn NodeRpc, window_size: u64) -> Self {
        Self { node, window_size }
    }

    /// Reads the tip height and returns the window ending at it.
    ///
    /// Fails only when the height query fails; in that case nothing else is
    /// requested from the node.
    pub async fn scan(&self) -> Result<BlockWindow<'a>, NodeError> {
        let tip = self.node.current_height().await?;
        let lowest = tip.saturating_sub(self.window_size.saturating_sub(1));
        debug!(tip, lowest, "Scanning block window");

        Ok(BlockWindow {
            node: self.node,
            tip,
            lowest,
            planned: if self.window_size == 0 {
                0
            } else {
                tip - lowest + 1
            },
            next: (self.window_size > 0).then_some(tip),
            fetched: 0,
            skipped: 0,
        })
    }
}

/// Heights `tip` down to `max(tip - window_size + 1, 0)`, fetched lazily.
pub struct BlockWindow<'a> {
    node: &'a dyn NodeRpc,
    tip: u64,
    lowest: u64,
    planned: u64,
    next: Option<u64>,
    fetched: u64,
    skipped: u64,
}

impl BlockWindow<'_> {
    /// Height the window was anchored at.
    pub fn tip(&self) -> u64 {
        self.tip
    }

    /// Number of heights the window covers, `min(window_size, tip + 1)`.
    pub fn planned(&self) -> u64 {
        self.planned
    }

    /// Blocks yielded so far.
    pub fn fetched(&self) -> u64 {
        self.fetched
    }

    /// Heights skipped so far because a fetch failed.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Fetches the next (older) block, skipping heights that fail.
    /// Returns `None` once the window is exhausted.
    pub async fn next_block(&mut self) -> Option<ScannedBlock> {
        while let Some(height) = self.next {
            self.next = (height > self.lowest).then(|| height - 1);

            let hash = match self.node.block_hash_at(height).await {
                Ok(hash) => hash,
                Err(e) => {
                    warn!("Error getting block hash for height {}: {}", height, e);
                    self.skipped += 1;
                    continue;
                }
            };

            match self.node.block_by_hash(&hash).await {
                Ok(block) => {
                    self.fetched += 1;
                    return Some(ScannedBlock {
                        height,
                        hash,
                        block,
                    });
                }
                Err(e) => {
                    warn!("Error getting block for hash {}: {}", hash, e);
                    self.skipped += 1;
                }
            }
        }
        None
    }

    /// Drains the window into a vector, newest first.
    #[cfg(test)]
    pub async fn collect(mut self) -> Vec<ScannedBlock> {
        let mut blocks = Vec::new();
        while let Some(block) = self.next_block().await {
            blocks.push(block);
        }
        blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::mock::{tx, MockNode};
    use std::sync::atomic::Ordering;

    fn chain(tip: u64) -> MockNode {
        MockNode::with_chain(tip, |h| vec![tx(&[h + 1])])
    }

    fn heights(blocks: &[ScannedBlock]) -> Vec<u64> {
        blocks.iter().map(|b| b.height).collect()
    }

    #[tokio::test]
    async fn full_window_newest_first() {
        let node = chain(100);
        let window = BlockRangeScanner::new(&node, 25).scan().await.unwrap();
        assert_eq!(window.tip(), 100);
        assert_eq!(window.planned(), 25);

        let blocks = window.collect().await;
        assert_eq!(heights(&blocks), (76..=100).rev().collect::<Vec<_>>());
        assert!(blocks.iter().all(|b| b.block.block_hash() == b.hash));
    }

    #[tokio::test]
    async fn short_chain_yields_height_plus_one() {
        let node = chain(9);
        let window = BlockRangeScanner::new(&node, 25).scan().await.unwrap();
        assert_eq!(window.planned(), 10);

        let blocks = window.collect().await;
        assert_eq!(blocks.len(), 10);
        assert_eq!(blocks.last().map(|b| b.height), Some(0));
    }

    #[tokio::test]
    async fn genesis_only_chain() {
        let node = chain(0);
        let blocks = BlockRangeScanner::new(&node, 25)
            .scan()
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(heights(&blocks), vec![0]);
    }

    #[tokio::test]
    async fn failed_block_fetch_is_skipped() {
        let node = chain(50);
        node.fail_block_at(40);

        let mut window = BlockRangeScanner::new(&node, 25).scan().await.unwrap();
        let mut blocks = Vec::new();
        while let Some(b) = window.next_block().await {
            blocks.push(b);
        }

        assert_eq!(blocks.len(), 24);
        assert!(!heights(&blocks).contains(&40));
        assert_eq!(window.skipped(), 1);
        assert_eq!(window.fetched(), 24);
    }

    #[tokio::test]
    async fn failed_hash_lookup_is_skipped_without_block_fetch() {
        let node = chain(50);
        node.fail_hash_at(50);
        node.fail_hash_at(26);

        let blocks = BlockRangeScanner::new(&node, 25)
            .scan()
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(blocks.len(), 23);
        assert_eq!(node.block_calls.load(Ordering::SeqCst), 23);
    }

    #[tokio::test]
    async fn height_failure_aborts_before_any_fetch() {
        let node = chain(50);
        node.fail_height(true);

        assert!(BlockRangeScanner::new(&node, 25).scan().await.is_err());
        assert_eq!(node.block_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn tip_read_once_per_scan() {
        let node = chain(30);
        let _ = BlockRangeScanner::new(&node, 25)
            .scan()
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(node.height_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_window_is_empty() {
        let node = chain(30);
        let window = BlockRangeScanner::new(&node, 0).scan().await.unwrap();
        assert_eq!(window.planned(), 0);
        assert!(window.collect().await.is_empty());
    }
}
