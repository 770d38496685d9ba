#![allow(dead_code)]

use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use bitcoin::{
    absolute::LockTime,
    block::{Header, Version as BlockVersion},
    hashes::Hash,
    transaction::Version,
    Amount, Block, BlockHash, CompactTarget, ScriptBuf, Transaction, TxMerkleNode, TxOut,
};
use node_monitor::{
    monitor::ChainMonitor,
    monitoring::{MonitoringServer, SnapshotCache},
    node::{NodeError, NodeRpc},
};
use tokio::net::TcpListener;

pub const BTC: u64 = 100_000_000;

/// Transaction paying the given satoshi amounts.
pub fn tx(outputs: &[u64]) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![],
        output: outputs
            .iter()
            .map(|sats| TxOut {
                value: Amount::from_sat(*sats),
                script_pubkey: ScriptBuf::new(),
            })
            .collect(),
    }
}

/// In-memory chain, genesis to tip, with a switchable height failure.
pub struct TestChain {
    blocks: Vec<Block>,
    height_fails: AtomicBool,
}

impl TestChain {
    pub fn new(tip: u64, make_txs: impl Fn(u64) -> Vec<Transaction>) -> Self {
        let blocks = (0..=tip)
            .map(|height| Block {
                header: Header {
                    version: BlockVersion::ONE,
                    prev_blockhash: BlockHash::all_zeros(),
                    merkle_root: TxMerkleNode::all_zeros(),
                    time: 0,
                    bits: CompactTarget::from_consensus(0),
                    nonce: height as u32,
                },
                txdata: make_txs(height),
            })
            .collect();
        Self {
            blocks,
            height_fails: AtomicBool::new(false),
        }
    }

    pub fn fail_height(&self, fail: bool) {
        self.height_fails.store(fail, Ordering::SeqCst);
    }

    fn unavailable() -> NodeError {
        NodeError::Rpc {
            code: -28,
            message: "node unavailable".to_string(),
        }
    }
}

#[async_trait]
impl NodeRpc for TestChain {
    async fn current_height(&self) -> Result<u64, NodeError> {
        if self.height_fails.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        Ok(self.blocks.len() as u64 - 1)
    }

    async fn block_hash_at(&self, height: u64) -> Result<BlockHash, NodeError> {
        self.blocks
            .get(height as usize)
            .map(Block::block_hash)
            .ok_or_else(Self::unavailable)
    }

    async fn block_by_hash(&self, hash: &BlockHash) -> Result<Block, NodeError> {
        self.blocks
            .iter()
            .find(|b| b.block_hash() == *hash)
            .cloned()
            .ok_or_else(Self::unavailable)
    }
}

/// A running HTTP server in front of `chain`.
pub struct TestServer {
    pub address: SocketAddr,
    pub monitor: Arc<ChainMonitor>,
    pub http: reqwest::Client,
}

impl TestServer {
    pub async fn start(chain: Arc<TestChain>) -> Self {
        let monitor = Arc::new(ChainMonitor::new(
            chain,
            25,
            SnapshotCache::new(Duration::from_secs(60)),
        ));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let router = MonitoringServer::new(address, monitor.clone())
            .unwrap()
            .router();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            address,
            monitor,
            http: reqwest::Client::new(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.address, path)
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.http.get(self.url(path)).send().await.unwrap()
    }
}
