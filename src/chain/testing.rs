//! Scripted `ChainClient` for pipeline tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use super::{ChainAction, ChainClient, ChainReceipt, ChainResult, SubmitParams};
use crate::error::PipelineError;

pub const TEST_SENDER: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

pub enum SubmitScript {
    Succeed(String),
    Fail(PipelineError),
    /// Resolves with the hash after the given delay.
    Slow(Duration, String),
}

#[derive(Debug, Clone)]
pub struct SubmitCall {
    pub at: Instant,
    pub params: SubmitParams,
    pub action: ChainAction,
}

pub struct ScriptedChainClient {
    sender: Option<String>,
    submits: Mutex<VecDeque<SubmitScript>>,
    heights: Mutex<VecDeque<ChainResult<u64>>>,
    last_height: AtomicU64,
    fee: Mutex<ChainResult<u128>>,
    nonce: AtomicU64,
    nonce_failures: AtomicUsize,
    inclusion_block: Mutex<Option<u64>>,
    receipt_success: Mutex<bool>,
    receipt_ready_after: AtomicUsize,
    submit_calls: Mutex<Vec<SubmitCall>>,
    height_calls: AtomicUsize,
    receipt_calls: AtomicUsize,
    nonce_calls: AtomicUsize,
}

impl ScriptedChainClient {
    pub fn new() -> Self {
        Self {
            sender: Some(TEST_SENDER.to_string()),
            submits: Mutex::new(VecDeque::new()),
            heights: Mutex::new(VecDeque::new()),
            last_height: AtomicU64::new(100),
            fee: Mutex::new(Ok(1_000_000_000)),
            nonce: AtomicU64::new(5),
            nonce_failures: AtomicUsize::new(0),
            inclusion_block: Mutex::new(Some(100)),
            receipt_success: Mutex::new(true),
            receipt_ready_after: AtomicUsize::new(0),
            submit_calls: Mutex::new(Vec::new()),
            height_calls: AtomicUsize::new(0),
            receipt_calls: AtomicUsize::new(0),
            nonce_calls: AtomicUsize::new(0),
        }
    }

    pub fn without_signer(mut self) -> Self {
        self.sender = None;
        self
    }

    pub fn with_submits(self, scripts: Vec<SubmitScript>) -> Self {
        *self.submits.lock().unwrap() = scripts.into();
        self
    }

    /// Heights returned by successive `current_block_height` calls; the last
    /// successful value repeats once the script runs out.
    pub fn with_heights(self, heights: Vec<ChainResult<u64>>) -> Self {
        *self.heights.lock().unwrap() = heights.into();
        self
    }

    pub fn with_fee(self, fee: ChainResult<u128>) -> Self {
        *self.fee.lock().unwrap() = fee;
        self
    }

    pub fn with_nonce(self, nonce: u64) -> Self {
        self.nonce.store(nonce, Ordering::SeqCst);
        self
    }

    pub fn with_nonce_failures(self, count: usize) -> Self {
        self.nonce_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn with_inclusion_block(self, block: Option<u64>) -> Self {
        *self.inclusion_block.lock().unwrap() = block;
        self
    }

    pub fn with_reverted_receipt(self) -> Self {
        *self.receipt_success.lock().unwrap() = false;
        self
    }

    /// `receipt_for` returns `None` for the first `polls - 1` calls.
    pub fn with_receipt_after(self, polls: usize, block: u64) -> Self {
        self.receipt_ready_after.store(polls.saturating_sub(1), Ordering::SeqCst);
        *self.inclusion_block.lock().unwrap() = Some(block);
        self
    }

    pub fn set_nonce(&self, nonce: u64) {
        self.nonce.store(nonce, Ordering::SeqCst);
    }

    pub fn set_fee(&self, fee: ChainResult<u128>) {
        *self.fee.lock().unwrap() = fee;
    }

    pub fn submit_calls(&self) -> Vec<SubmitCall> {
        self.submit_calls.lock().unwrap().clone()
    }

    pub fn height_calls(&self) -> usize {
        self.height_calls.load(Ordering::SeqCst)
    }

    pub fn receipt_calls(&self) -> usize {
        self.receipt_calls.load(Ordering::SeqCst)
    }

    pub fn nonce_calls(&self) -> usize {
        self.nonce_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainClient for ScriptedChainClient {
    fn sender_address(&self) -> Option<String> {
        self.sender.clone()
    }

    async fn current_block_height(&self) -> ChainResult<u64> {
        self.height_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.heights.lock().unwrap().pop_front();
        match next {
            Some(Ok(height)) => {
                self.last_height.store(height, Ordering::SeqCst);
                Ok(height)
            }
            Some(Err(err)) => Err(err),
            None => Ok(self.last_height.load(Ordering::SeqCst)),
        }
    }

    async fn fee_estimate(&self) -> ChainResult<u128> {
        self.fee.lock().unwrap().clone()
    }

    async fn next_sequence_number(&self, _address: &str) -> ChainResult<u64> {
        self.nonce_calls.fetch_add(1, Ordering::SeqCst);
        let failures = self.nonce_failures.load(Ordering::SeqCst);
        if failures > 0 {
            self.nonce_failures.store(failures - 1, Ordering::SeqCst);
            return Err(PipelineError::Network("nonce lookup timed out".to_string()));
        }
        Ok(self.nonce.load(Ordering::SeqCst))
    }

    async fn submit(&self, action: &ChainAction, params: &SubmitParams) -> ChainResult<String> {
        self.submit_calls.lock().unwrap().push(SubmitCall {
            at: Instant::now(),
            params: params.clone(),
            action: action.clone(),
        });
        let script = self.submits.lock().unwrap().pop_front();
        match script {
            Some(SubmitScript::Succeed(hash)) => Ok(hash),
            Some(SubmitScript::Fail(err)) => Err(err),
            Some(SubmitScript::Slow(delay, hash)) => {
                tokio::time::sleep(delay).await;
                Ok(hash)
            }
            None => Ok("0xfeed".to_string()),
        }
    }

    async fn receipt_for(&self, tx_hash: &str) -> ChainResult<Option<ChainReceipt>> {
        self.receipt_calls.fetch_add(1, Ordering::SeqCst);
        let pending = self.receipt_ready_after.load(Ordering::SeqCst);
        if pending > 0 {
            self.receipt_ready_after.store(pending - 1, Ordering::SeqCst);
            return Ok(None);
        }
        let block = *self.inclusion_block.lock().unwrap();
        Ok(block.map(|block_number| ChainReceipt {
            tx_hash: tx_hash.to_string(),
            block_number: Some(block_number),
            gas_used: Some(84_000),
            success: *self.receipt_success.lock().unwrap(),
        }))
    }
}
