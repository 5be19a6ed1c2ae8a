//! In-memory ledger history and the ingester that grows it.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use actions::{Broker, Problem, Topic};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::Rng;
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::paging::{Order, PageQuery};

/// Topic published each time a ledger closes.
pub const LEDGER_TOPIC: &str = "ledger";

/// Size of [`LedgerRecord::to_xdr`] output.
pub const XDR_LEN: usize = 4 + 32 + 32 + 8 + 4 + 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRecord {
    pub sequence: u32,
    pub hash: [u8; 32],
    pub prev_hash: [u8; 32],
    pub closed_at: DateTime<Utc>,
    pub transaction_count: u32,
    pub operation_count: u32,
}

impl LedgerRecord {
    /// Cursor value that resumes a page right after this record.
    pub fn paging_token(&self) -> String {
        self.sequence.to_string()
    }

    /// Fixed-width big-endian encoding: sequence, hash, previous hash,
    /// close time (unix seconds, signed), transaction count, operation count.
    pub fn to_xdr(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(XDR_LEN);
        out.extend_from_slice(&self.sequence.to_be_bytes());
        out.extend_from_slice(&self.hash);
        out.extend_from_slice(&self.prev_hash);
        out.extend_from_slice(&self.closed_at.timestamp().to_be_bytes());
        out.extend_from_slice(&self.transaction_count.to_be_bytes());
        out.extend_from_slice(&self.operation_count.to_be_bytes());
        out
    }
}

fn ledger_hash(prev_hash: &[u8; 32], sequence: u32, closed_at: DateTime<Utc>) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(prev_hash);
    hasher.update(sequence.to_be_bytes());
    hasher.update(closed_at.timestamp().to_be_bytes());
    hasher.finalize().into()
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    #[error("ledger history is closed")]
    Closed,
}

impl From<HistoryError> for Problem {
    fn from(err: HistoryError) -> Self {
        Problem::server_error(format!("history query failed: {err}"))
    }
}

/// Read access to ledger history.
pub trait LedgerHistory: Send + Sync {
    fn latest(&self) -> Result<Option<LedgerRecord>, HistoryError>;

    /// Oldest retained sequence.
    fn elder(&self) -> Result<Option<u32>, HistoryError>;

    fn by_sequence(&self, sequence: u32) -> Result<Option<LedgerRecord>, HistoryError>;

    /// Records strictly after (asc) or before (desc) the query cursor.
    fn page(&self, query: &PageQuery) -> Result<Vec<LedgerRecord>, HistoryError>;
}

#[derive(Debug, Default)]
struct Inner {
    ledgers: VecDeque<LedgerRecord>,
    closed: bool,
}

/// Bounded, append-only ledger history.
#[derive(Debug)]
pub struct LedgerStore {
    retention: usize,
    inner: RwLock<Inner>,
}

impl LedgerStore {
    pub fn new(retention: usize) -> Self {
        Self {
            retention: retention.max(1),
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Append the next ledger, trimming history beyond the retention count.
    pub fn close_ledger(
        &self,
        closed_at: DateTime<Utc>,
        transaction_count: u32,
        operation_count: u32,
    ) -> Result<LedgerRecord, HistoryError> {
        let mut inner = self.inner.write();
        if inner.closed {
            return Err(HistoryError::Closed);
        }

        let (sequence, prev_hash) = match inner.ledgers.back() {
            Some(last) => (last.sequence + 1, last.hash),
            None => (1, [0; 32]),
        };
        let record = LedgerRecord {
            sequence,
            hash: ledger_hash(&prev_hash, sequence, closed_at),
            prev_hash,
            closed_at,
            transaction_count,
            operation_count,
        };
        inner.ledgers.push_back(record.clone());
        while inner.ledgers.len() > self.retention {
            inner.ledgers.pop_front();
        }
        Ok(record)
    }

    /// Stop serving history. Every later call fails with [`HistoryError::Closed`].
    pub fn close(&self) {
        self.inner.write().closed = true;
    }

    pub fn len(&self) -> usize {
        self.inner.read().ledgers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<parking_lot::RwLockReadGuard<'_, Inner>, HistoryError> {
        let inner = self.inner.read();
        if inner.closed {
            return Err(HistoryError::Closed);
        }
        Ok(inner)
    }
}

impl LedgerHistory for LedgerStore {
    fn latest(&self) -> Result<Option<LedgerRecord>, HistoryError> {
        Ok(self.read()?.ledgers.back().cloned())
    }

    fn elder(&self) -> Result<Option<u32>, HistoryError> {
        Ok(self.read()?.ledgers.front().map(|l| l.sequence))
    }

    fn by_sequence(&self, sequence: u32) -> Result<Option<LedgerRecord>, HistoryError> {
        let inner = self.read()?;
        let Some(first) = inner.ledgers.front() else {
            return Ok(None);
        };
        // Sequences are contiguous, so the offset from the elder is the index.
        let index = sequence.checked_sub(first.sequence);
        Ok(index.and_then(|i| inner.ledgers.get(i as usize)).cloned())
    }

    fn page(&self, query: &PageQuery) -> Result<Vec<LedgerRecord>, HistoryError> {
        let inner = self.read()?;
        let limit = query.limit as usize;
        let records = match query.order {
            Order::Asc => {
                let after = query.cursor.unwrap_or(0);
                inner
                    .ledgers
                    .iter()
                    .filter(|l| l.sequence > after)
                    .take(limit)
                    .cloned()
                    .collect()
            }
            Order::Desc => {
                let before = query.cursor.unwrap_or(u32::MAX);
                inner
                    .ledgers
                    .iter()
                    .rev()
                    .filter(|l| l.sequence < before)
                    .take(limit)
                    .cloned()
                    .collect()
            }
        };
        Ok(records)
    }
}

/// Close `count` ledgers ending at `now`, one `spacing` apart.
pub fn seed(
    store: &LedgerStore,
    count: u32,
    now: DateTime<Utc>,
    spacing: Duration,
) -> Result<(), HistoryError> {
    let spacing = chrono::Duration::from_std(spacing).unwrap_or(chrono::Duration::seconds(5));
    let mut rng = rand::thread_rng();
    for back in (0..count).rev() {
        let closed_at = now - spacing * i32::try_from(back).unwrap_or(i32::MAX);
        let (txs, ops) = random_counts(&mut rng);
        store.close_ledger(closed_at, txs, ops)?;
    }
    Ok(())
}

fn random_counts(rng: &mut impl Rng) -> (u32, u32) {
    let transactions = rng.gen_range(0..50);
    let operations = transactions + rng.gen_range(0..=transactions * 2);
    (transactions, operations)
}

/// Close one ledger and publish [`LEDGER_TOPIC`].
pub fn close_and_publish(
    store: &LedgerStore,
    broker: &dyn Broker,
    closed_at: DateTime<Utc>,
) -> Result<LedgerRecord, HistoryError> {
    let (txs, ops) = random_counts(&mut rand::thread_rng());
    let record = store.close_ledger(closed_at, txs, ops)?;
    broker.publish(&Topic::new(LEDGER_TOPIC));
    Ok(record)
}

/// Close a ledger every `interval` until the store is closed.
pub fn spawn_ingester(
    store: Arc<LedgerStore>,
    broker: Arc<dyn Broker>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;
        info!(interval_ms = interval.as_millis() as u64, "ingester started");
        loop {
            ticker.tick().await;
            match close_and_publish(&store, broker.as_ref(), Utc::now()) {
                Ok(record) => debug!(
                    sequence = record.sequence,
                    transactions = record.transaction_count,
                    "ledger closed"
                ),
                Err(HistoryError::Closed) => {
                    info!("history closed, ingester stopping");
                    break;
                }
            }
        }
    })
}

/// Close history and wake every stream so it observes the closure.
pub fn shutdown(store: &LedgerStore, broker: &dyn Broker) {
    store.close();
    broker.publish(&Topic::new(LEDGER_TOPIC));
    info!("ledger history closed");
}
