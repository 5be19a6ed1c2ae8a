//! HAL representations of ledgers.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ledger::LedgerRecord;
use crate::paging::{Order, PageQuery};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub href: String,
}

impl Link {
    fn new(href: String) -> Self {
        Self { href }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerLinks {
    #[serde(rename = "self")]
    pub self_: Link,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerResource {
    #[serde(rename = "_links")]
    pub links: LedgerLinks,
    pub id: String,
    pub paging_token: String,
    pub hash: String,
    pub prev_hash: String,
    pub sequence: u32,
    pub transaction_count: u32,
    pub operation_count: u32,
    pub closed_at: DateTime<Utc>,
}

impl LedgerResource {
    pub fn populate(base_url: &str, record: &LedgerRecord) -> Self {
        let hash = hex::encode(record.hash);
        Self {
            links: LedgerLinks {
                self_: Link::new(format!("{base_url}/ledgers/{}", record.sequence)),
            },
            id: hash.clone(),
            paging_token: record.paging_token(),
            hash,
            prev_hash: hex::encode(record.prev_hash),
            sequence: record.sequence,
            transaction_count: record.transaction_count,
            operation_count: record.operation_count,
            closed_at: record.closed_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageLinks {
    #[serde(rename = "self")]
    pub self_: Link,
    pub next: Link,
    pub prev: Link,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Embedded<T> {
    pub records: Vec<T>,
}

/// A page of records with links to its neighbours.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HalPage<T> {
    #[serde(rename = "_links")]
    pub links: PageLinks,
    #[serde(rename = "_embedded")]
    pub embedded: Embedded<T>,
}

impl HalPage<LedgerResource> {
    /// Build the page for `query`, served from `base_url` + `path`.
    ///
    /// `next` continues past the last record; `prev` walks back from the first
    /// record in the opposite order. An empty page keeps the query cursor.
    pub fn ledgers(
        base_url: &str,
        path: &str,
        query: &PageQuery,
        records: Vec<LedgerResource>,
    ) -> Self {
        let cursor = query.cursor.map(|c| c.to_string()).unwrap_or_default();
        let first = records
            .first()
            .map_or_else(|| cursor.clone(), |r| r.paging_token.clone());
        let last = records
            .last()
            .map_or_else(|| cursor.clone(), |r| r.paging_token.clone());
        let link = |cursor: &str, order: Order| {
            Link::new(format!(
                "{base_url}{path}?cursor={cursor}&limit={}&order={order}",
                query.limit
            ))
        };

        Self {
            links: PageLinks {
                self_: link(&cursor, query.order),
                next: link(&last, query.order),
                prev: link(&first, query.order.reverse()),
            },
            embedded: Embedded { records },
        }
    }
}
