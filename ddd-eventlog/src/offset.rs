//! 位点（Offset）
//!
//! 以写入时间戳为主序、以 `seen`（流标识 → 已见序号）消歧同一时间戳下的多条事件，
//! 作为查询的续读位置。`read_timestamp` 仅记录读取时的存储时钟，不参与比较。
//!
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offset {
    timestamp: DateTime<Utc>,
    read_timestamp: DateTime<Utc>,
    seen: BTreeMap<String, u64>,
}

impl Offset {
    pub fn new(timestamp: DateTime<Utc>, seen: BTreeMap<String, u64>) -> Self {
        Self {
            timestamp,
            read_timestamp: timestamp,
            seen,
        }
    }

    /// 起始位点：Unix 纪元，空 `seen`
    pub fn zero() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH, BTreeMap::new())
    }

    /// 单条事件对应的位点
    pub fn for_event(timestamp: DateTime<Utc>, stream_id: &str, seq_nr: u64) -> Self {
        Self::new(timestamp, BTreeMap::from([(stream_id.to_string(), seq_nr)]))
    }

    pub fn with_read_timestamp(mut self, read_timestamp: DateTime<Utc>) -> Self {
        self.read_timestamp = read_timestamp;
        self
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn read_timestamp(&self) -> DateTime<Utc> {
        self.read_timestamp
    }

    pub fn seen(&self) -> &BTreeMap<String, u64> {
        &self.seen
    }

    /// 该位点是否已覆盖 `(timestamp, stream_id, seq_nr)` 所指事件
    pub fn has_seen(&self, timestamp: DateTime<Utc>, stream_id: &str, seq_nr: u64) -> bool {
        match timestamp.cmp(&self.timestamp) {
            Ordering::Less => true,
            Ordering::Equal => self.seen.get(stream_id).is_some_and(|s| *s >= seq_nr),
            Ordering::Greater => false,
        }
    }

    /// 将事件计入位点：时间戳前进时重置 `seen`，相等时合并，落后时保持不变
    pub fn advance(&mut self, timestamp: DateTime<Utc>, stream_id: &str, seq_nr: u64) {
        match timestamp.cmp(&self.timestamp) {
            Ordering::Greater => {
                self.timestamp = timestamp;
                self.seen.clear();
                self.seen.insert(stream_id.to_string(), seq_nr);
            }
            Ordering::Equal => {
                let entry = self.seen.entry(stream_id.to_string()).or_insert(seq_nr);
                *entry = (*entry).max(seq_nr);
            }
            Ordering::Less => {}
        }
    }
}

impl Default for Offset {
    fn default() -> Self {
        Self::zero()
    }
}

impl PartialEq for Offset {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp && self.seen == other.seen
    }
}

impl Eq for Offset {}

impl PartialOrd for Offset {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Offset {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.seen.cmp(&other.seen))
    }
}
