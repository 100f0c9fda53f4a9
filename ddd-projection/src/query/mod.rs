//! 按切片查询（query）
//!
//! 常规轮询、回溯轮询与实时扇出三路合并，经去重后交付给单个消费者：
//! - `SliceQueryEngine`：查询入口；
//! - `EventsBySlices`：单次查询的运行实例（`Stream<Item = Envelope>`）；
//! - `StreamMerger`：三路源的按需合并；
//! - `Deduplicate` / `DedupFilter` / `DedupCache`：有界 FIFO 去重。
//!
mod backtracking;
mod dedup;
mod engine;
mod events_by_slices;
mod live;
mod merger;
mod poller;
mod polling;

pub use dedup::{DedupCache, DedupFilter, Deduplicate, EnvelopeStreamExt};
pub use engine::SliceQueryEngine;
pub use events_by_slices::EventsBySlices;
pub use merger::{SourceKind, StreamMerger};

use crate::error::{ProjectionError, ProjectionResult as Result};
use ddd_eventlog::slice::{Slice, validate_slice_range};

/// 一次查询覆盖的类别与切片区间 `[min_slice, max_slice]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceRange {
    pub category: String,
    pub min_slice: Slice,
    pub max_slice: Slice,
}

impl SliceRange {
    pub fn new(category: impl Into<String>, min_slice: Slice, max_slice: Slice) -> Self {
        Self {
            category: category.into(),
            min_slice,
            max_slice,
        }
    }

    /// 区间必须满足 `min_slice <= max_slice < NUMBER_OF_SLICES`
    pub fn validated(
        category: impl Into<String>,
        min_slice: Slice,
        max_slice: Slice,
    ) -> Result<Self> {
        validate_slice_range(min_slice, max_slice).map_err(|_| {
            ProjectionError::InvalidSliceRange {
                min_slice,
                max_slice,
            }
        })?;
        Ok(Self::new(category, min_slice, max_slice))
    }

    pub fn contains(&self, slice: Slice) -> bool {
        (self.min_slice..=self.max_slice).contains(&slice)
    }
}
