//! 切片（Slice）
//!
//! 将流标识（stream id）确定性地映射到固定范围 `0..NUMBER_OF_SLICES` 内的整数桶，
//! 用于划分存储扫描范围与扇出主题。映射为纯函数，跨进程、跨版本保持稳定。
//!
use crate::error::{EventLogError, EventLogResult as Result};
use std::ops::RangeInclusive;

/// 切片编号
pub type Slice = u32;

/// 切片总数（固定，修改将导致已有数据的切片归属失效）
pub const NUMBER_OF_SLICES: u32 = 1024;

/// 计算流标识所属切片
///
/// 以 UTF-16 码元做 `h = 31 * h + u` 的 32 位回绕多项式哈希，
/// 再对切片总数取余并取绝对值。
///
/// ```
/// use ddd_eventlog::slice::slice_for_stream_id;
///
/// assert_eq!(slice_for_stream_id("a"), 97);
/// assert_eq!(slice_for_stream_id("ab"), 33);
/// ```
pub fn slice_for_stream_id(stream_id: &str) -> Slice {
    let hash = stream_id
        .encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)));

    (hash % NUMBER_OF_SLICES as i32).unsigned_abs()
}

/// 将完整切片空间均分为 `number_of_ranges` 个连续区间
///
/// `number_of_ranges` 必须位于 `1..=NUMBER_OF_SLICES` 且能整除切片总数。
pub fn slice_ranges(number_of_ranges: u32) -> Result<Vec<RangeInclusive<Slice>>> {
    if number_of_ranges == 0
        || number_of_ranges > NUMBER_OF_SLICES
        || NUMBER_OF_SLICES % number_of_ranges != 0
    {
        return Err(EventLogError::invalid_value(format!(
            "number_of_ranges={number_of_ranges} must be a divisor of {NUMBER_OF_SLICES}"
        )));
    }

    let size = NUMBER_OF_SLICES / number_of_ranges;
    Ok((0..number_of_ranges)
        .map(|i| (i * size)..=(i * size + size - 1))
        .collect())
}

/// 校验切片区间：`min_slice <= max_slice < NUMBER_OF_SLICES`
pub fn validate_slice_range(min_slice: Slice, max_slice: Slice) -> Result<()> {
    if min_slice > max_slice || max_slice >= NUMBER_OF_SLICES {
        return Err(EventLogError::InvalidSliceRange {
            min_slice,
            max_slice,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_is_stable_and_in_range() {
        for id in ["", "a", "order-1", "Test|42", "账户-7", "🦀 crab"] {
            let s = slice_for_stream_id(id);
            assert_eq!(s, slice_for_stream_id(id));
            assert!(s < NUMBER_OF_SLICES);
        }
        assert_eq!(slice_for_stream_id(""), 0);
        assert_eq!(slice_for_stream_id("a"), 97);
        assert_eq!(slice_for_stream_id("ab"), 33);
    }

    #[test]
    fn negative_hash_maps_to_non_negative_slice() {
        // 足够长的标识会让 32 位哈希回绕为负数
        let id = "a-fairly-long-stream-identifier-that-overflows";
        let hash = id
            .encode_utf16()
            .fold(0i32, |h, u| h.wrapping_mul(31).wrapping_add(i32::from(u)));
        assert!(hash < 0);
        assert_eq!(slice_for_stream_id(id), (hash % 1024).unsigned_abs());
    }

    #[test]
    fn ranges_cover_the_whole_space() {
        let ranges = slice_ranges(4).unwrap();
        assert_eq!(ranges, vec![0..=255, 256..=511, 512..=767, 768..=1023]);
        assert_eq!(slice_ranges(1).unwrap(), vec![0..=1023]);
        assert_eq!(slice_ranges(1024).unwrap().len(), 1024);
    }

    #[test]
    fn invalid_range_counts_are_rejected() {
        for n in [0, 3, 1000, 2048] {
            assert!(matches!(
                slice_ranges(n),
                Err(EventLogError::InvalidValue { .. })
            ));
        }
    }

    #[test]
    fn validate_slice_range_bounds() {
        assert!(validate_slice_range(0, 1023).is_ok());
        assert!(validate_slice_range(5, 5).is_ok());
        assert!(validate_slice_range(6, 5).is_err());
        assert!(validate_slice_range(0, 1024).is_err());
    }
}
