//! 查询配置（QuerySettings）
//!
//! 键名为 kebab-case，时长以毫秒表示，缺省键取默认值：
//!
//! ```
//! use ddd_projection::settings::QuerySettings;
//! use std::time::Duration;
//!
//! let settings = QuerySettings::from_json_str(
//!     r#"{ "publish-events": true, "behind-current-time": 250, "backtracking-enabled": false }"#,
//! )
//! .unwrap();
//! assert!(settings.publish_events);
//! assert_eq!(settings.behind_current_time, Duration::from_millis(250));
//! assert!(!settings.backtracking_enabled);
//! assert_eq!(settings.buffer_size, 1000);
//! ```
//!
use crate::error::{ProjectionError, ProjectionResult as Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct QuerySettings {
    /// 查询侧是否订阅实时扇出（需写入侧同时开启发布）
    pub publish_events: bool,
    /// 常规轮询间隔
    #[serde(with = "millis")]
    pub refresh_interval: Duration,
    /// 常规轮询的滞后窗口：只读取早于“存储时钟 - 该值”的提交
    #[serde(with = "millis")]
    pub behind_current_time: Duration,
    /// 单次查询的最大行数，同时是轮询器输出通道的容量
    pub buffer_size: usize,
    /// 去重缓存容量
    pub deduplicate_capacity: usize,
    pub backtracking_enabled: bool,
    /// 回溯窗口：从常规位点往回重扫的最大跨度
    #[serde(with = "millis")]
    pub backtracking_window: Duration,
    /// 回溯轮询的滞后窗口
    #[serde(with = "millis")]
    pub backtracking_behind_current_time: Duration,
    /// 回溯轮询间隔，应慢于常规轮询
    #[serde(with = "millis")]
    pub backtracking_interval: Duration,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            publish_events: false,
            refresh_interval: Duration::from_secs(3),
            behind_current_time: Duration::from_millis(100),
            buffer_size: 1000,
            deduplicate_capacity: 10_000,
            backtracking_enabled: true,
            backtracking_window: Duration::from_secs(120),
            backtracking_behind_current_time: Duration::from_secs(10),
            backtracking_interval: Duration::from_secs(10),
        }
    }
}

impl QuerySettings {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let settings: Self = serde_json::from_value(value)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.refresh_interval.is_zero() {
            return Err(ProjectionError::InvalidSettings(
                "refresh-interval must be positive".into(),
            ));
        }
        if self.buffer_size == 0 {
            return Err(ProjectionError::InvalidSettings(
                "buffer-size must be positive".into(),
            ));
        }
        if self.deduplicate_capacity == 0 {
            return Err(ProjectionError::InvalidCapacity {
                capacity: self.deduplicate_capacity,
            });
        }
        if self.backtracking_enabled && self.backtracking_interval.is_zero() {
            return Err(ProjectionError::InvalidSettings(
                "backtracking-interval must be positive".into(),
            ));
        }
        Ok(())
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
