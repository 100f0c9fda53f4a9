//! 事件日志层统一错误定义
//!
//! 聚焦序列化、存储访问、扇出与参数校验等最小必要集合，
//! 便于在各实现层统一转换为 `EventLogError`。
//!
use thiserror::Error;

/// 统一错误类型（基础库最小必要集）
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EventLogError {
    // --- 序列化 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },

    // --- 存储/持久化 ---
    #[error("storage error: {reason}")]
    Storage { reason: String },
    #[error("database error: {reason}")]
    Database { reason: String },
    #[error("not found: {reason}")]
    NotFound { reason: String },

    // --- 扇出 ---
    #[error("fan-out error: {reason}")]
    FanOut { reason: String },

    // --- 参数校验 ---
    #[error("invalid slice range: min_slice={min_slice}, max_slice={max_slice}")]
    InvalidSliceRange { min_slice: u32, max_slice: u32 },
    #[error("invalid value: {reason}")]
    InvalidValue { reason: String },
}

impl EventLogError {
    pub fn storage(reason: impl Into<String>) -> Self {
        Self::Storage {
            reason: reason.into(),
        }
    }

    pub fn not_found(reason: impl Into<String>) -> Self {
        Self::NotFound {
            reason: reason.into(),
        }
    }

    pub fn invalid_value(reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            reason: reason.into(),
        }
    }
}

/// 统一 Result 类型别名
pub type EventLogResult<T> = Result<T, EventLogError>;

// ---- Cross-crate conversions for infrastructure convenience ----
// 允许在基础设施层直接使用 `?` 将 sqlx 错误转换为 EventLogError

#[cfg(feature = "infra-sqlx")]
impl From<sqlx::Error> for EventLogError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => EventLogError::NotFound {
                reason: "row not found".to_string(),
            },
            other => EventLogError::Database {
                reason: other.to_string(),
            },
        }
    }
}
