//! 错误类型定义
//!
//! 所有公共接口统一返回 [`QueryCacheResult`]，错误消息通过 i18n 模块本地化

use crate::i18n::t;
use thiserror::Error;

/// 查询缓存错误
#[derive(Error, Debug)]
pub enum QueryCacheError {
    /// 配置错误（投影混用、参数数量不符、不支持的更新操作符等），在任何I/O之前同步抛出
    #[error("{}", render("error.config", "message", .message))]
    ConfigError { message: String },

    /// 缓存存储错误，总是在本地恢复（读降级为未命中，写被吞掉）
    #[error("{}", render("error.cache", "message", .message))]
    CacheStoreError { message: String },

    /// 文档存储错误，直接向调用方传播
    #[error("{}", render("error.document_store", "message", .message))]
    DocumentStoreError { message: String },

    /// 无法解析的缓存键（重新填充阶段）
    #[error("{}", render("error.invalid_cache_key", "key", .key))]
    InvalidCacheKey { key: String },

    /// 序列化错误
    #[error("{}", render("error.serialization", "message", .message))]
    SerializationError { message: String },

    /// IO错误
    #[error("IO错误: {0}")]
    IoError(#[from] std::io::Error),
}

/// 查询缓存结果类型
pub type QueryCacheResult<T> = Result<T, QueryCacheError>;

/// 渲染本地化错误消息模板
fn render(key: &str, name: &str, value: &str) -> String {
    let placeholder = format!("{{{}}}", name);
    let template = t(key);
    // 翻译未注册时 t() 原样返回键名
    if template == key || !template.contains(&placeholder) {
        return format!("{}: {}", key, value);
    }
    template.replace(&placeholder, value)
}

impl From<serde_json::Error> for QueryCacheError {
    fn from(err: serde_json::Error) -> Self {
        QueryCacheError::SerializationError {
            message: err.to_string(),
        }
    }
}

impl QueryCacheError {
    /// 是否为配置错误
    pub fn is_config(&self) -> bool {
        matches!(self, QueryCacheError::ConfigError { .. })
    }

    /// 是否为缓存存储错误
    pub fn is_cache_store(&self) -> bool {
        matches!(self, QueryCacheError::CacheStoreError { .. })
    }
}

/// 快速构造错误
///
/// ```ignore
/// return Err(quick_error!(config, "缺少模型名称"));
/// ```
#[macro_export]
macro_rules! quick_error {
    (config, $msg:expr) => {
        $crate::error::QueryCacheError::ConfigError {
            message: ($msg).to_string(),
        }
    };
    (cache, $msg:expr) => {
        $crate::error::QueryCacheError::CacheStoreError {
            message: ($msg).to_string(),
        }
    };
    (store, $msg:expr) => {
        $crate::error::QueryCacheError::DocumentStoreError {
            message: ($msg).to_string(),
        }
    };
    (invalid_key, $key:expr) => {
        $crate::error::QueryCacheError::InvalidCacheKey {
            key: ($key).to_string(),
        }
    };
    (serialization, $msg:expr) => {
        $crate::error::QueryCacheError::SerializationError {
            message: ($msg).to_string(),
        }
    };
}
